// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Properties every clean must have.

use approx::assert_abs_diff_eq;
use ndarray::prelude::*;

use super::*;
use mtmfs_clean::CleanOutcome;

#[test]
fn hessians_are_symmetric_and_inverted() {
    let mut cleaner = get_two_term_cleaner(-0.7);
    cleaner.compute_hessian_peak().unwrap();
    let hessians = cleaner.hessians().unwrap();
    assert_eq!(hessians.len(), 2);

    for hessian in hessians {
        let a = hessian.matrix();
        let inv = hessian.inverse();
        assert_abs_diff_eq!(a, a.t(), epsilon = 0.0);
        assert_abs_diff_eq!(inv, inv.t(), epsilon = 0.0);
        assert_abs_diff_eq!(a.dot(&inv), Array2::<f64>::eye(2), epsilon = 1e-6);
    }

    // The point-scale Hessian is sampled straight from the PSF peaks.
    assert_abs_diff_eq!(
        cleaner.hessian(0).unwrap(),
        array![[1.0, 0.05], [0.05, 0.0225]],
        epsilon = 1e-6
    );
    // A broader scale has a smaller response.
    let a6 = cleaner.hessian(1).unwrap();
    assert!(a6[(0, 0)] < 1.0 && a6[(0, 0)] > 0.0);
    assert_abs_diff_eq!(a6[(0, 1)] / a6[(0, 0)], 0.05, epsilon = 1e-4);
}

#[test]
fn oversized_scales_are_dropped() {
    let cleaner = get_cleaner(&[0.0, 6.0, 40.0], 1, 64, 64);
    assert_eq!(cleaner.num_scales(), 2);
    assert_eq!(cleaner.scale_sizes(), [0.0f32, 6.0].as_slice());
    // The model keeps the image shape.
    assert_eq!(cleaner.model(0).unwrap().dim(), (64, 64));
}

#[test]
fn point_source_converges() {
    let (nx, ny) = (64, 64);
    let dirty = gaussian(nx, ny, (20, 40), 2.0, 1.0);
    let mut cleaner = get_point_cleaner(dirty.view());

    let outcome = cleaner.clean(50, 0.01, 0.5, 0.0).unwrap();
    assert_eq!(outcome, CleanOutcome::Converged { iterations: 7 });
    assert_eq!(outcome.code(), 7);
    assert_eq!(cleaner.total_iterations(), 7);

    // Every component lands on the source: 1 - 0.5^7.
    let model = cleaner.model(0).unwrap();
    assert_abs_diff_eq!(model[(20, 40)], 0.9921875, epsilon = 1e-4);
    assert_eq!(model.iter().filter(|&&v| v != 0.0).count(), 1);
    assert_abs_diff_eq!(cleaner.total_taylor_flux()[0], 0.9921875, epsilon = 1e-4);
    assert_abs_diff_eq!(cleaner.total_scale_flux()[0], 0.9921875, epsilon = 1e-4);

    let residual = cleaner.residual(0).unwrap();
    assert_abs_diff_eq!(residual[(20, 40)], 0.0078125, epsilon = 1e-4);
}

#[test]
fn clean_is_idempotent_once_converged() {
    let (nx, ny) = (64, 64);
    let dirty = gaussian(nx, ny, (20, 40), 2.0, 1.0);
    let mut cleaner = get_point_cleaner(dirty.view());
    assert!(matches!(
        cleaner.clean(50, 0.01, 0.5, 0.0),
        Ok(CleanOutcome::Converged { .. })
    ));
    let model = cleaner.model(0).unwrap().to_owned();
    let residual = cleaner.residual(0).unwrap().to_owned();

    // The threshold from the first clean still applies.
    let outcome = cleaner.clean(50, 0.01, 0.5, 0.0).unwrap();
    assert_eq!(outcome, CleanOutcome::AlreadyConverged);
    assert_eq!(outcome.code(), 0);
    assert_eq!(cleaner.model(0).unwrap(), model);
    assert_eq!(cleaner.residual(0).unwrap(), residual);
    assert_eq!(cleaner.total_iterations(), 7);
}

#[test]
fn updates_are_confined_to_the_patch() {
    let (nx, ny) = (128, 128);
    let mut dirty = gaussian(nx, ny, (30, 90), 2.0, 1.0);
    dirty += &gaussian(nx, ny, (100, 20), 2.0, 0.4);
    let mut cleaner = get_point_cleaner(dirty.view());
    assert_eq!(cleaner.psf_support(), Some(80));
    assert!(cleaner.last_patch().is_none());

    let outcome = cleaner.clean(1, 0.01, 0.5, 0.0).unwrap();
    assert_eq!(outcome, CleanOutcome::MaxIterations { iterations: 1 });

    let patch = cleaner.last_patch().unwrap();
    assert_eq!(patch.model.blc, [0, 50]);
    assert_eq!(patch.model.trc, [69, 127]);
    assert_eq!(patch.model.shape(), patch.psf.shape());

    let model = cleaner.model(0).unwrap();
    let residual = cleaner.residual(0).unwrap();
    for ((x, y), &v) in model.indexed_iter() {
        if !patch.model.contains((x, y)) {
            assert_eq!(v, 0.0, "model changed outside the patch at ({x}, {y})");
            assert_abs_diff_eq!(residual[(x, y)], dirty[(x, y)], epsilon = 1e-6);
        }
    }
    assert_abs_diff_eq!(model[(30, 90)], 0.5, epsilon = 1e-5);
    assert_abs_diff_eq!(residual[(30, 90)], 0.5, epsilon = 1e-5);
}

#[test]
fn two_term_updates_are_confined_to_the_patch() {
    let (nx, ny) = (128, 128);
    let alpha = -0.7;
    let mut cleaner = get_cleaner(&[0.0, 2.0], 2, nx, ny);
    for (order, &m) in PSF_MOMENTS.iter().enumerate() {
        cleaner.set_psf(order, gaussian_psf(nx, ny, m).view()).unwrap();
    }
    let mut dirty = Vec::with_capacity(2);
    for t in 0..2 {
        let flux = PSF_MOMENTS[t] + alpha * PSF_MOMENTS[t + 1];
        let mut image = gaussian(nx, ny, (30, 90), 2.0, flux);
        image += &gaussian(nx, ny, (100, 20), 2.0, 0.4 * flux);
        cleaner.set_residual(t, image.view()).unwrap();
        dirty.push(image);
    }

    let outcome = cleaner.clean(1, 0.01, 0.5, 0.0).unwrap();
    assert_eq!(outcome, CleanOutcome::MaxIterations { iterations: 1 });

    let patch = cleaner.last_patch().unwrap();
    assert!(patch.model.contains((30, 90)));
    assert!(!patch.model.contains((100, 20)));
    for t in 0..2 {
        let model = cleaner.model(t).unwrap();
        let residual = cleaner.residual(t).unwrap();
        for ((x, y), &v) in model.indexed_iter() {
            if !patch.model.contains((x, y)) {
                assert_eq!(v, 0.0, "term {t} model changed outside the patch at ({x}, {y})");
                assert_abs_diff_eq!(residual[(x, y)], dirty[t][(x, y)], epsilon = 1e-6);
            }
        }
    }
    assert!(cleaner.model(0).unwrap().iter().any(|&v| v != 0.0));
    assert!(cleaner.model(1).unwrap().iter().any(|&v| v != 0.0));
}

#[test]
fn oscillating_clean_diverges() {
    let (nx, ny) = (64, 64);
    // Strong sidelobes either side of the peak.
    let mut psf = Array2::zeros((nx, ny));
    psf[(32, 32)] = 1.0;
    psf[(32, 31)] = -0.95;
    psf[(32, 33)] = -0.95;
    let mut dirty = Array2::zeros((nx, ny));
    dirty.slice_mut(s![32, 16..48]).fill(1.0);

    let mut cleaner = get_cleaner(&[0.0], 1, nx, ny);
    cleaner.set_psf(0, psf.view()).unwrap();
    cleaner.set_residual(0, dirty.view()).unwrap();

    let outcome = cleaner.clean(100, 0.01, 0.5, 0.0).unwrap();
    assert!(outcome.is_diverged(), "{outcome:?}");
    assert_eq!(outcome.code(), -1);
    assert!(outcome.iterations() < 30);
    // The last component was applied.
    assert_eq!(cleaner.total_iterations(), outcome.iterations());
    assert!(cleaner.model(0).unwrap().iter().any(|&v| v != 0.0));
}

#[test]
fn principal_solution_divides_by_the_psf_peak() {
    let (nx, ny) = (64, 64);
    let mut cleaner = get_cleaner(&[0.0], 1, nx, ny);
    cleaner
        .set_psf(0, gaussian_psf(nx, ny, 1.0005).view())
        .unwrap();
    let residual = gaussian(nx, ny, (10, 50), 3.0, 2.0);
    cleaner.set_residual(0, residual.view()).unwrap();

    cleaner.compute_principal_solution().unwrap();
    let a00 = cleaner.hessian(0).unwrap()[(0, 0)];
    assert_abs_diff_eq!(a00, 1.0005, epsilon = 1e-6);
    let solved = cleaner.residual(0).unwrap();
    for (&new, &old) in solved.iter().zip(residual.iter()) {
        let expected = old as f64 / a00;
        assert!(
            (new as f64 - expected).abs() <= 1e-6 * expected.abs() + 1e-30,
            "{new} != {expected}"
        );
    }
    // Nothing is added to the model.
    assert!(cleaner.model(0).unwrap().iter().all(|&v| v == 0.0));
}
