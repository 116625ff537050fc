// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Unusable Hessians.

use ndarray::prelude::*;

use super::*;
use mtmfs_clean::{clean_status_code, CleanerError, HessianError, HESSIAN_FAILURE_CODE};

#[test]
fn zero_psf_gives_exact_zero_hessian() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0], 2, nx, ny);
    cleaner.set_psf(0, gaussian_psf(nx, ny, 1.0).view()).unwrap();
    cleaner.set_psf(1, Array2::zeros((nx, ny)).view()).unwrap();
    cleaner.set_psf(2, gaussian_psf(nx, ny, 0.1).view()).unwrap();
    let residual = gaussian_psf(nx, ny, 0.5);
    cleaner.set_residual(0, residual.view()).unwrap();
    cleaner.set_residual(1, residual.view()).unwrap();

    let result = cleaner.clean(10, 0.01, 0.5, 0.0);
    assert!(matches!(
        result,
        Err(CleanerError::Hessian(HessianError::ExactZero { .. }))
    ));
    assert_eq!(clean_status_code(&result), Some(HESSIAN_FAILURE_CODE));
    assert_eq!(HESSIAN_FAILURE_CODE, -2);

    // Nothing changed.
    assert!(cleaner.hessians().is_none());
    assert_eq!(cleaner.total_iterations(), 0);
    for t in 0..2 {
        assert_eq!(cleaner.residual(t).unwrap(), residual);
        assert!(cleaner.model(t).unwrap().iter().all(|&v| v == 0.0));
    }

    // Fixing the PSF fixes the Hessian.
    cleaner.set_psf(1, gaussian_psf(nx, ny, 0.05).view()).unwrap();
    assert!(cleaner.compute_hessian_peak().is_ok());
    assert!(cleaner.hessians().is_some());
}

#[test]
fn identical_psfs_give_linearly_dependent_hessian() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0], 2, nx, ny);
    for order in 0..3 {
        cleaner
            .set_psf(order, gaussian_psf(nx, ny, 1.0).view())
            .unwrap();
    }
    let result = cleaner.compute_hessian_peak();
    match result {
        Err(CleanerError::Hessian(HessianError::LinearlyDependent { scale_size, matrix })) => {
            assert_eq!(scale_size, 0.0);
            assert_eq!(matrix.dim(), (2, 2));
        }
        _ => panic!("expected linearly-dependent rows, got {result:?}"),
    }
    assert!(cleaner.hessian(0).is_none());
    assert!(cleaner.inverse_hessian(0).is_none());
}

#[test]
fn single_term_hessian_is_the_psf_peak() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0, 4.0], 1, nx, ny);
    cleaner.set_psf(0, gaussian_psf(nx, ny, 1.0).view()).unwrap();
    cleaner.compute_hessian_peak().unwrap();

    let hessians = cleaner.hessians().unwrap();
    assert_eq!(hessians[0].scale_size(), 0.0);
    assert_eq!(hessians[1].scale_size(), 4.0);
    let a0 = hessians[0].matrix()[(0, 0)];
    let a4 = hessians[1].matrix()[(0, 0)];
    approx::assert_abs_diff_eq!(a0, 1.0, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(hessians[0].inverse()[(0, 0)], 1.0 / a0, epsilon = 1e-9);
    assert!(a4 > 0.0 && a4 < a0);

    // Replacing a PSF forgets the Hessians.
    cleaner.set_psf(0, gaussian_psf(nx, ny, 1.0).view()).unwrap();
    assert!(cleaner.hessians().is_none());
}
