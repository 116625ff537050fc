// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests.
//!
//! Some help for laying out these tests was taken from:
//! https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html

mod api;
mod hessian;
mod properties;

use ndarray::prelude::*;

use mtmfs_clean::{CleanerConfig, MultiTermCleaner};

/// A circular Gaussian with peak `amplitude` at `centre`.
fn gaussian(
    nx: usize,
    ny: usize,
    centre: (usize, usize),
    sigma: f64,
    amplitude: f64,
) -> Array2<f32> {
    Array2::from_shape_fn((nx, ny), |(x, y)| {
        let r2 = (x as f64 - centre.0 as f64).powi(2) + (y as f64 - centre.1 as f64).powi(2);
        (amplitude * (-r2 / (2.0 * sigma * sigma)).exp()) as f32
    })
}

/// The Gaussian PSF (sigma of 2 pixels) used by most tests, peaking at the
/// image centre.
fn gaussian_psf(nx: usize, ny: usize, peak: f64) -> Array2<f32> {
    gaussian(nx, ny, (nx / 2, ny / 2), 2.0, peak)
}

/// Make a cleaner that's ready to have its PSFs set.
fn get_cleaner(scales: &[f32], num_taylor: usize, nx: usize, ny: usize) -> MultiTermCleaner {
    let mut cleaner = MultiTermCleaner::new(CleanerConfig::default()).unwrap();
    cleaner.set_scales(scales).unwrap();
    cleaner.set_num_taylor_terms(num_taylor).unwrap();
    cleaner.initialise(nx, ny).unwrap();
    cleaner
}

/// A single-term, point-scale cleaner with the Gaussian PSF and the given
/// dirty image.
fn get_point_cleaner(dirty: ArrayView2<f32>) -> MultiTermCleaner {
    let (nx, ny) = dirty.dim();
    let mut cleaner = get_cleaner(&[0.0], 1, nx, ny);
    cleaner.set_psf(0, gaussian_psf(nx, ny, 1.0).view()).unwrap();
    cleaner.set_residual(0, dirty).unwrap();
    cleaner
}

/// Spectral moments of the PSFs used in the two-term tests: the order-t PSF is
/// the Gaussian scaled by `PSF_MOMENTS[t]`.
const PSF_MOMENTS: [f64; 3] = [1.0, 0.05, 0.0225];

/// A two-term cleaner with scales of 0 and 6 pixels on a 64x64 image,
/// containing a point source at the centre with unit intensity and spectral
/// index `alpha`.
fn get_two_term_cleaner(alpha: f64) -> MultiTermCleaner {
    let (nx, ny) = (64, 64);
    let mut cleaner = get_cleaner(&[0.0, 6.0], 2, nx, ny);
    for (order, &m) in PSF_MOMENTS.iter().enumerate() {
        cleaner.set_psf(order, gaussian_psf(nx, ny, m).view()).unwrap();
    }
    for t in 0..2 {
        let flux = PSF_MOMENTS[t] + alpha * PSF_MOMENTS[t + 1];
        cleaner.set_residual(t, gaussian_psf(nx, ny, flux).view()).unwrap();
    }
    cleaner
}
