// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Misuse of the cleaner's interface.

use std::sync::Arc;

use ndarray::prelude::*;

use super::*;
use mtmfs_clean::{CleanerError, InvalidConfigError, PsfError};

#[test]
fn uninitialised_cleaner() {
    let mut cleaner = MultiTermCleaner::new(CleanerConfig::default()).unwrap();
    assert_eq!(cleaner.num_scales(), 1);
    assert_eq!(cleaner.num_taylor_terms(), 1);
    assert!(cleaner.psf_support().is_none());
    assert!(cleaner.total_taylor_flux().is_empty());

    let image = Array2::zeros((16, 16));
    assert_eq!(
        cleaner.set_psf(0, image.view()),
        Err(CleanerError::NotInitialised)
    );
    assert_eq!(
        cleaner.set_residual(0, image.view()),
        Err(CleanerError::NotInitialised)
    );
    assert_eq!(
        cleaner.clean(10, 0.1, 0.5, 0.0),
        Err(CleanerError::NotInitialised)
    );
    assert!(matches!(cleaner.model(0), Err(CleanerError::NotInitialised)));
    // A mask may be set before initialising.
    assert!(cleaner.set_mask(Arc::new(image)).is_ok());
}

#[test]
fn bad_setup() {
    let mut cleaner = MultiTermCleaner::default();
    assert_eq!(cleaner.set_scales(&[]), Err(CleanerError::NoScales));
    assert_eq!(
        cleaner.set_scales(&[0.0, -3.0]),
        Err(CleanerError::NegativeScaleSize(-3.0))
    );
    assert_eq!(
        cleaner.set_num_taylor_terms(0),
        Err(CleanerError::NoTaylorTerms)
    );

    // All scales too big.
    cleaner.set_scales(&[20.0]).unwrap();
    assert_eq!(cleaner.initialise(32, 32), Err(CleanerError::NoScales));

    let config = CleanerConfig {
        memory_fraction: 1.5,
        ..Default::default()
    };
    assert!(matches!(
        MultiTermCleaner::new(config),
        Err(CleanerError::Config(InvalidConfigError::MemoryFraction(_)))
    ));
}

#[test]
fn insufficient_memory() {
    let config = CleanerConfig {
        memory_limit_mib: Some(1.0),
        ..Default::default()
    };
    let mut cleaner = MultiTermCleaner::new(config).unwrap();
    cleaner.set_scales(&[0.0, 4.0, 8.0]).unwrap();
    cleaner.set_num_taylor_terms(3).unwrap();
    assert!(matches!(
        cleaner.initialise(512, 512),
        Err(CleanerError::InsufficientMemory { .. })
    ));
    assert!(cleaner.psf_support().is_none());
}

#[test]
fn bad_orders_and_shapes() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0], 2, nx, ny);
    let psf = gaussian_psf(nx, ny, 1.0);

    assert_eq!(
        cleaner.set_psf(3, psf.view()),
        Err(CleanerError::InvalidPsfOrder {
            order: 3,
            num_psfs: 3,
            num_taylor: 2
        })
    );
    assert_eq!(
        cleaner.set_residual(2, psf.view()),
        Err(CleanerError::InvalidTaylorOrder {
            order: 2,
            num_taylor: 2
        })
    );
    assert_eq!(
        cleaner.set_model(2, psf.view()),
        Err(CleanerError::InvalidTaylorOrder {
            order: 2,
            num_taylor: 2
        })
    );
    assert!(matches!(cleaner.model(2), Err(CleanerError::InvalidTaylorOrder { .. })));

    let small = Array2::zeros((16, 32));
    assert_eq!(
        cleaner.set_residual(0, small.view()),
        Err(CleanerError::ShapeMismatch {
            what: "residual image",
            expected: (32, 32),
            got: (16, 32)
        })
    );
    assert!(matches!(
        cleaner.set_psf(1, small.view()),
        Err(CleanerError::ShapeMismatch { what: "PSF", .. })
    ));
    assert_eq!(
        cleaner.set_scale_biases(&[1.0, 1.0]),
        Err(CleanerError::InvalidScaleBias {
            expected: 1,
            got: 2
        })
    );
}

#[test]
fn missing_inputs() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0], 2, nx, ny);
    cleaner.set_psf(0, gaussian_psf(nx, ny, 1.0).view()).unwrap();
    cleaner.set_psf(1, gaussian_psf(nx, ny, 0.05).view()).unwrap();
    assert_eq!(
        cleaner.clean(10, 0.1, 0.5, 0.0),
        Err(CleanerError::MissingPsf(2))
    );

    cleaner.set_psf(2, gaussian_psf(nx, ny, 0.02).view()).unwrap();
    cleaner.set_residual(0, gaussian_psf(nx, ny, 1.0).view()).unwrap();
    assert_eq!(
        cleaner.clean(10, 0.1, 0.5, 0.0),
        Err(CleanerError::MissingResidual(1))
    );
    assert_eq!(cleaner.residual(1), Err(CleanerError::MissingResidual(1)));
}

#[test]
fn bad_psfs_are_rejected() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0], 1, nx, ny);

    let off_centre = gaussian(nx, ny, (10, 16), 2.0, 1.0);
    assert_eq!(
        cleaner.set_psf(0, off_centre.view()),
        Err(CleanerError::Psf(PsfError::OffCentre {
            expected: (16, 16),
            got: (10, 16)
        }))
    );

    let unnormalised = gaussian_psf(nx, ny, 0.9);
    assert!(matches!(
        cleaner.set_psf(0, unnormalised.view()),
        Err(CleanerError::Psf(PsfError::NotNormalised { .. }))
    ));

    // Within tolerance.
    assert!(cleaner
        .set_psf(0, gaussian_psf(nx, ny, 1.0005).view())
        .is_ok());
}

#[test]
fn set_model_seeds_the_flux() {
    let (nx, ny) = (32, 32);
    let mut cleaner = get_cleaner(&[0.0], 1, nx, ny);
    let mut model = Array2::zeros((nx, ny));
    model[(3, 4)] = 2.5;
    model[(20, 21)] = 0.5;
    cleaner.set_model(0, model.view()).unwrap();
    assert_eq!(cleaner.model(0).unwrap(), model);
    approx::assert_abs_diff_eq!(cleaner.total_taylor_flux()[0], 3.0);

    // Changing the scales or Taylor terms discards everything.
    cleaner.set_num_taylor_terms(2).unwrap();
    assert_eq!(cleaner.model(0), Err(CleanerError::NotInitialised));
}
