// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from setting up and running the cleaner.

use thiserror::Error;

use crate::{config::InvalidConfigError, hessian::HessianError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CleanerError {
    #[error("No scales were supplied; at least one scale size is required")]
    NoScales,

    #[error("Scale sizes must not be negative, but got {0}")]
    NegativeScaleSize(f32),

    #[error("At least one Taylor term is required")]
    NoTaylorTerms,

    #[error("The cleaner has not been initialised with an image size")]
    NotInitialised,

    #[error("Taylor order {order} is invalid; there are {num_taylor} Taylor terms")]
    InvalidTaylorOrder { order: usize, num_taylor: usize },

    #[error("PSF order {order} is invalid; there are {num_psfs} PSF terms for {num_taylor} Taylor terms")]
    InvalidPsfOrder {
        order: usize,
        num_psfs: usize,
        num_taylor: usize,
    },

    #[error("Expected a {what} of shape {expected:?}, but got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("No PSF has been set for order {0}")]
    MissingPsf(usize),

    #[error("No residual image has been set for Taylor order {0}")]
    MissingResidual(usize),

    #[error("Expected {expected} scale biases (one per scale), but got {got}")]
    InvalidScaleBias { expected: usize, got: usize },

    #[error("The cleaner needs {need_mib:.1} MiB, but only {available_mib:.1} MiB may be used; try a smaller image, or fewer scales or Taylor terms")]
    InsufficientMemory { need_mib: f64, available_mib: f64 },

    #[error(transparent)]
    Config(#[from] InvalidConfigError),

    #[error(transparent)]
    Psf(#[from] PsfError),

    #[error(transparent)]
    Hessian(#[from] HessianError),
}

/// Problems with the order-0 PSF.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PsfError {
    #[error("The PSF peak is at {got:?}, but it must be at the image centre {expected:?}")]
    OffCentre {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("The PSF peak is {peak}, but it must be 1 (within {tolerance})")]
    NotNormalised { peak: f32, tolerance: f32 },
}
