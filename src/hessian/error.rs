// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from forming and inverting the peak Hessians.

use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HessianError {
    #[error("The multi-term Hessian for the {scale_size} pixel scale has exact zeros; not proceeding further. The matrix is:\n{matrix}")]
    ExactZero {
        scale_size: f32,
        matrix: Array2<f64>,
    },

    #[error("The multi-term Hessian for the {scale_size} pixel scale has linearly-dependent rows; not proceeding further. The matrix is:\n{matrix}")]
    LinearlyDependent {
        scale_size: f32,
        matrix: Array2<f64>,
    },

    #[error("Could not invert the multi-term Hessian for the {scale_size} pixel scale; it is not positive definite. The matrix is:\n{matrix}")]
    NotPositiveDefinite {
        scale_size: f32,
        matrix: Array2<f64>,
    },
}
