// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Small dense linear algebra on ndarray matrices, through `faer`.

use faer::{
    linalg::solvers::{Llt, LltError, Solve},
    Mat, Side,
};
use ndarray::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinalgError {
    #[error("The matrix has non-finite elements")]
    NonFinite,

    #[error("Cholesky factorisation failed: {0:?}")]
    Cholesky(LltError),
}

/// Invert a symmetric positive-definite matrix by Cholesky-factorising it and
/// solving against the identity. Only the lower triangle of `a` is read. The
/// result is made exactly symmetric.
pub fn invert_sym_pos_def(a: ArrayView2<f64>) -> Result<Array2<f64>, LinalgError> {
    let n = a.nrows();
    assert_eq!(a.ncols(), n, "Only square matrices can be inverted");
    if a.iter().any(|v| !v.is_finite()) {
        return Err(LinalgError::NonFinite);
    }

    let mat = Mat::from_fn(n, n, |i, j| a[(i, j)]);
    let llt = Llt::new(mat.as_ref(), Side::Lower).map_err(LinalgError::Cholesky)?;
    let inv = llt.solve(Mat::<f64>::identity(n, n).as_ref());

    Ok(Array2::from_shape_fn((n, n), |(i, j)| {
        0.5 * (inv[(i, j)] + inv[(j, i)])
    }))
}
