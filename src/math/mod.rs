// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.

mod fft;
mod linalg;

pub use fft::{ifftshift, Fft2d};
pub use linalg::{invert_sym_pos_def, LinalgError};

use ndarray::prelude::*;

/// Find the pixel of `image` with the largest absolute value. The signed value
/// is returned with its `[x, y]` position. If the largest positive and
/// negative values have the same magnitude, the positive one wins; among equal
/// values, the first one found wins.
pub fn find_max_abs(image: ArrayView2<f32>) -> (f32, (usize, usize)) {
    pick_max_abs(image.indexed_iter().map(|(pos, &v)| (pos, v)))
}

/// As [`find_max_abs`], but of `image * mask`.
pub fn find_max_abs_masked(image: ArrayView2<f32>, mask: ArrayView2<f32>) -> (f32, (usize, usize)) {
    assert_eq!(image.dim(), mask.dim());
    pick_max_abs(
        image
            .indexed_iter()
            .zip(mask.iter())
            .map(|((pos, &i), &m)| (pos, i * m)),
    )
}

fn pick_max_abs(values: impl Iterator<Item = ((usize, usize), f32)>) -> (f32, (usize, usize)) {
    let mut max: Option<(f32, (usize, usize))> = None;
    let mut min: Option<(f32, (usize, usize))> = None;
    for (pos, v) in values {
        if max.map_or(true, |(m, _)| v > m) {
            max = Some((v, pos));
        }
        if min.map_or(true, |(m, _)| v < m) {
            min = Some((v, pos));
        }
    }

    match (max, min) {
        (Some(max), Some(min)) if min.0.abs() > max.0.abs() => min,
        (Some(max), _) => max,
        _ => (0.0, (0, 0)),
    }
}

/// Add `scale * src` to `dst`. Both views must have the same shape.
pub(crate) fn scaled_add_f32(mut dst: ArrayViewMut2<f32>, scale: f64, src: ArrayView2<f32>) {
    dst.zip_mut_with(&src, |d, &s| *d = (*d as f64 + scale * s as f64) as f32);
}
