// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Two-dimensional FFTs built from `rustfft`'s one-dimensional plans.

use std::sync::Arc;

use ndarray::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::c64;

/// Forward and inverse 2-D transforms for images of a fixed shape. The plans
/// are made once and reused for every transform; they are `Sync`, so an
/// engine can be shared between threads.
pub struct Fft2d {
    nx: usize,
    ny: usize,
    forward_x: Arc<dyn Fft<f64>>,
    forward_y: Arc<dyn Fft<f64>>,
    inverse_x: Arc<dyn Fft<f64>>,
    inverse_y: Arc<dyn Fft<f64>>,
}

impl Fft2d {
    pub fn new(nx: usize, ny: usize) -> Fft2d {
        let mut planner = FftPlanner::new();
        Fft2d {
            nx,
            ny,
            forward_x: planner.plan_fft_forward(nx),
            forward_y: planner.plan_fft_forward(ny),
            inverse_x: planner.plan_fft_inverse(nx),
            inverse_y: planner.plan_fft_inverse(ny),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    /// Transform a real image.
    pub fn forward_real(&self, image: ArrayView2<f32>) -> Array2<c64> {
        let mut data = image.mapv(|v| c64::new(v as f64, 0.0));
        self.forward(data.view_mut());
        data
    }

    /// Transform an image that is centred at `(nx/2, ny/2)` after moving its
    /// centre to the array origin. Products of transforms made this way
    /// convolve without shifting anything.
    pub fn forward_centred(&self, image: ArrayView2<f32>) -> Array2<c64> {
        let mut data = ifftshift(image).mapv(|v| c64::new(v as f64, 0.0));
        self.forward(data.view_mut());
        data
    }

    /// In-place forward transform.
    pub fn forward(&self, data: ArrayViewMut2<c64>) {
        self.transform(data, &self.forward_x, &self.forward_y);
    }

    /// In-place inverse transform, normalised so that a forward transform
    /// followed by an inverse transform is the identity.
    pub fn inverse(&self, mut data: ArrayViewMut2<c64>) {
        self.transform(data.view_mut(), &self.inverse_x, &self.inverse_y);
        let norm = 1.0 / (self.nx * self.ny) as f64;
        data.mapv_inplace(|v| v * norm);
    }

    /// Inverse transform, keeping only the real part.
    pub fn inverse_real(&self, mut data: Array2<c64>) -> Array2<f32> {
        self.inverse(data.view_mut());
        data.mapv(|v| v.re as f32)
    }

    fn transform(&self, mut data: ArrayViewMut2<c64>, fft_x: &Arc<dyn Fft<f64>>, fft_y: &Arc<dyn Fft<f64>>) {
        assert_eq!(data.dim(), (self.nx, self.ny));

        let mut lane_buf = vec![c64::default(); self.nx.max(self.ny)];
        let mut scratch = vec![
            c64::default();
            fft_x
                .get_inplace_scratch_len()
                .max(fft_y.get_inplace_scratch_len())
        ];

        // Along y; the lanes are contiguous for standard-layout arrays, but
        // copying into a buffer means the layout doesn't matter.
        for mut lane in data.lanes_mut(Axis(1)) {
            let buf = &mut lane_buf[..self.ny];
            buf.iter_mut().zip(lane.iter()).for_each(|(b, l)| *b = *l);
            fft_y.process_with_scratch(buf, &mut scratch);
            lane.iter_mut().zip(buf.iter()).for_each(|(l, b)| *l = *b);
        }
        // Along x.
        for mut lane in data.lanes_mut(Axis(0)) {
            let buf = &mut lane_buf[..self.nx];
            buf.iter_mut().zip(lane.iter()).for_each(|(b, l)| *b = *l);
            fft_x.process_with_scratch(buf, &mut scratch);
            lane.iter_mut().zip(buf.iter()).for_each(|(l, b)| *l = *b);
        }
    }
}

/// Move the pixel at `(nx/2, ny/2)` to `(0, 0)`, wrapping around the edges.
pub fn ifftshift(image: ArrayView2<f32>) -> Array2<f32> {
    let (nx, ny) = image.dim();
    Array2::from_shape_fn((nx, ny), |(i, j)| image[((i + nx / 2) % nx, (j + ny / 2) % ny)])
}

