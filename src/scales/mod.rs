// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The bank of scale kernels, and the per-scale masks.
//!
//! Each scale is a tapered, truncated prolate-spheroidal blob of a given
//! radius in pixels; a scale of size 0 is a delta function (point source).
//! Kernels are made at full image size, centred on `(nx/2, ny/2)`, and
//! normalised to unit volume.


use log::{debug, warn};
use ndarray::prelude::*;
use rayon::prelude::*;

use crate::{c64, math::Fft2d};

/// The scale sizes used when none are given: `[0, 2*10^((s-2)/2), ...]`
/// (i.e. 0, 0.63, 2, 6.3, 20, ...).
pub fn default_scale_sizes(num_scales: usize) -> Vec<f32> {
    (0..num_scales)
        .map(|s| {
            if s == 0 {
                0.0
            } else {
                2.0 * 10_f32.powf((s as f32 - 2.0) / 2.0)
            }
        })
        .collect()
}

/// Remove any scale that doesn't fit in half of the image along both axes.
/// A warning is logged for each dropped scale.
pub fn prune_scale_sizes(sizes: &[f32], nx: usize, ny: usize) -> Vec<f32> {
    let max_x = (nx / 2) as f32;
    let max_y = (ny / 2) as f32;
    sizes
        .iter()
        .copied()
        .filter(|&size| {
            if size > max_x || size > max_y {
                warn!(
                    "Scale size {size} pixels is too large for an image of {nx}x{ny} pixels; ignoring it"
                );
                false
            } else {
                true
            }
        })
        .collect()
}

/// The prolate spheroidal function used to taper scale kernels, as a
/// rational approximation over `nu` in `[0, 1]`.
pub fn spheroidal(nu: f64) -> f64 {
    const P: [[f64; 5]; 2] = [
        [8.203343e-2, -3.644705e-1, 6.278660e-1, -5.335581e-1, 2.312756e-1],
        [4.028559e-3, -3.697768e-2, 1.021332e-1, -1.201436e-1, 6.412774e-2],
    ];
    const Q: [[f64; 3]; 2] = [
        [1.0, 8.212018e-1, 2.078043e-1],
        [1.0, 9.599102e-1, 2.918724e-1],
    ];

    if nu <= 0.0 {
        return 1.0;
    }
    if nu >= 1.0 {
        return 0.0;
    }
    let (part, nu_end) = if nu < 0.75 { (0, 0.75) } else { (1, 1.0) };
    let del_nu_sq = nu * nu - nu_end * nu_end;

    // Horner's method.
    let top = P[part].iter().rev().fold(0.0, |acc, p| acc * del_nu_sq + p);
    let bot = Q[part].iter().rev().fold(0.0, |acc, q| acc * del_nu_sq + q);
    if bot == 0.0 {
        0.0
    } else {
        top / bot
    }
}

/// Make a scale kernel of the given size (radius in pixels), centred on
/// `(nx/2, ny/2)` and normalised so its pixels sum to 1.
pub fn make_scale(size: f32, nx: usize, ny: usize) -> Array2<f32> {
    let mut kernel = Array2::zeros((nx, ny));
    let (ref_x, ref_y) = (nx / 2, ny / 2);
    if size == 0.0 {
        kernel[(ref_x, ref_y)] = 1.0;
        return kernel;
    }

    let size = size as f64;
    let reach = size as usize;
    let min_x = ref_x.saturating_sub(reach);
    let max_x = (ref_x + reach).min(nx - 1);
    let min_y = ref_y.saturating_sub(reach);
    let max_y = (ref_y + reach).min(ny - 1);

    let mut volume = 0.0;
    for x in min_x..=max_x {
        let x_part = ((ref_x as f64 - x as f64) / size).powi(2);
        for y in min_y..=max_y {
            let rad2 = x_part + ((ref_y as f64 - y as f64) / size).powi(2);
            if rad2 < 1.0 {
                let v = (1.0 - rad2) * spheroidal(rad2.sqrt());
                kernel[(x, y)] = v as f32;
                volume += v;
            }
        }
    }
    if volume > 0.0 {
        let norm = (1.0 / volume) as f32;
        kernel.mapv_inplace(|v| v * norm);
    }
    kernel
}

/// All of the scale kernels for a particular image size.
pub struct ScaleBank {
    /// The scale sizes \[pixels\].
    pub(crate) sizes: Vec<f32>,

    /// The full-image Fourier transform of each kernel, with the kernel centre
    /// moved to the origin.
    pub(crate) transforms: Vec<Array2<c64>>,

    /// Each kernel cropped to the PSF support, centred on
    /// `(support/2, support/2)`.
    pub(crate) patches: Vec<Array2<f32>>,
}

impl ScaleBank {
    pub fn new(sizes: &[f32], fft: &Fft2d, support: usize) -> ScaleBank {
        let (nx, ny) = fft.shape();
        let (cx, cy) = (nx / 2, ny / 2);
        let half = support / 2;

        let (transforms, patches): (Vec<_>, Vec<_>) = sizes
            .par_iter()
            .map(|&size| {
                debug!("Making scale kernel of size {size} pixels");
                let kernel = make_scale(size, nx, ny);
                let transform = fft.forward_centred(kernel.view());
                let patch = kernel
                    .slice(s![cx - half..cx - half + support, cy - half..cy - half + support])
                    .to_owned();
                (transform, patch)
            })
            .unzip();

        ScaleBank {
            sizes: sizes.to_vec(),
            transforms,
            patches,
        }
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn patch(&self, scale: usize) -> ArrayView2<f32> {
        self.patches[scale].view()
    }

    /// Build the mask of every scale. Without a user mask, every pixel is
    /// allowed. A user mask is convolved with each scale kernel, and if
    /// `threshold` is positive, the result is set to 1 where it exceeds
    /// `threshold` and 0 elsewhere; otherwise the smooth result is used as
    /// weights. Finally, each mask gets a zero border `border_factor` times
    /// the scale size wide.
    pub fn masks(
        &self,
        fft: &Fft2d,
        user_mask: Option<ArrayView2<f32>>,
        threshold: f32,
        border_factor: f32,
    ) -> Vec<Array2<f32>> {
        let shape = fft.shape();
        let mask_ft = user_mask.map(|m| fft.forward_real(m));

        self.sizes
            .par_iter()
            .zip(self.transforms.par_iter())
            .map(|(&size, transform)| {
                let mut mask = match &mask_ft {
                    None => Array2::ones(shape),
                    Some(mask_ft) => {
                        let convolved = fft.inverse_real(mask_ft * transform);
                        if threshold > 0.0 {
                            convolved.mapv(|v| if v > threshold { 1.0 } else { 0.0 })
                        } else {
                            convolved
                        }
                    }
                };
                zero_border(mask.view_mut(), (size * border_factor) as usize);
                mask
            })
            .collect()
    }
}

/// Zero all pixels within `border` pixels of the image edges, and the edge
/// pixels themselves.
pub fn zero_border(mut mask: ArrayViewMut2<f32>, border: usize) {
    let (nx, ny) = mask.dim();
    let far_x = nx.saturating_sub(border + 1);
    let far_y = ny.saturating_sub(border + 1);
    mask.indexed_iter_mut()
        .filter(|&((x, y), _)| x <= border || y <= border || x >= far_x || y >= far_y)
        .for_each(|(_, v)| *v = 0.0);
}
