// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The PSF/scale convolution cube and the per-scale peak Hessians.
//!
//! For Taylor terms `t1, t2` and scales `s1, s2`, the cube holds
//! `PSF[t1+t2] * scale[s1] * scale[s2]` (`*` is convolution), cropped to the
//! PSF support around the PSF peak. The cube is symmetric in both the Taylor
//! and scale pairs, so only the `t1 >= t2, s1 >= s2` planes are stored.
//!
//! The peak Hessian of scale `s` is the `ntaylor x ntaylor` matrix of cube
//! values at the PSF peak, `A_s[t1, t2] = cube[t1, t2, s, s](peak)`. Each one is
//! inverted once; the minor cycle uses the same inverse at every pixel.

mod error;

pub use error::HessianError;

use log::{debug, info, warn};
use ndarray::prelude::*;
use rayon::prelude::*;

use crate::{c64, math::invert_sym_pos_def, math::Fft2d, scales::ScaleBank};

/// The index of an unordered pair `(a, b)`, `a >= b`, in packed triangular
/// storage.
fn triangular_index(a: usize, b: usize) -> usize {
    debug_assert!(a >= b);
    a * (a + 1) / 2 + b
}

/// The number of unordered pairs (including identical pairs) of `n` things.
pub fn num_unordered_pairs(n: usize) -> usize {
    n * (n + 1) / 2
}

/// A pair of Taylor terms and a pair of scales, identifying one plane of a
/// [`ConvolutionCube`]. The pairs are unordered; constructing one always
/// stores the larger index of each pair first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaylorScalePair {
    pub t1: usize,
    pub t2: usize,
    pub s1: usize,
    pub s2: usize,
}

impl TaylorScalePair {
    pub fn new(t1: usize, t2: usize, s1: usize, s2: usize) -> TaylorScalePair {
        TaylorScalePair {
            t1: t1.max(t2),
            t2: t1.min(t2),
            s1: s1.max(s2),
            s2: s1.min(s2),
        }
    }

    /// The order of the PSF involved in this plane.
    pub fn psf_order(&self) -> usize {
        self.t1 + self.t2
    }

    /// The position of this plane in packed storage.
    pub fn offset(&self, num_scales: usize) -> usize {
        triangular_index(self.t1, self.t2) * num_unordered_pairs(num_scales)
            + triangular_index(self.s1, self.s2)
    }

    /// Every distinct pair, in storage order.
    pub fn all(num_taylor: usize, num_scales: usize) -> Vec<TaylorScalePair> {
        let mut pairs = Vec::with_capacity(
            num_unordered_pairs(num_taylor) * num_unordered_pairs(num_scales),
        );
        for t1 in 0..num_taylor {
            for t2 in 0..=t1 {
                for s1 in 0..num_scales {
                    for s2 in 0..=s1 {
                        pairs.push(TaylorScalePair { t1, t2, s1, s2 });
                    }
                }
            }
        }
        pairs
    }
}

/// PSF/scale cross-convolutions, each cropped to the PSF support with the
/// PSF peak at `(support/2, support/2)`.
pub struct ConvolutionCube {
    num_taylor: usize,
    num_scales: usize,
    support: usize,
    planes: Vec<Array2<f32>>,
}

impl ConvolutionCube {
    /// Compute the cube. `psf_fts` must hold the transforms of the PSFs of
    /// orders `0..2*num_taylor-1`, each made with its peak at the image
    /// centre.
    pub fn new(
        psf_fts: &[&Array2<c64>],
        bank: &ScaleBank,
        fft: &Fft2d,
        num_taylor: usize,
        support: usize,
    ) -> ConvolutionCube {
        assert!(psf_fts.len() >= 2 * num_taylor - 1);
        let num_scales = bank.len();
        let (nx, ny) = fft.shape();
        let (cx, cy) = (nx / 2, ny / 2);
        let half = support / 2;

        let pairs = TaylorScalePair::all(num_taylor, num_scales);
        info!(
            "Calculating {} PSF and scale convolutions ({support}x{support} pixels each)",
            pairs.len()
        );
        let planes = pairs
            .par_iter()
            .map(|pair| {
                let product = psf_fts[pair.psf_order()] * &bank.transforms[pair.s1]
                    * &bank.transforms[pair.s2];
                fft.inverse_real(product)
                    .slice(s![cx - half..cx - half + support, cy - half..cy - half + support])
                    .to_owned()
            })
            .collect();

        ConvolutionCube {
            num_taylor,
            num_scales,
            support,
            planes,
        }
    }

    pub fn num_taylor(&self) -> usize {
        self.num_taylor
    }

    pub fn num_scales(&self) -> usize {
        self.num_scales
    }

    pub fn support(&self) -> usize {
        self.support
    }

    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    pub fn get(&self, pair: TaylorScalePair) -> ArrayView2<f32> {
        self.planes[pair.offset(self.num_scales)].view()
    }

    /// The value of a plane at the PSF peak.
    pub fn peak(&self, pair: TaylorScalePair) -> f64 {
        let half = self.support / 2;
        self.get(pair)[(half, half)] as f64
    }
}

/// A peak Hessian and its inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct Hessian {
    pub(crate) scale_size: f32,
    pub(crate) matrix: Array2<f64>,
    pub(crate) inverse: Array2<f64>,
}

impl Hessian {
    pub fn scale_size(&self) -> f32 {
        self.scale_size
    }

    pub fn matrix(&self) -> ArrayView2<f64> {
        self.matrix.view()
    }

    pub fn inverse(&self) -> ArrayView2<f64> {
        self.inverse.view()
    }
}

/// Sample the peak Hessian of a scale from the cube.
pub fn peak_hessian_matrix(cube: &ConvolutionCube, scale: usize) -> Array2<f64> {
    let n = cube.num_taylor();
    Array2::from_shape_fn((n, n), |(t1, t2)| {
        cube.peak(TaylorScalePair::new(t1, t2, scale, scale))
    })
}

/// Check a peak Hessian for degeneracies and invert it.
///
/// The matrix is rejected if any element is exactly zero, or if any two
/// successive rows are nearly proportional: the ratios of their elements are
/// formed, and if the mean absolute difference between successive ratios is
/// below `dependence_tolerance`, the rows are deemed linearly dependent.
/// Finally, the inversion itself fails if the matrix is not positive definite.
pub fn invert_hessian(
    matrix: Array2<f64>,
    scale_size: f32,
    dependence_tolerance: f64,
) -> Result<Hessian, HessianError> {
    let n = matrix.nrows();

    if matrix.iter().any(|&v| v == 0.0) {
        warn!("The Hessian for the {scale_size} pixel scale has exact zeros:\n{matrix}");
        return Err(HessianError::ExactZero { scale_size, matrix });
    }

    for t1 in 0..n.saturating_sub(1) {
        let ratios: Vec<f64> = (0..n)
            .map(|t2| matrix[(t1, t2)] / matrix[(t1 + 1, t2)])
            .collect();
        let mean_diff = ratios.windows(2).map(|w| (w[0] - w[1]).abs()).sum::<f64>()
            / (n - 1) as f64;
        if mean_diff < dependence_tolerance {
            warn!(
                "The Hessian for the {scale_size} pixel scale has linearly-dependent rows:\n{matrix}"
            );
            return Err(HessianError::LinearlyDependent { scale_size, matrix });
        }
    }

    debug!("The Hessian for the {scale_size} pixel scale is:\n{matrix}");
    match invert_sym_pos_def(matrix.view()) {
        Ok(inverse) => {
            debug!("Its inverse is:\n{inverse}");
            Ok(Hessian {
                scale_size,
                matrix,
                inverse,
            })
        }
        Err(e) => {
            warn!("Cannot invert the Hessian for the {scale_size} pixel scale ({e}):\n{matrix}");
            Err(HessianError::NotPositiveDefinite { scale_size, matrix })
        }
    }
}

/// The cube together with the (inverted) peak Hessian of every scale.
pub struct PeakHessian {
    pub(crate) cube: ConvolutionCube,
    pub(crate) hessians: Vec<Hessian>,
}

impl PeakHessian {
    /// Build the cube and the Hessians. Nothing is kept if any Hessian is
    /// unusable.
    pub fn compute(
        psf_fts: &[&Array2<c64>],
        bank: &ScaleBank,
        fft: &Fft2d,
        num_taylor: usize,
        support: usize,
        dependence_tolerance: f64,
    ) -> Result<PeakHessian, HessianError> {
        let cube = ConvolutionCube::new(psf_fts, bank, fft, num_taylor, support);
        let hessians = bank
            .sizes()
            .iter()
            .enumerate()
            .map(|(scale, &size)| {
                invert_hessian(peak_hessian_matrix(&cube, scale), size, dependence_tolerance)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PeakHessian { cube, hessians })
    }

    pub fn cube(&self) -> &ConvolutionCube {
        &self.cube
    }

    pub fn hessians(&self) -> &[Hessian] {
        &self.hessians
    }
}
