// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Buffers allocated by `initialise`.

use ndarray::prelude::*;

use crate::{
    c64,
    geometry::ImagePatch,
    hessian::PeakHessian,
    math::Fft2d,
    scales::ScaleBank,
    CleanerError,
};

/// The largest (masked) objective value of a scale, and where it is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct ScalePeak {
    pub(super) value: f32,
    pub(super) pos: (usize, usize),
}

/// Everything a single scale works on during a minor-cycle iteration. No two
/// scales share any of these buffers, so scales can be processed in parallel.
pub(super) struct ScaleWorkspace {
    /// Residuals convolved with this scale, `[taylor, x, y]`.
    pub(super) rhs: Array3<f32>,
    /// Per-pixel Taylor coefficients, `[taylor, x, y]`.
    pub(super) coeffs: Array3<f32>,
    /// Per-pixel objective.
    pub(super) objective: Array2<f32>,
    pub(super) mask: Array2<f32>,
    pub(super) peak: ScalePeak,
}

impl ScaleWorkspace {
    fn new(num_taylor: usize, nx: usize, ny: usize) -> ScaleWorkspace {
        ScaleWorkspace {
            rhs: Array3::zeros((num_taylor, nx, ny)),
            coeffs: Array3::zeros((num_taylor, nx, ny)),
            objective: Array2::zeros((nx, ny)),
            mask: Array2::ones((nx, ny)),
            peak: ScalePeak {
                value: 0.0,
                pos: (0, 0),
            },
        }
    }
}

pub(super) struct Workspace {
    pub(super) nx: usize,
    pub(super) ny: usize,
    pub(super) support: usize,
    pub(super) fft: Fft2d,
    pub(super) bank: ScaleBank,
    pub(super) scale_bias: Vec<f32>,

    /// Transforms of the PSFs, one per PSF order.
    pub(super) psf_fts: Vec<Option<Array2<c64>>>,
    /// One per Taylor term.
    pub(super) residuals: Vec<Option<Array2<f32>>>,
    /// One per Taylor term.
    pub(super) models: Vec<Array2<f32>>,
    /// One per scale.
    pub(super) scales: Vec<ScaleWorkspace>,

    /// The cube and Hessians; made at the first `clean` and kept until a PSF
    /// changes.
    pub(super) peak_hessian: Option<PeakHessian>,

    /// The minor-cycle stopping threshold derived from the peak residual. It is
    /// forgotten when any residual is replaced.
    pub(super) flux_limit: Option<f32>,

    pub(super) total_iterations: usize,
    pub(super) last_patch: Option<ImagePatch>,
    pub(super) total_taylor_flux: Vec<f64>,
    pub(super) total_scale_flux: Vec<f64>,
}

impl Workspace {
    pub(super) fn new(
        nx: usize,
        ny: usize,
        support: usize,
        num_taylor: usize,
        scale_sizes: &[f32],
    ) -> Workspace {
        let fft = Fft2d::new(nx, ny);
        let bank = ScaleBank::new(scale_sizes, &fft, support);
        let num_scales = bank.len();
        Workspace {
            nx,
            ny,
            support,
            fft,
            bank,
            scale_bias: vec![1.0; num_scales],
            psf_fts: vec![None; 2 * num_taylor - 1],
            residuals: vec![None; num_taylor],
            models: vec![Array2::zeros((nx, ny)); num_taylor],
            scales: (0..num_scales)
                .map(|_| ScaleWorkspace::new(num_taylor, nx, ny))
                .collect(),
            peak_hessian: None,
            flux_limit: None,
            total_iterations: 0,
            last_patch: None,
            total_taylor_flux: vec![0.0; num_taylor],
            total_scale_flux: vec![0.0; num_scales],
        }
    }

    pub(super) fn num_taylor(&self) -> usize {
        self.models.len()
    }

    pub(super) fn num_scales(&self) -> usize {
        self.scales.len()
    }

    pub(super) fn check_shape(
        &self,
        what: &'static str,
        image: ArrayView2<f32>,
    ) -> Result<(), CleanerError> {
        if image.dim() != (self.nx, self.ny) {
            return Err(CleanerError::ShapeMismatch {
                what,
                expected: (self.nx, self.ny),
                got: image.dim(),
            });
        }
        Ok(())
    }

    pub(super) fn check_taylor_order(&self, order: usize) -> Result<(), CleanerError> {
        if order >= self.num_taylor() {
            return Err(CleanerError::InvalidTaylorOrder {
                order,
                num_taylor: self.num_taylor(),
            });
        }
        Ok(())
    }

    /// All of the PSF transforms, if they have all been set.
    pub(super) fn psf_fts(&self) -> Result<Vec<&Array2<c64>>, CleanerError> {
        self.psf_fts
            .iter()
            .enumerate()
            .map(|(order, ft)| ft.as_ref().ok_or(CleanerError::MissingPsf(order)))
            .collect()
    }

    /// All of the residual images, if they have all been set.
    pub(super) fn residuals(&self) -> Result<Vec<&Array2<f32>>, CleanerError> {
        self.residuals
            .iter()
            .enumerate()
            .map(|(order, r)| r.as_ref().ok_or(CleanerError::MissingResidual(order)))
            .collect()
    }

    pub(super) fn compute_peak_hessian(
        &self,
        dependence_tolerance: f64,
    ) -> Result<PeakHessian, CleanerError> {
        let psf_fts = self.psf_fts()?;
        let peak_hessian = PeakHessian::compute(
            &psf_fts,
            &self.bank,
            &self.fft,
            self.num_taylor(),
            self.support,
            dependence_tolerance,
        )?;
        Ok(peak_hessian)
    }
}
