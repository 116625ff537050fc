// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The multi-term (multi-frequency), multi-scale matrix cleaner.
//!
//! Typical use, once per major cycle:
//!
//! 1. (once) [`MultiTermCleaner::set_scales`],
//!    [`MultiTermCleaner::set_num_taylor_terms`],
//!    [`MultiTermCleaner::initialise`] and [`MultiTermCleaner::set_psf`] for
//!    each of the `2*ntaylor-1` PSF orders;
//! 2. [`MultiTermCleaner::set_residual`] for each Taylor term;
//! 3. [`MultiTermCleaner::clean`];
//! 4. read back the models and residuals.

mod minor_cycle;
mod workspace;

use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::prelude::*;
use vec1::{vec1, Vec1};

use crate::{
    config::CleanerConfig,
    constants::HESSIAN_FAILURE_CODE,
    geometry::{psf_support_size, ImagePatch},
    hessian::Hessian,
    math::find_max_abs,
    memory::check_memory,
    scales::prune_scale_sizes,
    CleanerError, PsfError,
};
use workspace::Workspace;

/// How a call to [`MultiTermCleaner::clean`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanOutcome {
    /// The peak residual was already below the stopping threshold; nothing was
    /// done.
    AlreadyConverged,

    /// The peak residual fell below the stopping threshold.
    Converged { iterations: usize },

    /// The iteration limit was reached before converging.
    MaxIterations { iterations: usize },

    /// The minor cycle was stopped because it appeared to be diverging. The
    /// last component has already been applied to the images.
    Diverged { iterations: usize },
}

impl CleanOutcome {
    /// The number of minor-cycle iterations performed.
    pub fn iterations(&self) -> usize {
        match self {
            CleanOutcome::AlreadyConverged => 0,
            CleanOutcome::Converged { iterations }
            | CleanOutcome::MaxIterations { iterations }
            | CleanOutcome::Diverged { iterations } => *iterations,
        }
    }

    /// The outcome as a status code: 0 if already converged, -1 if diverging,
    /// otherwise the number of iterations performed. (A Hessian that can't be
    /// formed is an error, corresponding to [`HESSIAN_FAILURE_CODE`].)
    pub fn code(&self) -> i32 {
        match self {
            CleanOutcome::Diverged { .. } => -1,
            _ => self.iterations() as i32,
        }
    }

    pub fn is_diverged(&self) -> bool {
        matches!(self, CleanOutcome::Diverged { .. })
    }
}

/// Convert the result of [`MultiTermCleaner::clean`] to a status code.
/// Errors from an unusable Hessian map to [`HESSIAN_FAILURE_CODE`]; other
/// errors are caller mistakes and are passed through.
pub fn clean_status_code(result: &Result<CleanOutcome, CleanerError>) -> Option<i32> {
    match result {
        Ok(outcome) => Some(outcome.code()),
        Err(CleanerError::Hessian(_)) => Some(HESSIAN_FAILURE_CODE),
        Err(_) => None,
    }
}

/// Check that an order-0 PSF peaks at the image centre with a value of 1.
pub fn validate_psf(psf: ArrayView2<f32>, tolerance: f32) -> Result<(), PsfError> {
    let (nx, ny) = psf.dim();
    let (peak, pos) = find_max_abs(psf);
    debug!("Peak of PSF = {peak} at {pos:?}");

    let centre = (nx / 2, ny / 2);
    if pos != centre && psf[pos] != psf[centre] {
        warn!("The PSF peak is at {pos:?}, not at the image centre {centre:?}");
        return Err(PsfError::OffCentre {
            expected: centre,
            got: pos,
        });
    }
    if (peak - 1.0).abs() > tolerance {
        warn!("The PSF peak is {peak}, not 1");
        return Err(PsfError::NotNormalised { peak, tolerance });
    }
    Ok(())
}

/// Joint deconvolution of a set of Taylor-term residual images with a bank
/// of scales.
pub struct MultiTermCleaner {
    config: CleanerConfig,
    scale_sizes: Vec1<f32>,
    num_taylor: usize,
    mask: Option<Arc<Array2<f32>>>,
    workspace: Option<Workspace>,
}

impl Default for MultiTermCleaner {
    fn default() -> Self {
        Self {
            config: CleanerConfig::default(),
            scale_sizes: vec1![0.0],
            num_taylor: 1,
            mask: None,
            workspace: None,
        }
    }
}

impl MultiTermCleaner {
    /// A cleaner with a single point scale and a single Taylor term.
    pub fn new(config: CleanerConfig) -> Result<MultiTermCleaner, CleanerError> {
        config.validate()?;
        Ok(MultiTermCleaner {
            config,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Set the scale sizes \[pixels\]. Any previous initialisation (including
    /// models) is discarded.
    pub fn set_scales(&mut self, sizes: &[f32]) -> Result<(), CleanerError> {
        let sizes = Vec1::try_from_vec(sizes.to_vec()).map_err(|_| CleanerError::NoScales)?;
        if let Some(&bad) = sizes.iter().find(|&&s| !(s >= 0.0)) {
            return Err(CleanerError::NegativeScaleSize(bad));
        }
        self.scale_sizes = sizes;
        self.workspace = None;
        Ok(())
    }

    /// Set the number of Taylor terms. `2*n-1` PSFs will be needed. Any
    /// previous initialisation (including models) is discarded.
    pub fn set_num_taylor_terms(&mut self, n: usize) -> Result<(), CleanerError> {
        if n == 0 {
            return Err(CleanerError::NoTaylorTerms);
        }
        self.num_taylor = n;
        self.workspace = None;
        Ok(())
    }

    /// Allocate everything for images of `nx` by `ny` pixels. Scales too big
    /// for the image are dropped. If the allocations wouldn't fit in the
    /// allowed memory, nothing is allocated and an error is returned.
    pub fn initialise(&mut self, nx: usize, ny: usize) -> Result<(), CleanerError> {
        let sizes = prune_scale_sizes(&self.scale_sizes, nx, ny);
        if sizes.is_empty() {
            return Err(CleanerError::NoScales);
        }
        let max_scale = sizes.iter().copied().fold(0.0, f32::max);
        let support = psf_support_size(
            self.config.psf_beam_width,
            self.config.num_beams,
            max_scale,
            nx,
            ny,
        );
        info!(
            "Initialising for {nx}x{ny} images, {} Taylor terms, scales {sizes:?} and a {support}x{support} PSF patch",
            self.num_taylor
        );

        check_memory(
            nx,
            ny,
            self.num_taylor,
            sizes.len(),
            support,
            self.config.memory_limit_mib,
            self.config.memory_fraction,
        )?;

        self.workspace = None;
        self.workspace = Some(Workspace::new(nx, ny, support, self.num_taylor, &sizes));
        Ok(())
    }

    fn workspace(&self) -> Result<&Workspace, CleanerError> {
        self.workspace.as_ref().ok_or(CleanerError::NotInitialised)
    }

    fn workspace_mut(&mut self) -> Result<&mut Workspace, CleanerError> {
        self.workspace.as_mut().ok_or(CleanerError::NotInitialised)
    }

    /// Set the PSF of an order in `0..2*ntaylor-1`. The PSF must peak at the
    /// image centre; the order-0 PSF must also have a peak of 1. Only its
    /// transform is kept.
    pub fn set_psf(&mut self, order: usize, psf: ArrayView2<f32>) -> Result<(), CleanerError> {
        let tolerance = self.config.psf_peak_tolerance;
        let ws = self.workspace_mut()?;
        if order >= ws.psf_fts.len() {
            return Err(CleanerError::InvalidPsfOrder {
                order,
                num_psfs: ws.psf_fts.len(),
                num_taylor: ws.num_taylor(),
            });
        }
        ws.check_shape("PSF", psf)?;
        if order == 0 {
            validate_psf(psf, tolerance)?;
        }

        ws.psf_fts[order] = Some(ws.fft.forward_real(psf));
        ws.peak_hessian = None;
        Ok(())
    }

    /// Set (copy in) the residual image of a Taylor term. This starts a new
    /// major cycle; the stopping threshold is recomputed at the next `clean`.
    pub fn set_residual(
        &mut self,
        order: usize,
        residual: ArrayView2<f32>,
    ) -> Result<(), CleanerError> {
        let ws = self.workspace_mut()?;
        ws.check_taylor_order(order)?;
        ws.check_shape("residual image", residual)?;
        ws.residuals[order] = Some(residual.to_owned());
        ws.flux_limit = None;
        Ok(())
    }

    /// Set (copy in) the model image of a Taylor term. Its total flux seeds the
    /// flux bookkeeping of that term.
    pub fn set_model(&mut self, order: usize, model: ArrayView2<f32>) -> Result<(), CleanerError> {
        let ws = self.workspace_mut()?;
        ws.check_taylor_order(order)?;
        ws.check_shape("model image", model)?;
        ws.models[order].assign(&model);
        ws.total_taylor_flux[order] = model.iter().map(|&v| v as f64).sum();
        Ok(())
    }

    /// Set the user mask. Only pixels where the mask (convolved with each
    /// scale) is significant are searched for components. The mask may be
    /// shared with other cleaners.
    pub fn set_mask(&mut self, mask: Arc<Array2<f32>>) -> Result<(), CleanerError> {
        if let Some(ws) = &self.workspace {
            ws.check_shape("mask", mask.view())?;
        }
        self.mask = Some(mask);
        Ok(())
    }

    /// Weight the objective of each scale during component selection. The
    /// default weight of every scale is 1.
    pub fn set_scale_biases(&mut self, biases: &[f32]) -> Result<(), CleanerError> {
        let ws = self.workspace_mut()?;
        if biases.len() != ws.num_scales() {
            return Err(CleanerError::InvalidScaleBias {
                expected: ws.num_scales(),
                got: biases.len(),
            });
        }
        ws.scale_bias = biases.to_vec();
        Ok(())
    }

    pub fn model(&self, order: usize) -> Result<ArrayView2<f32>, CleanerError> {
        let ws = self.workspace()?;
        ws.check_taylor_order(order)?;
        Ok(ws.models[order].view())
    }

    pub fn residual(&self, order: usize) -> Result<ArrayView2<f32>, CleanerError> {
        let ws = self.workspace()?;
        ws.check_taylor_order(order)?;
        ws.residuals[order]
            .as_ref()
            .map(|r| r.view())
            .ok_or(CleanerError::MissingResidual(order))
    }

    /// The number of scales in use (after dropping oversized scales).
    pub fn num_scales(&self) -> usize {
        match &self.workspace {
            Some(ws) => ws.num_scales(),
            None => self.scale_sizes.len(),
        }
    }

    /// The scale sizes in use (after dropping oversized scales).
    pub fn scale_sizes(&self) -> &[f32] {
        match &self.workspace {
            Some(ws) => ws.bank.sizes(),
            None => self.scale_sizes.as_slice(),
        }
    }

    pub fn num_taylor_terms(&self) -> usize {
        self.num_taylor
    }

    /// The side length of the PSF support window, if initialised.
    pub fn psf_support(&self) -> Option<usize> {
        self.workspace.as_ref().map(|ws| ws.support)
    }

    /// The peak Hessians, if they have been computed.
    pub fn hessians(&self) -> Option<&[Hessian]> {
        self.workspace
            .as_ref()
            .and_then(|ws| ws.peak_hessian.as_ref())
            .map(|p| p.hessians())
    }

    pub fn hessian(&self, scale: usize) -> Option<ArrayView2<f64>> {
        self.hessians()
            .and_then(|h| h.get(scale))
            .map(|h| h.matrix())
    }

    pub fn inverse_hessian(&self, scale: usize) -> Option<ArrayView2<f64>> {
        self.hessians()
            .and_then(|h| h.get(scale))
            .map(|h| h.inverse())
    }

    /// The patch touched by the most recent component.
    pub fn last_patch(&self) -> Option<ImagePatch> {
        self.workspace.as_ref().and_then(|ws| ws.last_patch)
    }

    /// The total flux added to each Taylor term's model.
    pub fn total_taylor_flux(&self) -> &[f64] {
        self.workspace
            .as_ref()
            .map(|ws| ws.total_taylor_flux.as_slice())
            .unwrap_or(&[])
    }

    /// The total Taylor-0 flux of the components of each scale.
    pub fn total_scale_flux(&self) -> &[f64] {
        self.workspace
            .as_ref()
            .map(|ws| ws.total_scale_flux.as_slice())
            .unwrap_or(&[])
    }

    /// The number of minor-cycle iterations performed across all calls to
    /// `clean`.
    pub fn total_iterations(&self) -> usize {
        self.workspace
            .as_ref()
            .map(|ws| ws.total_iterations)
            .unwrap_or(0)
    }

    /// Make the peak Hessians if they don't exist yet. On failure, nothing is
    /// changed.
    pub fn compute_hessian_peak(&mut self) -> Result<(), CleanerError> {
        let tolerance = self.config.dependence_tolerance;
        let ws = self.workspace_mut()?;
        if ws.peak_hessian.is_none() {
            ws.peak_hessian = Some(ws.compute_peak_hessian(tolerance)?);
        }
        Ok(())
    }

    /// Run a minor cycle of at most `max_iter` iterations.
    ///
    /// The cycle stops when the peak residual falls below the larger of
    /// `threshold` and `stop_fraction` times the peak residual at the start
    /// of the major cycle. A positive `gain` is used as a fixed loop gain;
    /// otherwise the loop gain is adapted every iteration.
    ///
    /// If the Hessians can't be formed, `Err(CleanerError::Hessian)` is
    /// returned and no images are changed.
    pub fn clean(
        &mut self,
        max_iter: usize,
        stop_fraction: f32,
        gain: f32,
        threshold: f32,
    ) -> Result<CleanOutcome, CleanerError> {
        let config = self.config.clone();
        let user_mask = self.mask.clone();
        let ws = self.workspace_mut()?;
        ws.psf_fts()?;
        ws.residuals()?;
        if let Some(mask) = &user_mask {
            ws.check_shape("mask", mask.view())?;
        }

        let peak_hessian = match ws.peak_hessian.take() {
            Some(p) => p,
            None => ws.compute_peak_hessian(config.dependence_tolerance)?,
        };
        let result = ws.run_minor_cycle(
            &peak_hessian,
            user_mask.as_deref(),
            &config,
            max_iter,
            stop_fraction,
            gain,
            threshold,
        );
        ws.peak_hessian = Some(peak_hessian);
        result
    }

    /// Replace the residual images with their projection through the inverse
    /// of the point-scale Hessian. No components are searched for.
    pub fn compute_principal_solution(&mut self) -> Result<(), CleanerError> {
        info!("Computing principal solution on residuals");
        self.compute_hessian_peak()?;
        let ws = self.workspace_mut()?;
        let residuals = ws.residuals()?;
        let inverse = match &ws.peak_hessian {
            Some(p) => p.hessians()[0].inverse(),
            None => return Err(CleanerError::NotInitialised),
        };

        let solved: Vec<Array2<f32>> = (0..ws.num_taylor())
            .map(|t1| {
                let mut sum = Array2::<f64>::zeros((ws.nx, ws.ny));
                for (t2, residual) in residuals.iter().enumerate() {
                    let w = inverse[(t1, t2)];
                    sum.zip_mut_with(residual, |s, &r| *s += w * r as f64);
                }
                sum.mapv(|v| v as f32)
            })
            .collect();
        for (residual, new) in ws.residuals.iter_mut().zip(solved) {
            *residual = Some(new);
        }
        ws.flux_limit = None;
        Ok(())
    }
}
