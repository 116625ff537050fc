// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The matching-pursuit minor cycle.
//!
//! Each iteration solves, for every scale and every pixel of the current
//! patch, the small linear system `A_s c = R_s` for the Taylor coefficients
//! `c`, and evaluates the objective `2 c.R - c.A_s.c` (the decrease in
//! chi-squared if the component were subtracted). The (scale, pixel) with the
//! largest objective is chosen; a fraction (the loop gain) of its component is
//! added to the model images and its response is subtracted from the RHS
//! images of every scale, within the patch around the chosen pixel.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{debug, info, trace, warn};
use ndarray::{prelude::*, Zip};
use rayon::prelude::*;

use super::{
    workspace::{ScalePeak, ScaleWorkspace, Workspace},
    CleanOutcome,
};
use crate::{
    config::CleanerConfig,
    geometry::{ImagePatch, PixelBox},
    hessian::{ConvolutionCube, Hessian, PeakHessian, TaylorScalePair},
    math::{find_max_abs_masked, scaled_add_f32},
    CleanerError,
};

/// The component chosen in a minor-cycle iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Component {
    pub(super) scale: usize,
    pub(super) value: f32,
    pub(super) pos: (usize, usize),
}

/// What the convergence check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Progress {
    Continue,
    Converged,
    Diverged,
}

/// Loop-gain control and divergence detection for one minor cycle.
pub(super) struct GainControl {
    gain: f32,
    adaptive: bool,
    max_gain: f32,
    gain_step: f32,
    min_gain: f32,
    divergence_ratio: f32,
    /// The objective of the previous iteration.
    prev_max: Option<f32>,
    /// The smallest (absolute) objective seen so far.
    min_max: Option<f32>,
}

impl GainControl {
    /// A non-positive `input_gain` gives adaptive gain control, starting from
    /// the configured default loop gain.
    pub(super) fn new(config: &CleanerConfig, input_gain: f32, stop_fraction: f32) -> GainControl {
        let adaptive = input_gain <= 0.0;
        GainControl {
            gain: if adaptive {
                config.default_loop_gain
            } else {
                input_gain
            },
            adaptive,
            max_gain: (1.0 - stop_fraction).min(config.max_loop_gain),
            gain_step: config.gain_step,
            min_gain: config.min_loop_gain,
            divergence_ratio: config.divergence_ratio,
            prev_max: None,
            min_max: None,
        }
    }

    pub(super) fn gain(&self) -> f32 {
        self.gain
    }

    /// Update the gain after the iteration with index `iteration` (0-based)
    /// chose a component with objective `global_max`. Returns `true` if the
    /// minor cycle appears to be diverging.
    pub(super) fn update(&mut self, iteration: usize, global_max: f32) -> bool {
        let mut diverging = false;

        if self.adaptive && iteration > 1 {
            match self.prev_max {
                Some(prev) if global_max < prev => self.gain *= self.gain_step,
                _ => self.gain /= self.gain_step,
            }
            self.gain = self.gain.min(self.max_gain);

            // Roughly ten successive increases of the objective.
            if self.gain < self.min_gain {
                warn!(
                    "Loop gain {} is below {}; the minor cycle is not converging any more",
                    self.gain, self.min_gain
                );
                diverging = true;
            }
        }

        if let Some(min_max) = self.min_max {
            if min_max > 0.0 && ((min_max - global_max) / min_max).abs() > self.divergence_ratio {
                warn!(
                    "Objective {global_max} has regressed by more than {:.0}% from the best seen ({min_max}); the minor cycle is diverging",
                    self.divergence_ratio * 100.0
                );
                diverging = true;
            }
        }

        self.prev_max = Some(global_max);
        self.min_max = Some(match self.min_max {
            Some(m) => m.min(global_max.abs()),
            None => global_max.abs(),
        });
        diverging
    }
}

impl ScaleWorkspace {
    /// Solve for the Taylor coefficients of every pixel in `patch`.
    pub(super) fn solve_matrix_eqn(&mut self, inverse: ArrayView2<f64>, patch: PixelBox) {
        let num_taylor = inverse.nrows();
        let rhs = self.rhs.slice(patch.stacked_slice());
        let mut coeffs = self.coeffs.slice_mut(patch.stacked_slice());
        Zip::from(coeffs.lanes_mut(Axis(0)))
            .and(rhs.lanes(Axis(0)))
            .for_each(|mut c, r| {
                for t1 in 0..num_taylor {
                    let mut sum = 0.0;
                    for t2 in 0..num_taylor {
                        sum += inverse[(t1, t2)] * r[t2] as f64;
                    }
                    c[t1] = sum as f32;
                }
            });
    }

    /// Evaluate the objective over `patch`, then find the best pixel of the
    /// whole (masked) objective image. Outside of the patch, nothing has
    /// changed since the objective was last evaluated there.
    pub(super) fn choose_component(&mut self, hessian: ArrayView2<f64>, patch: PixelBox) {
        let num_taylor = hessian.nrows();
        let rhs = self.rhs.slice(patch.stacked_slice());
        let coeffs = self.coeffs.slice(patch.stacked_slice());
        let objective = self.objective.slice_mut(patch.slice());
        Zip::from(objective)
            .and(coeffs.lanes(Axis(0)))
            .and(rhs.lanes(Axis(0)))
            .for_each(|o, c, r| {
                let mut sum = 0.0;
                for t1 in 0..num_taylor {
                    let c1 = c[t1] as f64;
                    sum += 2.0 * c1 * r[t1] as f64;
                    for t2 in 0..num_taylor {
                        sum -= hessian[(t1, t2)] * c1 * c[t2] as f64;
                    }
                }
                *o = sum as f32;
            });

        let (value, pos) = find_max_abs_masked(self.objective.view(), self.mask.view());
        self.peak = ScalePeak { value, pos };
    }
}

impl Workspace {
    pub(super) fn setup_masks(&mut self, user_mask: Option<&Array2<f32>>, config: &CleanerConfig) {
        if user_mask.is_some() {
            debug!(
                "Convolving the user mask with the scales (threshold {})",
                config.mask_threshold
            );
        }
        let masks = self.bank.masks(
            &self.fft,
            user_mask.map(|m| m.view()),
            config.mask_threshold,
            config.border_factor,
        );
        for (ws, mask) in self.scales.iter_mut().zip(masks) {
            ws.mask = mask;
        }
    }

    /// Convolve every residual image with every scale.
    pub(super) fn compute_rhs(&mut self) -> Result<(), CleanerError> {
        info!("Calculating convolutions of residual images with scales");
        let residual_fts: Vec<_> = self
            .residuals()?
            .into_iter()
            .map(|r| self.fft.forward_real(r.view()))
            .collect();

        let fft = &self.fft;
        self.scales
            .par_iter_mut()
            .zip(self.bank.transforms.par_iter())
            .for_each(|(ws, scale_ft)| {
                for (mut rhs, residual_ft) in ws.rhs.outer_iter_mut().zip(residual_fts.iter()) {
                    rhs.assign(&fft.inverse_real(residual_ft * scale_ft));
                }
            });
        Ok(())
    }

    /// Solve for coefficients and find the best pixel of every scale, in
    /// parallel, then choose the best scale.
    pub(super) fn find_component(&mut self, hessians: &[Hessian], patch: PixelBox) -> Component {
        self.scales
            .par_iter_mut()
            .zip(hessians.par_iter())
            .for_each(|(ws, hessian)| {
                ws.solve_matrix_eqn(hessian.inverse(), patch);
                ws.choose_component(hessian.matrix(), patch);
            });

        let mut best: Option<(f32, Component)> = None;
        for (scale, (ws, &bias)) in self.scales.iter().zip(self.scale_bias.iter()).enumerate() {
            let biased = ws.peak.value * bias;
            if best.map_or(true, |(b, _)| biased > b) {
                best = Some((
                    biased,
                    Component {
                        scale,
                        value: ws.peak.value,
                        pos: ws.peak.pos,
                    },
                ));
            }
        }
        // There is always at least one scale.
        best.map(|(_, c)| c).unwrap_or(Component {
            scale: 0,
            value: 0.0,
            pos: (0, 0),
        })
    }

    /// The Taylor coefficients of a chosen component.
    pub(super) fn component_coeffs(&self, component: &Component) -> Vec<f64> {
        let (x, y) = component.pos;
        self.scales[component.scale]
            .coeffs
            .slice(s![.., x, y])
            .iter()
            .map(|&c| c as f64)
            .collect()
    }

    /// Add a component to the model images, and subtract its response from
    /// the RHS images of every scale, within `patch`.
    pub(super) fn update_model_and_rhs(
        &mut self,
        cube: &ConvolutionCube,
        component: &Component,
        patch: ImagePatch,
        gain: f32,
    ) {
        let num_taylor = self.num_taylor();
        let chosen = component.scale;
        let coeffs = self.component_coeffs(component);
        let gain = gain as f64;

        let scale_patch = self.bank.patch(chosen).slice_move(patch.psf.slice());
        for (model, &c) in self.models.iter_mut().zip(coeffs.iter()) {
            scaled_add_f32(model.slice_mut(patch.model.slice()), gain * c, scale_patch);
        }

        self.scales
            .par_iter_mut()
            .enumerate()
            .for_each(|(scale, ws)| {
                for t1 in 0..num_taylor {
                    let mut rhs = ws
                        .rhs
                        .index_axis_mut(Axis(0), t1)
                        .slice_move(patch.model.slice());
                    for (t2, &c) in coeffs.iter().enumerate() {
                        let response = cube
                            .get(TaylorScalePair::new(t1, t2, scale, chosen))
                            .slice_move(patch.psf.slice());
                        scaled_add_f32(rhs.view_mut(), -gain * c, response);
                    }
                }
            });

        for (flux, &c) in self.total_taylor_flux.iter_mut().zip(coeffs.iter()) {
            *flux += gain * c;
        }
        self.total_scale_flux[chosen] += gain * coeffs[0];
    }

    /// The peak Taylor-0 residual (convolved with scale 0, within the scale-0
    /// mask), in units of the PSF peak response.
    pub(super) fn peak_residual(&self, hessians: &[Hessian]) -> f32 {
        let ws = &self.scales[0];
        let (value, _) = find_max_abs_masked(ws.rhs.index_axis(Axis(0), 0), ws.mask.view());
        (value as f64 / hessians[0].matrix[(0, 0)]).abs() as f32
    }

    /// Run the minor cycle. The RHS images are computed first, and the scale-0
    /// RHS images are copied back into the residual images at the end.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn run_minor_cycle(
        &mut self,
        peak_hessian: &PeakHessian,
        user_mask: Option<&Array2<f32>>,
        config: &CleanerConfig,
        max_iter: usize,
        stop_fraction: f32,
        gain: f32,
        threshold: f32,
    ) -> Result<CleanOutcome, CleanerError> {
        let hessians = peak_hessian.hessians();
        let cube = peak_hessian.cube();
        let mut gain_control = GainControl::new(config, gain, stop_fraction);

        self.setup_masks(user_mask, config);
        self.compute_rhs()?;

        // Is the peak residual already below the stopping threshold?
        let peak_residual = self.peak_residual(hessians);
        let within_mask = if user_mask.is_some() {
            " (within mask)"
        } else {
            ""
        };
        if peak_residual == 0.0 || peak_residual < threshold.max(self.flux_limit.unwrap_or(-1.0)) {
            info!("Peak residual{within_mask} {peak_residual} is already below the stopping threshold");
            return Ok(CleanOutcome::AlreadyConverged);
        }
        let flux_limit = *self
            .flux_limit
            .get_or_insert(peak_residual * stop_fraction);
        info!(
            "Peak convolved residual{within_mask}: {peak_residual}    Minor cycle stopping threshold: {}",
            threshold.max(flux_limit)
        );

        let progress_bar = make_minor_cycle_progress_bar(max_iter, config.draw_progress_bar);
        let mut patch = ImagePatch::full((self.nx, self.ny));
        let mut outcome = CleanOutcome::MaxIterations {
            iterations: max_iter,
        };
        for iteration in 0..max_iter {
            // The first iteration searches the whole image. After that, only
            // the patch touched by the previous component has changed.
            let component = self.find_component(hessians, patch.model);
            patch = ImagePatch::around(component.pos, self.support, (self.nx, self.ny));
            trace!(
                "Iteration {}: scale {} at {:?}, patch {:?}",
                iteration + 1,
                self.bank.sizes()[component.scale],
                component.pos,
                patch
            );
            self.update_model_and_rhs(cube, &component, patch, gain_control.gain());
            self.last_patch = Some(patch);
            self.total_iterations += 1;
            progress_bar.inc(1);

            let peak_residual = self.peak_residual(hessians);
            let mut progress = if peak_residual < threshold.max(flux_limit) {
                info!(
                    "Reached stopping threshold at iteration {}. Peak residual{within_mask} {peak_residual}",
                    self.total_iterations
                );
                Progress::Converged
            } else {
                Progress::Continue
            };
            if gain_control.update(iteration, component.value) {
                progress = Progress::Diverged;
            }

            if progress == Progress::Continue
                && (iteration + 1 == max_iter
                    || max_iter < 5
                    || self.total_iterations % config.report_interval == 0)
            {
                let coeffs = self.component_coeffs(&component);
                info!(
                    "[{}] Res: {peak_residual} Max: {} Gain: {} Pos: {:?} Scale: {} Coeffs: {coeffs:?}",
                    self.total_iterations,
                    component.value,
                    gain_control.gain(),
                    component.pos,
                    self.bank.sizes()[component.scale],
                );
            }

            match progress {
                Progress::Continue => (),
                Progress::Converged => {
                    outcome = CleanOutcome::Converged {
                        iterations: iteration + 1,
                    };
                    break;
                }
                Progress::Diverged => {
                    warn!(
                        "Stopping minor cycle iterations because of possible divergence (iteration {}, peak residual {peak_residual})",
                        self.total_iterations
                    );
                    outcome = CleanOutcome::Diverged {
                        iterations: iteration + 1,
                    };
                    break;
                }
            }
        }
        progress_bar.abandon_with_message("Finished minor cycle");
        if let CleanOutcome::MaxIterations { .. } = outcome {
            info!("Reached the maximum number of iterations for this minor cycle");
        }

        info!(
            "Total flux by scale: {}",
            self.bank
                .sizes()
                .iter()
                .zip(self.total_scale_flux.iter())
                .map(|(size, flux)| format!("[{size}]: {flux}"))
                .collect::<Vec<_>>()
                .join("  ")
        );
        info!(
            "Total flux by Taylor coefficient: {}",
            self.total_taylor_flux
                .iter()
                .enumerate()
                .map(|(t, flux)| format!("[{t}]: {flux}"))
                .collect::<Vec<_>>()
                .join("  ")
        );

        // The scale-0 RHS images have been kept up to date; they are the new
        // residuals.
        for (residual, rhs) in self
            .residuals
            .iter_mut()
            .zip(self.scales[0].rhs.outer_iter())
        {
            *residual = Some(rhs.to_owned());
        }

        Ok(outcome)
    }
}

/// Convenience function to make a progress bar for minor-cycle iterations.
fn make_minor_cycle_progress_bar(max_iter: usize, draw: bool) -> ProgressBar {
    ProgressBar::with_draw_target(
        Some(max_iter as _),
        if draw {
            ProgressDrawTarget::stdout()
        } else {
            ProgressDrawTarget::hidden()
        },
    )
    .with_style(
        ProgressStyle::default_bar()
            .template("{msg}: [{wide_bar:.blue}] {pos:3}/{len:3} ({elapsed_precise}<{eta_precise})")
            .unwrap()
            .progress_chars("=> "),
    )
    .with_position(0)
    .with_message("Minor cycle")
}
