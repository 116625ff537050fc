// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

These are the defaults of [`crate::CleanerConfig`]; the cleaner itself only
ever reads the values held by its configuration.
 */

/// The width of the PSF main lobe \[pixels\], used to size the PSF support
/// window.
pub const DEFAULT_PSF_BEAM_WIDTH: f32 = 4.0;

/// The PSF support window covers this many main-lobe widths.
pub const DEFAULT_NUM_BEAMS: f32 = 20.0;

/// Scale-convolved user masks are binarised at this level.
pub const DEFAULT_MASK_THRESHOLD: f32 = 0.1;

/// Each scale mask has a zero border of this many scale sizes.
pub const DEFAULT_BORDER_FACTOR: f32 = 1.5;

/// The loop gain used when the caller doesn't pin one.
pub const DEFAULT_LOOP_GAIN: f32 = 0.5;

/// Adaptive loop gains are never allowed above this value.
pub const DEFAULT_MAX_LOOP_GAIN: f32 = 0.6;

/// Adaptive loop gains are multiplied or divided by this factor every
/// iteration.
pub const DEFAULT_GAIN_STEP: f32 = 1.5;

/// An adaptive loop gain below this value means the minor cycle is oscillating.
pub const DEFAULT_MIN_LOOP_GAIN: f32 = 0.01;

/// A peak objective more than this fraction above the best-seen objective
/// signals divergence.
pub const DEFAULT_DIVERGENCE_RATIO: f32 = 2.0;

/// Hessian rows with an average ratio spread below this are considered
/// linearly dependent.
pub const DEFAULT_DEPENDENCE_TOLERANCE: f64 = 1e-4;

/// The order-0 PSF peak must be within this distance of 1.
pub const DEFAULT_PSF_PEAK_TOLERANCE: f32 = 1e-3;

/// Only this fraction of the host's total memory may be used.
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.75;

/// Progress is logged every this many minor-cycle iterations.
pub const DEFAULT_REPORT_INTERVAL: usize = 20;

/// The status code corresponding to a Hessian that couldn't be formed or
/// inverted (see [`crate::CleanOutcome::code`]).
pub const HESSIAN_FAILURE_CODE: i32 = -2;
