// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Multi-term, multi-scale matrix cleaning (the minor cycle of MT-MFS CLEAN).

Given one residual ("dirty") image per Taylor term of the sky's spectral
expansion, `2*ntaylor-1` PSFs and a bank of scale sizes, a
[`MultiTermCleaner`] finds model components jointly across Taylor terms and
scales, updating model and residual images in place. Gridding, degridding and
everything else of a major cycle are left to the caller.
 */

pub mod cleaner;
pub mod config;
pub mod constants;
mod error;
pub mod geometry;
pub mod hessian;
pub mod math;
pub mod memory;
pub mod scales;

// Re-exports.
pub use cleaner::{clean_status_code, validate_psf, CleanOutcome, MultiTermCleaner};
pub use config::{CleanerConfig, ConfigFileError, InvalidConfigError};
pub use constants::*;
pub use error::{CleanerError, PsfError};
pub use geometry::{ImagePatch, PixelBox};
pub use hessian::{Hessian, HessianError, TaylorScalePair};

#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;
