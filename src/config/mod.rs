// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Tunable parameters of the cleaner.
//!
//! Every constant that shapes the minor cycle (PSF support size, mask
//! thresholds, loop-gain control, divergence detection, memory budget) lives
//! in [`CleanerConfig`]. A config can be built in code, or read from a toml or
//! json file; any field missing from a file takes its default value.

mod error;

pub use error::{ConfigFileError, InvalidConfigError};

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::*;

#[derive(Debug, Display, EnumIter, EnumString)]
enum ConfigFileType {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    /// The width of the PSF main lobe \[pixels\].
    pub psf_beam_width: f32,

    /// The PSF support window covers this many main-lobe widths (after
    /// accounting for the largest scale).
    pub num_beams: f32,

    /// Scale-convolved user masks are set to 1 above this level and 0
    /// elsewhere. If this is not positive, the smooth scale-convolved mask is
    /// used as a weight instead.
    pub mask_threshold: f32,

    /// Each scale mask gets a zero border `border_factor * scale_size` pixels
    /// wide.
    pub border_factor: f32,

    /// The loop gain used when the caller passes a non-positive gain to
    /// `clean`. In that case, the gain is also adapted every iteration.
    pub default_loop_gain: f32,

    /// Adaptive loop gains are clamped to this value.
    pub max_loop_gain: f32,

    /// Adaptive loop gains grow or shrink by this factor.
    pub gain_step: f32,

    /// An adaptive loop gain falling below this value stops the minor cycle as
    /// diverging.
    pub min_loop_gain: f32,

    /// Stop the minor cycle as diverging if the peak objective is this
    /// fraction (2.0 == 200%) away from the best objective seen so far.
    pub divergence_ratio: f32,

    /// Heuristic tolerance for detecting linearly-dependent Hessian rows.
    pub dependence_tolerance: f64,

    /// The order-0 PSF's peak must be within this distance of 1.0.
    pub psf_peak_tolerance: f32,

    /// The fraction of total host memory that may be allocated.
    pub memory_fraction: f64,

    /// If set, use this as the total host memory \[MiB\] instead of asking
    /// the operating system.
    pub memory_limit_mib: Option<f64>,

    /// Log minor-cycle progress every this many iterations.
    pub report_interval: usize,

    /// Draw a progress bar for minor-cycle iterations.
    pub draw_progress_bar: bool,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            psf_beam_width: DEFAULT_PSF_BEAM_WIDTH,
            num_beams: DEFAULT_NUM_BEAMS,
            mask_threshold: DEFAULT_MASK_THRESHOLD,
            border_factor: DEFAULT_BORDER_FACTOR,
            default_loop_gain: DEFAULT_LOOP_GAIN,
            max_loop_gain: DEFAULT_MAX_LOOP_GAIN,
            gain_step: DEFAULT_GAIN_STEP,
            min_loop_gain: DEFAULT_MIN_LOOP_GAIN,
            divergence_ratio: DEFAULT_DIVERGENCE_RATIO,
            dependence_tolerance: DEFAULT_DEPENDENCE_TOLERANCE,
            psf_peak_tolerance: DEFAULT_PSF_PEAK_TOLERANCE,
            memory_fraction: DEFAULT_MEMORY_FRACTION,
            memory_limit_mib: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            draw_progress_bar: false,
        }
    }
}

impl CleanerConfig {
    /// Read a config from a toml or json file. The file type is determined by
    /// its extension.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<CleanerConfig, ConfigFileError> {
        fn inner(file: &Path) -> Result<CleanerConfig, ConfigFileError> {
            let file_pb = PathBuf::from(file);
            debug!("Attempting to parse config file {} ...", file_pb.display());

            let mut contents = String::new();
            let file_type = file_pb
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .and_then(|e| ConfigFileType::from_str(&e).ok());
            let config: CleanerConfig = match file_type {
                Some(ConfigFileType::Toml) => {
                    debug!("Parsing toml file...");
                    let mut fh = File::open(file)?;
                    fh.read_to_string(&mut contents)?;
                    toml::from_str(&contents).map_err(|e| ConfigFileError::TomlDecode {
                        file: file_pb.display().to_string(),
                        err: e.to_string(),
                    })?
                }

                Some(ConfigFileType::Json) => {
                    debug!("Parsing json file...");
                    let mut fh = File::open(file)?;
                    fh.read_to_string(&mut contents)?;
                    serde_json::from_str(&contents).map_err(|e| ConfigFileError::JsonDecode {
                        file: file_pb.display().to_string(),
                        err: e.to_string(),
                    })?
                }

                None => {
                    return Err(ConfigFileError::UnrecognisedExtension {
                        file: file_pb.display().to_string(),
                        supported: ConfigFileType::iter().join(", "),
                    })
                }
            };

            config.validate()?;
            Ok(config)
        }
        inner(file.as_ref())
    }

    /// Check that the values in this config make sense.
    pub fn validate(&self) -> Result<(), InvalidConfigError> {
        if !(self.psf_beam_width > 0.0) {
            return Err(InvalidConfigError::NonPositive {
                field: "psf_beam_width",
                value: self.psf_beam_width as f64,
            });
        }
        if !(self.num_beams > 0.0) {
            return Err(InvalidConfigError::NonPositive {
                field: "num_beams",
                value: self.num_beams as f64,
            });
        }
        if !(self.border_factor >= 0.0) {
            return Err(InvalidConfigError::NonPositive {
                field: "border_factor",
                value: self.border_factor as f64,
            });
        }
        if !(self.gain_step > 1.0) {
            return Err(InvalidConfigError::GainStep(self.gain_step));
        }
        if !(self.divergence_ratio > 0.0) {
            return Err(InvalidConfigError::NonPositive {
                field: "divergence_ratio",
                value: self.divergence_ratio as f64,
            });
        }
        for (field, gain) in [
            ("default_loop_gain", self.default_loop_gain),
            ("max_loop_gain", self.max_loop_gain),
            ("min_loop_gain", self.min_loop_gain),
        ] {
            if !(gain > 0.0 && gain <= 1.0) {
                return Err(InvalidConfigError::Gain { field, value: gain });
            }
        }
        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            return Err(InvalidConfigError::MemoryFraction(self.memory_fraction));
        }
        if let Some(limit) = self.memory_limit_mib {
            if !(limit > 0.0) {
                return Err(InvalidConfigError::NonPositive {
                    field: "memory_limit_mib",
                    value: limit,
                });
            }
        }
        if self.report_interval == 0 {
            return Err(InvalidConfigError::ReportInterval);
        }
        Ok(())
    }
}
