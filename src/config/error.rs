// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigFileError {
    #[error("Config file '{file}' has an unrecognised extension; supported types are: {supported}")]
    UnrecognisedExtension { file: String, supported: String },

    #[error("Couldn't decode toml structure from {file}:\n{err}")]
    TomlDecode { file: String, err: String },

    #[error("Couldn't decode json structure from {file}:\n{err}")]
    JsonDecode { file: String, err: String },

    #[error(transparent)]
    Invalid(#[from] InvalidConfigError),

    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Error, Clone, Debug, PartialEq)]
pub enum InvalidConfigError {
    #[error("Config field '{field}' must be positive, but is {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("Config field '{field}' must be a gain in (0, 1], but is {value}")]
    Gain { field: &'static str, value: f32 },

    #[error("The adaptive gain step must be greater than 1, but is {0}")]
    GainStep(f32),

    #[error("The memory fraction must be in (0, 1], but is {0}")]
    MemoryFraction(f64),

    #[error("The progress report interval cannot be 0")]
    ReportInterval,
}
