// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Estimating how much memory the cleaner needs, and whether it may have it.

use std::mem::size_of;

use log::{debug, warn};
use sysinfo::System;

use crate::{c64, hessian::num_unordered_pairs, CleanerError};

const MIB: f64 = 1024.0 * 1024.0;

/// The number of bytes allocated by an initialised cleaner and its first
/// `clean`.
pub fn estimate_bytes(
    nx: usize,
    ny: usize,
    num_taylor: usize,
    num_scales: usize,
    support: usize,
) -> u64 {
    let image = (nx * ny) as u64;
    let patch = (support * support) as u64;
    let real = size_of::<f32>() as u64;
    let complex = size_of::<c64>() as u64;
    let num_taylor = num_taylor as u64;
    let num_scales = num_scales as u64;
    let num_psfs = 2 * num_taylor - 1;
    let num_cube_planes =
        num_unordered_pairs(num_taylor as usize) as u64 * num_unordered_pairs(num_scales as usize) as u64;

    // Scale kernel transforms and PSF transforms.
    let transforms = (num_scales + num_psfs) * image * complex;
    // Residual and model images, plus the RHS and coefficient images, the
    // objective and the mask of every scale.
    let images = (2 * num_taylor + num_scales * (2 * num_taylor + 2)) * image * real;
    // Scale patches and the convolution cube.
    let patches = (num_scales + num_cube_planes) * patch * real;
    // A transform's worth of scratch for each of the rayon threads.
    let scratch = rayon::current_num_threads() as u64 * image * complex;

    transforms + images + patches + scratch
}

/// The memory the cleaner may use \[MiB\]: a fraction of the given limit, or
/// of the total host memory if there is no limit.
pub fn available_mib(memory_limit_mib: Option<f64>, memory_fraction: f64) -> f64 {
    let total = memory_limit_mib.unwrap_or_else(|| {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.total_memory() as f64 / MIB
    });
    total * memory_fraction
}

/// Fail if the estimated memory requirement exceeds what's available.
pub fn check_memory(
    nx: usize,
    ny: usize,
    num_taylor: usize,
    num_scales: usize,
    support: usize,
    memory_limit_mib: Option<f64>,
    memory_fraction: f64,
) -> Result<(), CleanerError> {
    let need_mib = estimate_bytes(nx, ny, num_taylor, num_scales, support) as f64 / MIB;
    let available_mib = available_mib(memory_limit_mib, memory_fraction);
    debug!("Estimated memory requirement: {need_mib:.2} MiB ({available_mib:.2} MiB available)");

    if need_mib > available_mib {
        warn!("The cleaner needs {need_mib:.2} MiB, but only {available_mib:.2} MiB may be used");
        return Err(CleanerError::InsufficientMemory {
            need_mib,
            available_mib,
        });
    }
    Ok(())
}
