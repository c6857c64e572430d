// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Generation-guarded reads of device configuration.
//!
//! A device may update its configuration while the driver reads it. Modern
//! transports expose a `config_generation` counter that changes on every such
//! update, so a read is consistent if the counter has the same value before
//! and after it.

use log::trace;

use super::VirtIOInitializationError;
use crate::config::CONFIG;

/// Retry ceiling used by transports that do not configure their own.
pub const DEFAULT_MAX_ATTEMPTS: usize = CONFIG.generation_read_retries;

/// Runs `read` between two samples of `generation` until both samples agree.
///
/// Gives up with [`VirtIOInitializationError::TransportUnstable`] after
/// `max_attempts` consecutive mismatches. A limit of zero never reads.
pub fn generation_guarded_read<T>(
    generation: impl Fn() -> u8,
    mut read: impl FnMut() -> T,
    max_attempts: usize,
) -> Result<T, VirtIOInitializationError> {
    for attempt in 0..max_attempts {
        let before = generation();
        let value = read();
        let after = generation();
        if before == after {
            return Ok(value);
        }
        trace!(
            "VirtIO: config generation moved {} -> {} during read (attempt {})",
            before,
            after,
            attempt + 1
        );
    }
    Err(VirtIOInitializationError::TransportUnstable)
}
