// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Compile-time configuration of the VirtIO transports.

/// Data structure holding compile-time configuration options.
///
/// To change the configuration, modify the relevant values in the `CONFIG`
/// constant object defined at the end of this file.
pub(crate) struct Config {
    /// How many consecutive `config_generation` mismatches a
    /// generation-guarded read tolerates before the transport is reported
    /// as unstable.
    ///
    /// Transports may override this per instance.
    pub(crate) generation_read_retries: usize,

    /// How many times the device status is polled after writing 0 to it
    /// before the reset is considered to have timed out.
    pub(crate) reset_poll_limit: usize,
}

/// A unique instance of `Config` where compile-time configuration options are
/// defined.
pub(crate) const CONFIG: Config = Config {
    generation_read_retries: 64,
    reset_poll_limit: 1000,
};
