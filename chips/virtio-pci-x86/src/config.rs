// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

/// Data structure holding compile-time configuration options.
///
/// To change the configuration, modify the relevant values in the `CONFIG`
/// constant object defined at the end of this file.
pub(crate) struct Config {
    /// Number of virtio devices a [`VirtIODeviceRegistry`] can hold.
    ///
    /// [`VirtIODeviceRegistry`]: crate::VirtIODeviceRegistry
    pub(crate) registry_capacity: usize,
}

pub(crate) const CONFIG: Config = Config {
    registry_capacity: 10,
};
