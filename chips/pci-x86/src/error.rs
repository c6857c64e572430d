// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

/// Errors surfaced while inspecting a device's configuration space.
///
/// Absent functions and unimplemented BARs are not errors; they are skipped
/// during enumeration and BAR mapping respectively.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PciError {
    /// The "capabilities list" bit of the status register is clear.
    NoCapabilityList,

    /// The capability chain revisits an offset, or points into the standard
    /// header or past the end of configuration space.
    MalformedCapabilityChain {
        /// Offset at which the walk was aborted.
        offset: u8,
    },
}
