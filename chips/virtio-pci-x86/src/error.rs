// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use pci_x86::PciError;
use virtio::transports::VirtIOInitializationError;

/// Reasons a PCI function could not be brought up as a virtio device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VirtIOPCIError {
    /// Reading the function's capability list failed.
    Pci(PciError),
    /// The function's vendor ID is not the virtio vendor ID.
    NotAVirtIODevice,
    /// No driver is available for this PCI device ID.
    UnsupportedDeviceType(u16),
    /// The function has neither a common configuration capability nor an I/O
    /// BAR.
    NoTransport,
    /// The common configuration capability points outside of its BAR.
    CommonConfigOutOfRange,
    /// The device failed to initialize.
    Initialization(VirtIOInitializationError),
    /// Every registry slot is taken.
    RegistryFull,
}

impl From<PciError> for VirtIOPCIError {
    fn from(err: PciError) -> Self {
        VirtIOPCIError::Pci(err)
    }
}

impl From<VirtIOInitializationError> for VirtIOPCIError {
    fn from(err: VirtIOInitializationError) -> Self {
        VirtIOPCIError::Initialization(err)
    }
}
