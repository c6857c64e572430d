// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

#![no_std]

//! Virtio over PCI Local Bus
//!
//! This crate implements support for enumerating and interacting with Virtio
//! devices over the PCI Local Bus transport (i.e. non-PCIe), as defined in
//! section 4.1 of the Virtio specification. Both the legacy I/O port register
//! layout and the modern layout, located through vendor-specific PCI
//! capabilities, are supported.
//!
//! The usual entry point is [`probe`], which scans the root bus and registers
//! every virtio function it manages to bring up in a
//! [`VirtIODeviceRegistry`].

#[cfg(test)]
#[macro_use]
extern crate std;

mod cfg_window;
pub use self::cfg_window::PciCfgWindow;

mod config;

mod device;
pub use self::device::{VirtIOPCIDevice, VirtIOPCITransport};

mod error;
pub use self::error::VirtIOPCIError;

mod ids;
pub use self::ids::{device_type_from_pci_id, DEVICE_ID_BASE, TRANSITIONAL_DEVICE_IDS, VENDOR_ID};

pub mod legacy;
pub use self::legacy::LegacyTransport;

pub mod modern;
pub use self::modern::ModernTransport;

mod probe;
pub use self::probe::{bring_up, driver_for, probe, ProbeSummary};

mod registry;
pub use self::registry::{VirtIODeviceRegistry, REGISTRY_CAPACITY};

/// Structure types of virtio vendor-specific PCI capabilities.
pub mod cfg_type {
    pub const COMMON: u8 = 1;
    pub const NOTIFY: u8 = 2;
    pub const ISR: u8 = 3;
    pub const DEVICE: u8 = 4;
    pub const PCI_CFG: u8 = 5;
}
