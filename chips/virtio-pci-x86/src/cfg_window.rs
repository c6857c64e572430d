// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Access to BAR-backed structures through PCI configuration space.
//!
//! A `VIRTIO_PCI_CAP_PCI_CFG` capability is a window into any memory or I/O
//! BAR of the device. The driver programs the capability with a BAR, an
//! offset and an access length, then accesses the four bytes of
//! `pci_cfg_data` following the capability header.

use pci_x86::{Function, PortIo};

const CAP_BAR: u8 = 4;
const CAP_OFFSET: u8 = 8;
const CAP_LENGTH: u8 = 12;
pub(crate) const CAP_DATA: u8 = 16;

/// Size of a `VIRTIO_PCI_CAP_PCI_CFG` capability, including `pci_cfg_data`.
pub const PCI_CFG_CAP_LEN: u8 = 20;

/// A `VIRTIO_PCI_CAP_PCI_CFG` capability at a known configuration space
/// offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PciCfgWindow {
    cap_offset: u8,
}

impl PciCfgWindow {
    /// `None` if a capability at `cap_offset` would run past the end of
    /// configuration space.
    pub const fn new(cap_offset: u8) -> Option<Self> {
        if cap_offset as usize + PCI_CFG_CAP_LEN as usize > 256 {
            return None;
        }
        Some(Self { cap_offset })
    }

    pub const fn cap_offset(&self) -> u8 {
        self.cap_offset
    }

    fn select<P: PortIo>(&self, func: &Function<'_, P>, bar: u8, offset: u32) {
        func.write8(self.cap_offset + CAP_BAR, bar);
        func.write32(self.cap_offset + CAP_LENGTH, 4);
        func.write32(self.cap_offset + CAP_OFFSET, offset);
    }

    /// Reads the dword at `offset` into BAR `bar`.
    pub fn read32<P: PortIo>(&self, func: &Function<'_, P>, bar: u8, offset: u32) -> u32 {
        self.select(func, bar, offset);
        func.read32(self.cap_offset + CAP_DATA)
    }

    /// Writes the dword at `offset` into BAR `bar`.
    pub fn write32<P: PortIo>(&self, func: &Function<'_, P>, bar: u8, offset: u32, val: u32) {
        self.select(func, bar, offset);
        func.write32(self.cap_offset + CAP_DATA, val);
    }
}
