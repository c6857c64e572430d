// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! PCI capabilities list
//!
//! This module provides functionality for traversing the capability list of a
//! PCI function, as described in section 6.7 of the PCI Local Bus
//! specification. Vendor-specific capabilities (ID `0x09`) carry the virtio
//! structure descriptors; [`walk`] records those in the function's
//! [`CapabilityMap`].

use log::debug;

use crate::cfg::{offset, ConfigSpace};
use crate::device::{Device, Function, Status};
use crate::error::PciError;
use crate::port::PortIo;

/// Capability ID for vendor-specific capabilities.
pub const VENDOR_SPECIFIC_ID: u8 = 0x09;

/// Capability ID for MSI.
pub const MSI_ID: u8 = 0x05;

/// Capability ID for MSI-X.
pub const MSIX_ID: u8 = 0x11;

/// Size of the generic vendor-specific descriptor. Longer capabilities
/// append fields after it.
pub const VENDOR_CAP_MIN_LEN: u8 = 16;

/// Size of configuration space; no capability may extend past it.
const CONFIG_SPACE_SIZE: usize = 256;

/// One entry of a function's capability list.
///
/// The `cfg_type`, `bar`, `bar_offset` and `length` fields are only
/// meaningful for vendor-specific capabilities, and are zero for others.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Capability {
    pub offset: u8,
    pub id: u8,
    pub next: u8,
    pub cfg_type: u8,
    pub bar: u8,
    pub bar_offset: u32,
    pub length: u32,
}

impl Capability {
    pub fn is_vendor_specific(&self) -> bool {
        self.id == VENDOR_SPECIFIC_ID
    }
}

/// Number of vendor capabilities a [`CapabilityMap`] can hold.
///
/// The capability area spans `0x40..0x100` and every capability is at least
/// four bytes, so no well-formed list has more entries than this.
pub const CAPABILITY_MAP_CAPACITY: usize = 48;

/// Vendor-specific capability offsets, keyed by structure type.
///
/// When a structure type appears more than once the last one inserted wins.
#[derive(Clone, Debug)]
pub struct CapabilityMap {
    entries: [(u8, u8); CAPABILITY_MAP_CAPACITY],
    len: usize,
}

impl CapabilityMap {
    pub const fn new() -> Self {
        Self {
            entries: [(0, 0); CAPABILITY_MAP_CAPACITY],
            len: 0,
        }
    }

    /// Records `offset` for `cfg_type`, replacing any earlier entry.
    ///
    /// Returns `false` if the map is full and `cfg_type` is new.
    pub fn insert(&mut self, cfg_type: u8, offset: u8) -> bool {
        if let Some(entry) = self.entries[..self.len]
            .iter_mut()
            .find(|(t, _)| *t == cfg_type)
        {
            entry.1 = offset;
            return true;
        }
        if self.len == CAPABILITY_MAP_CAPACITY {
            return false;
        }
        self.entries[self.len] = (cfg_type, offset);
        self.len += 1;
        true
    }

    /// Offset of the capability describing structure `cfg_type`.
    pub fn get(&self, cfg_type: u8) -> Option<u8> {
        self.entries[..self.len]
            .iter()
            .find(|(t, _)| *t == cfg_type)
            .map(|(_, o)| *o)
    }

    /// Iterates over `(cfg_type, offset)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.entries[..self.len].iter().copied()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for CapabilityMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a function's capability list.
///
/// Yields an error and then stops if the chain points back into the standard
/// header, revisits an offset, or holds a vendor capability whose length
/// byte is too short or runs past the end of configuration space.
pub struct CapIter<'c, P> {
    func: Function<'c, P>,
    cur: u8,
    visited: [u64; 4],
    done: bool,
}

impl<'c, P: PortIo> CapIter<'c, P> {
    /// Starts at the capabilities pointer of `func`.
    ///
    /// Fails with [`PciError::NoCapabilityList`] if the function's status
    /// register does not advertise a capability list.
    pub fn new(func: Function<'c, P>) -> Result<Self, PciError> {
        if !func.status().is_set(Status::CAP_LIST) {
            return Err(PciError::NoCapabilityList);
        }
        Ok(Self {
            func,
            cur: func.read8(offset::CAP_PTR) & 0xFC,
            visited: [0; 4],
            done: false,
        })
    }

    fn mark_visited(&mut self, ptr: u8) -> bool {
        let (word, bit) = ((ptr / 64) as usize, ptr % 64);
        let seen = self.visited[word] & (1 << bit) != 0;
        self.visited[word] |= 1 << bit;
        !seen
    }

    fn read(&self, ptr: u8) -> Result<Capability, PciError> {
        let id = self.func.read8(ptr);
        let next = self.func.read8(ptr + 1) & 0xFC;
        if id != VENDOR_SPECIFIC_ID {
            return Ok(Capability {
                offset: ptr,
                id,
                next,
                cfg_type: 0,
                bar: 0,
                bar_offset: 0,
                length: 0,
            });
        }
        // The length byte covers any type-specific fields after the
        // descriptor, so readers of those fields stay inside config space
        let len = self.func.read8(ptr + 2);
        if len < VENDOR_CAP_MIN_LEN || ptr as usize + len as usize > CONFIG_SPACE_SIZE {
            return Err(PciError::MalformedCapabilityChain { offset: ptr });
        }
        Ok(Capability {
            offset: ptr,
            id,
            next,
            cfg_type: self.func.read8(ptr + 3),
            bar: self.func.read8(ptr + 4),
            bar_offset: self.func.read32(ptr + 8),
            length: self.func.read32(ptr + 12),
        })
    }
}

impl<P: PortIo> Iterator for CapIter<'_, P> {
    type Item = Result<Capability, PciError>;

    fn next(&mut self) -> Option<Self::Item> {
        // Pointer value of 0 marks end of capabilities list
        if self.done || self.cur == 0 {
            return None;
        }

        let ptr = self.cur;
        if ptr < offset::DEVICE_SPECIFIC || !self.mark_visited(ptr) {
            self.done = true;
            return Some(Err(PciError::MalformedCapabilityChain { offset: ptr }));
        }

        match self.read(ptr) {
            Ok(cap) => {
                self.cur = cap.next;
                Some(Ok(cap))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Walks the capability list of `dev` and records every vendor-specific
/// capability in [`Device::capabilities`], keyed by structure type.
///
/// Returns the number of vendor capabilities seen. On a malformed chain the
/// capabilities found before the fault stay recorded.
pub fn walk<P: PortIo>(cfg: &ConfigSpace<P>, dev: &mut Device<'_>) -> Result<usize, PciError> {
    let bdf = dev.bdf();
    let mut count = 0;
    for cap in CapIter::new(dev.function(cfg))? {
        let cap = cap?;
        if !cap.is_vendor_specific() {
            continue;
        }
        debug!(
            "PCI: {}: cap @{:#04x}: type {} bar {} offset {:#x} len {:#x}",
            bdf, cap.offset, cap.cfg_type, cap.bar, cap.bar_offset, cap.length
        );
        dev.capabilities.insert(cap.cfg_type, cap.offset);
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::{walk, CapIter, CapabilityMap, MSIX_ID};
    use crate::sim::{SimulatedConfigSpace, SimulatedFunction};
    use crate::{Bdf, Bus, ConfigSpace, Device, Function, PciError};

    const BDF: Bdf = Bdf::new(0, 4, 0);

    fn device(bus: &Bus) -> Device<'_> {
        Device::from_config(bus, 4, 0, 0x1041_1AF4, 0x0200_0000, 0)
    }

    #[test]
    fn records_vendor_capabilities_by_type() {
        let sim = SimulatedConfigSpace::new();
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_capabilities_pointer(0x40);
        f.add_vendor_capability(0x40, 0x50, 1, 4, 0x0000, 0x38);
        f.add_vendor_capability(0x50, 0x60, 2, 4, 0x3000, 0x1000);
        f.add_capability(0x60, MSIX_ID, 0x00);
        sim.insert(f);

        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = device(&bus);

        assert_eq!(walk(&cfg, &mut dev), Ok(2));
        assert_eq!(dev.capabilities().get(1), Some(0x40));
        assert_eq!(dev.capabilities().get(2), Some(0x50));
        assert_eq!(dev.capabilities().get(3), None);
    }

    #[test]
    fn decodes_vendor_capability_fields() {
        let sim = SimulatedConfigSpace::new();
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_capabilities_pointer(0x43);
        f.add_vendor_capability(0x40, 0x00, 4, 2, 0x2000, 0x100);
        sim.insert(f);

        let cfg = ConfigSpace::new(&sim);
        let mut iter = CapIter::new(Function::new(&cfg, BDF)).unwrap();
        let cap = iter.next().unwrap().unwrap();
        assert_eq!(cap.offset, 0x40);
        assert_eq!(cap.cfg_type, 4);
        assert_eq!(cap.bar, 2);
        assert_eq!(cap.bar_offset, 0x2000);
        assert_eq!(cap.length, 0x100);
        assert!(iter.next().is_none());
    }

    #[test]
    fn self_referencing_chain_is_malformed() {
        let sim = SimulatedConfigSpace::new();
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_capabilities_pointer(0x40);
        f.add_vendor_capability(0x40, 0x50, 1, 4, 0, 0x38);
        f.add_vendor_capability(0x50, 0x40, 2, 4, 0x3000, 0x1000);
        sim.insert(f);

        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = device(&bus);

        assert_eq!(
            walk(&cfg, &mut dev),
            Err(PciError::MalformedCapabilityChain { offset: 0x40 })
        );
        assert_eq!(dev.capabilities().len(), 2);
    }

    #[test]
    fn pointer_into_header_is_malformed() {
        let sim = SimulatedConfigSpace::new();
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_capabilities_pointer(0x20);
        sim.insert(f);

        let cfg = ConfigSpace::new(&sim);
        let mut iter = CapIter::new(Function::new(&cfg, BDF)).unwrap();
        assert_eq!(
            iter.next(),
            Some(Err(PciError::MalformedCapabilityChain { offset: 0x20 }))
        );
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn vendor_capability_near_end_is_malformed() {
        let sim = SimulatedConfigSpace::new();
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_capabilities_pointer(0xF4);
        f.add_capability(0xF4, 0x09, 0x00);
        sim.insert(f);

        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = device(&bus);
        assert_eq!(
            walk(&cfg, &mut dev),
            Err(PciError::MalformedCapabilityChain { offset: 0xF4 })
        );
    }

    #[test]
    fn vendor_capability_longer_than_remaining_space_is_malformed() {
        let sim = SimulatedConfigSpace::new();
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_capabilities_pointer(0x40);
        f.add_vendor_capability(0x40, 0xE0, 1, 4, 0, 0x38);
        // Fits: 0xE0 + 32 is the end of config space
        f.add_vendor_capability(0xE0, 0xF0, 3, 4, 0x1000, 0x4);
        f.set_capability_length(0xE0, 16);
        // 20 byte notify layout starting at 0xF0 does not fit
        f.add_vendor_capability(0xF0, 0x00, 2, 4, 0x3000, 0x1000);
        f.set_capability_length(0xF0, 20);
        sim.insert(f);

        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = device(&bus);
        assert_eq!(
            walk(&cfg, &mut dev),
            Err(PciError::MalformedCapabilityChain { offset: 0xF0 })
        );
        assert_eq!(dev.capabilities().get(3), Some(0xE0));
        assert_eq!(dev.capabilities().get(2), None);
    }

    #[test]
    fn missing_capability_list() {
        let sim = SimulatedConfigSpace::new();
        sim.insert(SimulatedFunction::new(BDF, 0x1AF4, 0x1000));

        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = device(&bus);
        assert_eq!(walk(&cfg, &mut dev), Err(PciError::NoCapabilityList));
    }

    #[test]
    fn map_last_insert_wins() {
        let mut map = CapabilityMap::new();
        assert!(map.insert(4, 0x60));
        assert!(map.insert(4, 0x70));
        assert_eq!(map.get(4), Some(0x70));
        assert_eq!(map.len(), 1);
    }
}
