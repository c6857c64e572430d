// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Simulated configuration space for running drivers on a host.
//!
//! [`SimulatedConfigSpace`] implements [`PortIo`] by decoding the address
//! latched at `0xCF8` and serving the data window at `0xCFC`-`0xCFF` out of
//! per-function 256-byte register files, the same way a chipset would. Absent
//! functions read as all ones. BARs honour a per-BAR writable mask, so the
//! save/write-all-ones/read-back/restore size probe behaves like real
//! hardware.

use core::cell::{Cell, RefCell};

use crate::bdf::Bdf;
use crate::cfg::{offset, CONFIG_ADDRESS, CONFIG_DATA};
use crate::port::PortIo;

/// Maximum number of functions a [`SimulatedConfigSpace`] can hold.
pub const MAX_SIMULATED_FUNCTIONS: usize = 16;

/// Register file of one simulated function.
#[derive(Clone, Debug)]
pub struct SimulatedFunction {
    bdf: Bdf,
    regs: [u8; 256],
    bar_masks: [u32; 6],
}

impl SimulatedFunction {
    /// A type 0 function with the given identity and everything else zero.
    pub fn new(bdf: Bdf, vendor_id: u16, device_id: u16) -> Self {
        let mut f = Self {
            bdf,
            regs: [0; 256],
            bar_masks: [0; 6],
        };
        f.write16(offset::VENDOR_ID, vendor_id);
        f.write16(offset::DEVICE_ID, device_id);
        f
    }

    pub fn bdf(&self) -> Bdf {
        self.bdf
    }

    pub fn read8(&self, off: u8) -> u8 {
        self.regs[off as usize]
    }

    pub fn read16(&self, off: u8) -> u16 {
        u16::from_le_bytes([self.read8(off), self.read8(off.wrapping_add(1))])
    }

    pub fn read32(&self, off: u8) -> u32 {
        u32::from_le_bytes([
            self.read8(off),
            self.read8(off.wrapping_add(1)),
            self.read8(off.wrapping_add(2)),
            self.read8(off.wrapping_add(3)),
        ])
    }

    /// Stores a byte directly, bypassing BAR write masks.
    pub fn write8(&mut self, off: u8, val: u8) {
        self.regs[off as usize] = val;
    }

    pub fn write16(&mut self, off: u8, val: u16) {
        for (i, b) in val.to_le_bytes().into_iter().enumerate() {
            self.write8(off.wrapping_add(i as u8), b);
        }
    }

    pub fn write32(&mut self, off: u8, val: u32) {
        for (i, b) in val.to_le_bytes().into_iter().enumerate() {
            self.write8(off.wrapping_add(i as u8), b);
        }
    }

    pub fn set_header_type(&mut self, header_type: u8) {
        self.write8(offset::HEADER_TYPE, header_type);
    }

    pub fn set_class(&mut self, class_code: u8, subclass: u8) {
        self.write8(offset::CLASS_CODE + 3, class_code);
        self.write8(offset::CLASS_CODE + 2, subclass);
    }

    pub fn set_interrupt(&mut self, line: u8, pin: u8) {
        self.write8(offset::INT_LINE, line);
        self.write8(offset::INT_PIN, pin);
    }

    /// Implements BAR `index` with initial `value`.
    ///
    /// `writable` holds the address bits software may change; a BAR decoding
    /// a 16-byte memory window uses `0xFFFF_FFF0`. Bits outside the mask keep
    /// their value from `value`, which is how the read-only type bits survive
    /// the size probe. An unimplemented BAR has a zero mask and value.
    pub fn set_bar(&mut self, index: usize, value: u32, writable: u32) {
        self.bar_masks[index] = writable;
        self.write32(offset::BAR0 + (index as u8) * 4, value);
    }

    /// Sets the capabilities pointer and flags the capability list as present
    /// in the status register.
    pub fn set_capabilities_pointer(&mut self, ptr: u8) {
        self.write8(offset::CAP_PTR, ptr);
        let status = self.read16(offset::STATUS) | (1 << 4);
        self.write16(offset::STATUS, status);
    }

    /// Places a vendor-specific (virtio layout) capability at `at`.
    pub fn add_vendor_capability(
        &mut self,
        at: u8,
        next: u8,
        cfg_type: u8,
        bar: u8,
        bar_offset: u32,
        length: u32,
    ) {
        self.write8(at, 0x09);
        self.write8(at + 1, next);
        self.write8(at + 2, 16);
        self.write8(at + 3, cfg_type);
        self.write8(at + 4, bar);
        self.write32(at + 8, bar_offset);
        self.write32(at + 12, length);
    }

    /// Overrides the length byte of the vendor-specific capability at `at`.
    pub fn set_capability_length(&mut self, at: u8, len: u8) {
        self.write8(at + 2, len);
    }

    /// Places a non vendor-specific capability header at `at`.
    pub fn add_capability(&mut self, at: u8, id: u8, next: u8) {
        self.write8(at, id);
        self.write8(at + 1, next);
    }

    /// Applies a configuration write the way hardware would, honouring the
    /// BAR write masks.
    fn bus_write8(&mut self, off: u8, val: u8) {
        if (offset::BAR0..offset::BAR5 + 4).contains(&off) {
            let rel = off - offset::BAR0;
            let mask = (self.bar_masks[(rel / 4) as usize] >> ((rel % 4) * 8)) as u8;
            let old = self.regs[off as usize];
            self.regs[off as usize] = (val & mask) | (old & !mask);
        } else {
            self.regs[off as usize] = val;
        }
    }
}

/// A root complex with a handful of simulated functions behind it.
pub struct SimulatedConfigSpace {
    address: Cell<u32>,
    functions: RefCell<[Option<SimulatedFunction>; MAX_SIMULATED_FUNCTIONS]>,
}

impl SimulatedConfigSpace {
    pub fn new() -> Self {
        Self {
            address: Cell::new(0),
            functions: RefCell::new(core::array::from_fn(|_| None)),
        }
    }

    /// Adds or replaces the function at `function.bdf()`.
    ///
    /// Returns `false` and drops `function` if [`MAX_SIMULATED_FUNCTIONS`]
    /// distinct functions are already present.
    pub fn insert(&self, function: SimulatedFunction) -> bool {
        let mut functions = self.functions.borrow_mut();
        let bdf = function.bdf();
        let slot = match functions
            .iter()
            .position(|f| f.as_ref().is_some_and(|f| f.bdf() == bdf))
        {
            Some(i) => Some(i),
            None => functions.iter().position(Option::is_none),
        };
        match slot {
            Some(i) => {
                functions[i] = Some(function);
                true
            }
            None => false,
        }
    }

    /// Runs `f` on the function at `bdf`, if present.
    pub fn with_function<R>(&self, bdf: Bdf, f: impl FnOnce(&mut SimulatedFunction) -> R) -> Option<R> {
        let mut functions = self.functions.borrow_mut();
        functions
            .iter_mut()
            .flatten()
            .find(|func| func.bdf() == bdf)
            .map(f)
    }

    fn decode(&self) -> Option<(Bdf, u8)> {
        let addr = self.address.get();
        if addr & 0x8000_0000 == 0 {
            return None;
        }
        let bdf = Bdf::new((addr >> 16) as u8, (addr >> 11) as u8, (addr >> 8) as u8);
        Some((bdf, addr as u8 & 0xFC))
    }

    fn data_read(&self, port: u16, width: u8) -> u32 {
        let Some((bdf, reg)) = self.decode() else {
            return u32::MAX;
        };
        let lane = (port - CONFIG_DATA) as u8;
        self.with_function(bdf, |f| {
            let mut val = 0u32;
            for i in 0..width {
                val |= (f.read8(reg + lane + i) as u32) << (i * 8);
            }
            val
        })
        .unwrap_or(u32::MAX)
    }

    fn data_write(&self, port: u16, width: u8, val: u32) {
        let Some((bdf, reg)) = self.decode() else {
            return;
        };
        let lane = (port - CONFIG_DATA) as u8;
        self.with_function(bdf, |f| {
            for i in 0..width {
                f.bus_write8(reg + lane + i, (val >> (i * 8)) as u8);
            }
        });
    }

    fn is_data_port(port: u16) -> bool {
        (CONFIG_DATA..CONFIG_DATA + 4).contains(&port)
    }
}

impl Default for SimulatedConfigSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl PortIo for SimulatedConfigSpace {
    fn inb(&self, port: u16) -> u8 {
        if Self::is_data_port(port) {
            self.data_read(port, 1) as u8
        } else {
            0xFF
        }
    }

    fn inw(&self, port: u16) -> u16 {
        if Self::is_data_port(port) {
            self.data_read(port, 2) as u16
        } else {
            0xFFFF
        }
    }

    fn inl(&self, port: u16) -> u32 {
        if port == CONFIG_ADDRESS {
            self.address.get()
        } else if Self::is_data_port(port) {
            self.data_read(port, 4)
        } else {
            u32::MAX
        }
    }

    fn outb(&self, port: u16, val: u8) {
        if Self::is_data_port(port) {
            self.data_write(port, 1, val as u32);
        }
    }

    fn outw(&self, port: u16, val: u16) {
        if Self::is_data_port(port) {
            self.data_write(port, 2, val as u32);
        }
    }

    fn outl(&self, port: u16, val: u32) {
        if port == CONFIG_ADDRESS {
            self.address.set(val);
        } else if Self::is_data_port(port) {
            self.data_write(port, 4, val);
        }
    }
}
