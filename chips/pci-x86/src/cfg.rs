// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Configuration space access mechanism #1.
//!
//! A configuration transaction is two-step: the address word selecting
//! bus/device/function and register is written to [`CONFIG_ADDRESS`], then
//! the register is accessed through the 4-byte window at [`CONFIG_DATA`].
//! Byte and word accesses pick their lane within the data window from the
//! low bits of the register offset.
//!
//! There is no error path: reads of an absent function return all ones, and
//! keeping bus/device/function numbers within range is up to the caller.

use crate::bdf::Bdf;
use crate::port::PortIo;

/// I/O port of the configuration address register.
pub const CONFIG_ADDRESS: u16 = 0xCF8;

/// I/O port of the configuration data window.
pub const CONFIG_DATA: u16 = 0xCFC;

/// Offsets of standard registers within the type 0 configuration header.
pub mod offset {
    pub const VENDOR_ID: u8 = 0x00;
    pub const DEVICE_ID: u8 = 0x02;
    pub const COMMAND: u8 = 0x04;
    pub const STATUS: u8 = 0x06;
    pub const REVISION_ID: u8 = 0x08;
    pub const CLASS_CODE: u8 = 0x08;
    pub const CACHE_LINE_SIZE: u8 = 0x0C;
    pub const HEADER_TYPE: u8 = 0x0E;
    pub const BAR0: u8 = 0x10;
    pub const BAR5: u8 = 0x24;
    pub const CAP_PTR: u8 = 0x34;
    pub const INT_LINE: u8 = 0x3C;
    pub const INT_PIN: u8 = 0x3D;

    /// First offset past the standard header, where capabilities may start.
    pub const DEVICE_SPECIFIC: u8 = 0x40;
}

/// Owner of the configuration address/data port pair.
#[derive(Debug)]
pub struct ConfigSpace<P> {
    ports: P,
}

impl<P: PortIo> ConfigSpace<P> {
    pub const fn new(ports: P) -> Self {
        Self { ports }
    }

    /// Returns the port space configuration transactions are issued on.
    pub fn ports(&self) -> &P {
        &self.ports
    }

    #[inline]
    fn select(&self, bdf: Bdf, offset: u8) {
        self.ports.outl(CONFIG_ADDRESS, bdf.config_address(offset));
    }

    /// Reads an 8-bit configuration register.
    #[inline]
    pub fn read8(&self, bdf: Bdf, offset: u8) -> u8 {
        self.select(bdf, offset);
        self.ports.inb(CONFIG_DATA + (offset & 3) as u16)
    }

    /// Reads a 16-bit configuration register.
    #[inline]
    pub fn read16(&self, bdf: Bdf, offset: u8) -> u16 {
        self.select(bdf, offset);
        self.ports.inw(CONFIG_DATA + (offset & 2) as u16)
    }

    /// Reads a 32-bit configuration register.
    #[inline]
    pub fn read32(&self, bdf: Bdf, offset: u8) -> u32 {
        self.select(bdf, offset);
        self.ports.inl(CONFIG_DATA)
    }

    /// Writes an 8-bit configuration register.
    #[inline]
    pub fn write8(&self, bdf: Bdf, offset: u8, val: u8) {
        self.select(bdf, offset);
        self.ports.outb(CONFIG_DATA + (offset & 3) as u16, val);
    }

    /// Writes a 16-bit configuration register.
    #[inline]
    pub fn write16(&self, bdf: Bdf, offset: u8, val: u16) {
        self.select(bdf, offset);
        self.ports.outw(CONFIG_DATA + (offset & 2) as u16, val);
    }

    /// Writes a 32-bit configuration register.
    #[inline]
    pub fn write32(&self, bdf: Bdf, offset: u8, val: u32) {
        self.select(bdf, offset);
        self.ports.outl(CONFIG_DATA, val);
    }
}
