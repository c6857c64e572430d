// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use core::fmt;

/// Bus/device/function address of a PCI function.
///
/// Packed the same way the PCI specification lays these fields out within the
/// configuration address register: 8 bits of bus number, 5 bits of device
/// number and 3 bits of function number.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bdf(u16);

impl Bdf {
    /// Constructs a new BDF identifier.
    ///
    /// Device and function numbers are truncated to 5 and 3 bits.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self(((bus as u16) << 8) | (((device & 0x1F) as u16) << 3) | ((function & 0x07) as u16))
    }

    /// Returns the bus number.
    pub const fn bus(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Returns the device number on the bus.
    pub const fn device(&self) -> u8 {
        ((self.0 >> 3) & 0x1F) as u8
    }

    /// Returns the function number within the device.
    pub const fn function(&self) -> u8 {
        (self.0 & 0x07) as u8
    }

    /// Forms the configuration address word selecting the register at
    /// `offset` of this function.
    ///
    /// Bit 31 marks a configuration transaction; the register offset is
    /// always dword aligned in the address phase.
    pub const fn config_address(&self, offset: u8) -> u32 {
        0x8000_0000
            | ((self.bus() as u32) << 16)
            | ((self.device() as u32) << 11)
            | ((self.function() as u32) << 8)
            | ((offset & 0xFC) as u32)
    }
}

impl fmt::Debug for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Bdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}.{}",
            self.bus(),
            self.device(),
            self.function()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Bdf;

    #[test]
    fn fields_round_trip() {
        let bdf = Bdf::new(0x12, 0x1F, 7);
        assert_eq!(bdf.bus(), 0x12);
        assert_eq!(bdf.device(), 0x1F);
        assert_eq!(bdf.function(), 7);
    }

    #[test]
    fn config_address_layout() {
        let bdf = Bdf::new(1, 3, 2);
        assert_eq!(bdf.config_address(0x3C), 0x8001_1A3C);

        // Sub-dword offsets are aligned down in the address phase
        assert_eq!(bdf.config_address(0x3E), 0x8001_1A3C);
        assert_eq!(Bdf::new(0, 0, 0).config_address(0), 0x8000_0000);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Bdf::new(0, 3, 1)), "00:03.1");
    }
}
