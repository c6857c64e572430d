// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use tock_registers::{register_bitfields, LocalRegisterCopy};

use super::bar::Bar;
use super::bus::Bus;
use super::cap::CapabilityMap;
use super::cfg::{offset, ConfigSpace};
use super::port::PortIo;
use super::Bdf;

register_bitfields![u16,
    /// PCI Command register bitfields
    pub Command [
        /// I/O space accesses enabled
        IO_SPACE OFFSET(0) NUMBITS(1) [],

        /// Memory space accesses enabled
        MEM_SPACE OFFSET(1) NUMBITS(1) [],

        /// Device is allowed to act as a bus master
        BUS_MASTER OFFSET(2) NUMBITS(1) [],

        /// Parity error response enable
        PARITY_ERR_RESP OFFSET(6) NUMBITS(1) [],

        /// SERR# driver enable
        SERR_ENABLE OFFSET(8) NUMBITS(1) [],

        /// Interrupt disable
        INT_DISABLE OFFSET(10) NUMBITS(1) [],
    ],

    /// PCI Status register bitfields
    pub Status [
        /// Interrupt status (pending)
        INT_STATUS OFFSET(3) NUMBITS(1) [],

        /// Capabilities list present
        CAP_LIST OFFSET(4) NUMBITS(1) [],

        /// 66 MHz capable
        CAP_66MHZ OFFSET(5) NUMBITS(1) [],

        /// DEVSEL timing encoding
        DEVSEL OFFSET(9) NUMBITS(2) [],

        /// Received master abort
        RECEIVED_MASTER_ABORT OFFSET(13) NUMBITS(1) [],

        /// Detected parity error
        DETECTED_PARITY_ERROR OFFSET(15) NUMBITS(1) [],
    ]
];

/// Type-safe representation of PCI command register value
pub type CommandVal = LocalRegisterCopy<u16, Command::Register>;

/// Type-safe representation of PCI status register value
pub type StatusVal = LocalRegisterCopy<u16, Status::Register>;

/// Live view of one function's configuration space.
///
/// This struct provides low-level methods for directly reading and writing
/// values from the PCI configuration space of a single function, as well as
/// higher-level methods for accessing standard fields. Every call performs a
/// configuration transaction; nothing is cached.
///
/// ```ignore
/// let cfg = ConfigSpace::new(unsafe { X86PortIo::new() });
/// let func = Function::new(&cfg, Bdf::new(0, 1, 0));
///
/// if func.vendor_id() == 0x1AF4 {
///     // Found a virtio function
/// }
/// ```
pub struct Function<'c, P> {
    cfg: &'c ConfigSpace<P>,
    bdf: Bdf,
}

impl<P> Clone for Function<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Function<'_, P> {}

impl<'c, P: PortIo> Function<'c, P> {
    pub const fn new(cfg: &'c ConfigSpace<P>, bdf: Bdf) -> Self {
        Self { cfg, bdf }
    }

    pub const fn bdf(&self) -> Bdf {
        self.bdf
    }

    /// Reads an 8-bit value from this function's PCI configuration space.
    #[inline]
    pub fn read8(&self, offset: u8) -> u8 {
        self.cfg.read8(self.bdf, offset)
    }

    /// Writes an 8-bit value to this function's PCI configuration space.
    #[inline]
    pub fn write8(&self, offset: u8, val: u8) {
        self.cfg.write8(self.bdf, offset, val)
    }

    /// Reads a 16-bit value from this function's PCI configuration space.
    #[inline]
    pub fn read16(&self, offset: u8) -> u16 {
        self.cfg.read16(self.bdf, offset)
    }

    /// Writes a 16-bit value to this function's PCI configuration space.
    #[inline]
    pub fn write16(&self, offset: u8, val: u16) {
        self.cfg.write16(self.bdf, offset, val)
    }

    /// Reads a 32-bit value from this function's PCI configuration space.
    #[inline]
    pub fn read32(&self, offset: u8) -> u32 {
        self.cfg.read32(self.bdf, offset)
    }

    /// Writes a 32-bit value to this function's PCI configuration space.
    #[inline]
    pub fn write32(&self, offset: u8, val: u32) {
        self.cfg.write32(self.bdf, offset, val)
    }

    /// Reads and returns the PCI vendor ID.
    #[inline]
    pub fn vendor_id(&self) -> u16 {
        self.read16(offset::VENDOR_ID)
    }

    /// Reads and returns the PCI device ID.
    #[inline]
    pub fn device_id(&self) -> u16 {
        self.read16(offset::DEVICE_ID)
    }

    /// Reads the command register of this function.
    #[inline]
    pub fn command(&self) -> CommandVal {
        LocalRegisterCopy::new(self.read16(offset::COMMAND))
    }

    /// Sets the command register of this function.
    #[inline]
    pub fn set_command(&self, value: CommandVal) {
        self.write16(offset::COMMAND, value.get());
    }

    /// Reads the status register of this function.
    ///
    /// The status register is the upper half of the command/status dword.
    #[inline]
    pub fn status(&self) -> StatusVal {
        LocalRegisterCopy::new((self.read32(offset::COMMAND) >> 16) as u16)
    }

    /// Reads the header type byte, including the multifunction bit.
    #[inline]
    pub fn header_type(&self) -> u8 {
        self.read8(offset::HEADER_TYPE)
    }

    /// Reads the raw value of BAR `index`, or `None` if `index` is out of range.
    pub fn bar(&self, index: usize) -> Option<u32> {
        if index > 5 {
            return None;
        }
        Some(self.read32(offset::BAR0 + (index as u8) * 4))
    }

    /// Writes the raw value of BAR `index`; out of range indices are ignored.
    pub fn set_bar(&self, index: usize, val: u32) {
        if index > 5 {
            return;
        }
        self.write32(offset::BAR0 + (index as u8) * 4, val)
    }

    /// Enables I/O decoding, memory decoding and bus mastering.
    ///
    /// Other command bits are preserved.
    pub fn enable(&self) {
        let mut command = self.command();
        command.modify(Command::IO_SPACE::SET + Command::MEM_SPACE::SET + Command::BUS_MASTER::SET);
        self.set_command(command);
    }
}

/// A present PCI function, as discovered by [`enumerate`](crate::enumerate).
///
/// Identity, class and interrupt routing are captured once during
/// enumeration. BAR and capability information start out empty and are filled
/// in by [`bar::map_bars`](crate::bar::map_bars) and
/// [`cap::walk`](crate::cap::walk).
#[derive(Clone, Debug)]
pub struct Device<'a> {
    bus: &'a Bus,
    device_index: u8,
    function_index: u8,
    vendor_id: u16,
    device_id: u16,
    class_code: u8,
    subclass: u8,
    prog_if: u8,
    revision: u8,
    irq_line: u8,
    irq_pin: u8,
    pub(crate) bars: [Option<Bar>; 6],
    pub(crate) io_base: Option<u16>,
    pub(crate) capabilities: CapabilityMap,
}

impl<'a> Device<'a> {
    /// Builds the record of a present function from its identification
    /// dword (`0x00`), class dword (`0x08`) and interrupt dword (`0x3C`).
    pub(crate) fn from_config(
        bus: &'a Bus,
        device_index: u8,
        function_index: u8,
        id: u32,
        class: u32,
        interrupt: u32,
    ) -> Self {
        Self {
            bus,
            device_index,
            function_index,
            vendor_id: id as u16,
            device_id: (id >> 16) as u16,
            class_code: (class >> 24) as u8,
            subclass: (class >> 16) as u8,
            prog_if: (class >> 8) as u8,
            revision: class as u8,
            irq_line: interrupt as u8,
            irq_pin: (interrupt >> 8) as u8,
            bars: [None; 6],
            io_base: None,
            capabilities: CapabilityMap::new(),
        }
    }

    pub fn bus(&self) -> &'a Bus {
        self.bus
    }

    pub fn device_index(&self) -> u8 {
        self.device_index
    }

    pub fn function_index(&self) -> u8 {
        self.function_index
    }

    pub fn bdf(&self) -> Bdf {
        Bdf::new(
            self.bus.bus_number(),
            self.device_index,
            self.function_index,
        )
    }

    /// Live configuration space access for this function.
    pub fn function<'c, P: PortIo>(&self, cfg: &'c ConfigSpace<P>) -> Function<'c, P> {
        Function::new(cfg, self.bdf())
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    pub fn class_code(&self) -> u8 {
        self.class_code
    }

    pub fn subclass(&self) -> u8 {
        self.subclass
    }

    pub fn prog_if(&self) -> u8 {
        self.prog_if
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Interrupt line as routed by firmware; `0xFF` means not connected.
    pub fn irq_line(&self) -> u8 {
        self.irq_line
    }

    /// Interrupt pin (`1`-`4` for INTA#-INTD#, `0` if none).
    pub fn irq_pin(&self) -> u8 {
        self.irq_pin
    }

    /// Returns the decoded BAR `index`, if it is implemented and was mapped.
    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)?.as_ref()
    }

    pub fn bars(&self) -> &[Option<Bar>; 6] {
        &self.bars
    }

    /// Port base of the function's I/O BAR, with the flag bits masked off.
    pub fn io_base(&self) -> Option<u16> {
        self.io_base
    }

    /// Capabilities recorded by the last capability walk.
    pub fn capabilities(&self) -> &CapabilityMap {
        &self.capabilities
    }
}
