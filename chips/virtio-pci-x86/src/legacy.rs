// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Legacy virtio PCI transport.
//!
//! Legacy and transitional devices expose a fixed register block in the I/O
//! port range decoded by their first I/O BAR (section 4.1.4.8 of the Virtio
//! specification). Feature words are 32 bits wide and virtqueues are placed
//! by page frame number, with the legacy split-virtqueue layout.

use pci_x86::PortIo;
use virtio::queues::split_queue::SplitVirtqueueLayout;
use virtio::queues::VirtqueueAddresses;
use virtio::transports::{DeviceStatusVal, VirtIOInitializationError, VirtIOTransport};

/// Register offsets from the I/O base.
pub mod offset {
    pub const HOST_FEATURES: u16 = 0x00;
    pub const GUEST_FEATURES: u16 = 0x04;
    pub const QUEUE_ADDRESS: u16 = 0x08;
    pub const QUEUE_SIZE: u16 = 0x0C;
    pub const QUEUE_SELECT: u16 = 0x0E;
    pub const QUEUE_NOTIFY: u16 = 0x10;
    pub const DEVICE_STATUS: u16 = 0x12;
    pub const ISR_STATUS: u16 = 0x13;
    /// Start of the device-specific configuration, without MSI-X.
    pub const DEVICE_CONFIG: u16 = 0x14;
}

/// The queue address register holds the page frame number of the ring.
const QUEUE_ADDRESS_SHIFT: u32 = 12;

/// Legacy register block at an I/O base port.
pub struct LegacyTransport<P> {
    ports: P,
    io_base: u16,
}

impl<P: PortIo> LegacyTransport<P> {
    /// The low two bits of `io_base` are BAR flag bits and are masked off.
    pub fn new(ports: P, io_base: u16) -> Self {
        Self {
            ports,
            io_base: io_base & 0xFFFC,
        }
    }

    pub fn io_base(&self) -> u16 {
        self.io_base
    }

    #[inline]
    fn port(&self, offset: u16) -> u16 {
        self.io_base.wrapping_add(offset)
    }

    /// Reads and thereby acknowledges the interrupt status.
    pub fn isr_status(&self) -> u8 {
        self.ports.inb(self.port(offset::ISR_STATUS))
    }

    /// Reads a byte of the device-specific configuration.
    pub fn device_config_read8(&self, offset: u16) -> u8 {
        self.ports.inb(self.port(offset::DEVICE_CONFIG + offset))
    }

    /// Reads a 16-bit field of the device-specific configuration.
    pub fn device_config_read16(&self, offset: u16) -> u16 {
        self.ports.inw(self.port(offset::DEVICE_CONFIG + offset))
    }

    /// Reads a 32-bit field of the device-specific configuration.
    pub fn device_config_read32(&self, offset: u16) -> u32 {
        self.ports.inl(self.port(offset::DEVICE_CONFIG + offset))
    }

    /// Writes a byte of the device-specific configuration.
    pub fn device_config_write8(&self, offset: u16, val: u8) {
        self.ports.outb(self.port(offset::DEVICE_CONFIG + offset), val)
    }
}

impl<P: PortIo> VirtIOTransport for LegacyTransport<P> {
    fn device_status(&self) -> Result<DeviceStatusVal, VirtIOInitializationError> {
        Ok(DeviceStatusVal::new(
            self.ports.inb(self.port(offset::DEVICE_STATUS)),
        ))
    }

    fn set_device_status(&self, status: DeviceStatusVal) {
        self.ports
            .outb(self.port(offset::DEVICE_STATUS), status.get());
    }

    fn device_features(&self) -> Result<u64, VirtIOInitializationError> {
        // Fixed before DRIVER_OK, so no consistency check is needed
        Ok(self.ports.inl(self.port(offset::HOST_FEATURES)) as u64)
    }

    fn set_driver_features(&self, features: u64) {
        self.ports
            .outl(self.port(offset::GUEST_FEATURES), features as u32);
    }

    fn negotiate_transport_features(&self, _offered: u64) -> Result<u64, VirtIOInitializationError> {
        // Indirect descriptors and event suppression need ring support the
        // split virtqueue does not provide; VERSION_1 does not exist here.
        Ok(0)
    }

    fn queue_select(&self, queue: u16) {
        self.ports.outw(self.port(offset::QUEUE_SELECT), queue);
    }

    fn queue_size(&self) -> Result<u16, VirtIOInitializationError> {
        Ok(self.ports.inw(self.port(offset::QUEUE_SIZE)))
    }

    fn activate_queue(
        &self,
        queue: u16,
        size: u16,
        addrs: VirtqueueAddresses,
    ) -> Result<(), VirtIOInitializationError> {
        let index = queue as usize;
        self.queue_select(queue);

        // The legacy queue size is read-only
        if self.ports.inw(self.port(offset::QUEUE_SIZE)) != size {
            return Err(VirtIOInitializationError::UnsupportedQueueLayout(index));
        }

        let layout = SplitVirtqueueLayout::legacy(size as usize);
        let pfn = addrs.descriptor_area >> QUEUE_ADDRESS_SHIFT;
        if addrs.descriptor_area & ((1 << QUEUE_ADDRESS_SHIFT) - 1) != 0
            || pfn > u32::MAX as u64
            || !layout.matches(&addrs)
        {
            return Err(VirtIOInitializationError::UnsupportedQueueLayout(index));
        }

        if self.ports.inl(self.port(offset::QUEUE_ADDRESS)) != 0 {
            return Err(VirtIOInitializationError::DeviceError);
        }

        self.ports
            .outl(self.port(offset::QUEUE_ADDRESS), pfn as u32);
        Ok(())
    }

    fn queue_notify(&self, queue: u16) {
        self.ports.outw(self.port(offset::QUEUE_NOTIFY), queue);
    }
}
