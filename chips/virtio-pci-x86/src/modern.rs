// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Modern virtio PCI transport.
//!
//! The common configuration structure (section 4.1.4.3 of the Virtio
//! specification) is found through a vendor-specific capability naming a
//! memory BAR and an offset into it. Reads of fields the device may change
//! on its own are guarded by `config_generation`.

use log::warn;
use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::registers::{ReadOnly, ReadWrite};
use tock_registers::register_structs;
use virtio::queues::VirtqueueAddresses;
use virtio::transports::consistent::{generation_guarded_read, DEFAULT_MAX_ATTEMPTS};
use virtio::transports::{
    DeviceStatus, DeviceStatusVal, TransportFeatures, TransportFeaturesVal,
    VirtIOInitializationError, VirtIOTransport,
};

register_structs! {
    /// Virtio PCI common configuration structure.
    pub VirtIOPCICommonCfgRegisters {
        (0x00 => device_feature_select: ReadWrite<u32>),
        (0x04 => device_feature: ReadOnly<u32>),
        (0x08 => driver_feature_select: ReadWrite<u32>),
        (0x0C => driver_feature: ReadWrite<u32>),
        (0x10 => msix_config: ReadWrite<u16>),
        (0x12 => num_queues: ReadOnly<u16>),
        (0x14 => device_status: ReadWrite<u8, DeviceStatus::Register>),
        (0x15 => config_generation: ReadOnly<u8>),
        (0x16 => queue_select: ReadWrite<u16>),
        (0x18 => queue_size: ReadWrite<u16>),
        (0x1A => queue_msix_vector: ReadWrite<u16>),
        (0x1C => queue_enable: ReadWrite<u16>),
        (0x1E => queue_notify_off: ReadOnly<u16>),
        (0x20 => queue_desc_low: ReadWrite<u32>),
        (0x24 => queue_desc_high: ReadWrite<u32>),
        (0x28 => queue_driver_low: ReadWrite<u32>),
        (0x2C => queue_driver_high: ReadWrite<u32>),
        (0x30 => queue_device_low: ReadWrite<u32>),
        (0x34 => queue_device_high: ReadWrite<u32>),
        (0x38 => @END),
    }
}

/// Size of [`VirtIOPCICommonCfgRegisters`] in bytes.
pub const COMMON_CFG_SIZE: u32 = 0x38;

/// `msix_config` and `queue_msix_vector` value routing nothing through
/// MSI-X.
pub const NO_VECTOR: u16 = 0xFFFF;

/// Notification region of a modern device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NotifyRegion {
    /// Virtual address of the start of the region.
    pub base: u64,
    /// Distance between the notification addresses of consecutive
    /// `queue_notify_off` values.
    pub multiplier: u32,
}

/// Modern register block overlaid on a memory BAR.
pub struct ModernTransport<'a> {
    regs: &'a VirtIOPCICommonCfgRegisters,
    notify: Option<NotifyRegion>,
    retry_limit: usize,
}

impl<'a> ModernTransport<'a> {
    /// Overlays the common configuration structure at virtual address
    /// `common_cfg`.
    ///
    /// # Safety
    ///
    /// `common_cfg` must point to a mapped, suitably aligned device region
    /// holding the common configuration structure for all of `'a`, and no
    /// other code may access that region meanwhile.
    pub unsafe fn new(common_cfg: u64) -> ModernTransport<'a> {
        ModernTransport {
            regs: &*(common_cfg as usize as *const VirtIOPCICommonCfgRegisters),
            notify: None,
            retry_limit: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many consecutive `config_generation` mismatches a read
    /// tolerates before reporting the transport as unstable.
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Enables queue notifications through `notify`.
    ///
    /// # Safety
    ///
    /// `notify.base` must point to the device's mapped notification region,
    /// covering the notification address of every queue, for all of `'a`.
    pub unsafe fn with_notify_region(mut self, notify: NotifyRegion) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn retry_limit(&self) -> usize {
        self.retry_limit
    }

    fn consistent<T>(&self, read: impl FnMut() -> T) -> Result<T, VirtIOInitializationError> {
        generation_guarded_read(
            || self.regs.config_generation.get(),
            read,
            self.retry_limit,
        )
    }

    /// Number of virtqueues the device supports.
    pub fn num_queues(&self) -> Result<u16, VirtIOInitializationError> {
        self.consistent(|| self.regs.num_queues.get())
    }
}

impl VirtIOTransport for ModernTransport<'_> {
    fn device_status(&self) -> Result<DeviceStatusVal, VirtIOInitializationError> {
        self.consistent(|| self.regs.device_status.extract())
    }

    fn set_device_status(&self, status: DeviceStatusVal) {
        self.regs.device_status.set(status.get());
    }

    fn device_features(&self) -> Result<u64, VirtIOInitializationError> {
        self.consistent(|| {
            self.regs.device_feature_select.set(0);
            let low = self.regs.device_feature.get() as u64;
            self.regs.device_feature_select.set(1);
            let high = self.regs.device_feature.get() as u64;
            low | (high << 32)
        })
    }

    fn set_driver_features(&self, features: u64) {
        self.regs.driver_feature_select.set(0);
        self.regs.driver_feature.set(features as u32);
        self.regs.driver_feature_select.set(1);
        self.regs.driver_feature.set((features >> 32) as u32);
    }

    fn negotiate_transport_features(&self, offered: u64) -> Result<u64, VirtIOInitializationError> {
        let offered = TransportFeaturesVal::new(offered);
        let mut selected = TransportFeaturesVal::new(0);

        // Version1 must be offered AND accepted
        if !offered.is_set(TransportFeatures::Version1) {
            return Err(VirtIOInitializationError::InvalidVirtIOVersion);
        }
        selected.modify(TransportFeatures::Version1::SET);

        Ok(selected.get())
    }

    fn queue_select(&self, queue: u16) {
        self.regs.queue_select.set(queue);
    }

    fn queue_size(&self) -> Result<u16, VirtIOInitializationError> {
        self.consistent(|| self.regs.queue_size.get())
    }

    fn activate_queue(
        &self,
        queue: u16,
        size: u16,
        addrs: VirtqueueAddresses,
    ) -> Result<(), VirtIOInitializationError> {
        self.queue_select(queue);

        // Queues are disabled by reset
        if self.regs.queue_enable.get() != 0 {
            return Err(VirtIOInitializationError::DeviceError);
        }

        // Interrupts are delivered through INTx
        self.regs.msix_config.set(NO_VECTOR);
        self.regs.queue_msix_vector.set(NO_VECTOR);

        self.regs.queue_size.set(size);
        self.regs.queue_desc_low.set(addrs.descriptor_area as u32);
        self.regs
            .queue_desc_high
            .set((addrs.descriptor_area >> 32) as u32);
        self.regs.queue_driver_low.set(addrs.driver_area as u32);
        self.regs
            .queue_driver_high
            .set((addrs.driver_area >> 32) as u32);
        self.regs.queue_device_low.set(addrs.device_area as u32);
        self.regs
            .queue_device_high
            .set((addrs.device_area >> 32) as u32);
        self.regs.queue_enable.set(1);
        Ok(())
    }

    fn queue_notify(&self, queue: u16) {
        let Some(notify) = self.notify else {
            warn!("VirtIO: queue {} notified without a notify region", queue);
            return;
        };
        self.queue_select(queue);
        let offset = self.regs.queue_notify_off.get() as u64 * notify.multiplier as u64;
        let addr = (notify.base + offset) as usize as *mut u16;
        // Safety: guaranteed by the caller of `with_notify_region`
        unsafe { core::ptr::write_volatile(addr, queue) };
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use core::cell::Cell;
    use std::boxed::Box;

    use tock_registers::interfaces::Readable;
    use virtio::devices::virtio_net::VirtIONetNegotiation;
    use virtio::queues::VirtqueueAddresses;
    use virtio::transports::{VirtIOInitializationError, VirtIOTransport};

    use virtio::transports::consistent::DEFAULT_MAX_ATTEMPTS;

    use super::{ModernTransport, NotifyRegion};

    /// Zeroed, 8-byte aligned backing memory for a common configuration
    /// structure and a notification region.
    #[repr(C, align(8))]
    pub(crate) struct FakeBar(pub(crate) [u8; 0x100]);

    impl FakeBar {
        pub(crate) fn leak() -> &'static mut FakeBar {
            Box::leak(Box::new(FakeBar([0; 0x100])))
        }

        pub(crate) fn addr(&self) -> u64 {
            self.0.as_ptr() as u64
        }

        pub(crate) fn read32(&self, off: usize) -> u32 {
            u32::from_le_bytes([self.0[off], self.0[off + 1], self.0[off + 2], self.0[off + 3]])
        }

        pub(crate) fn read16(&self, off: usize) -> u16 {
            u16::from_le_bytes([self.0[off], self.0[off + 1]])
        }

        pub(crate) fn write32(&mut self, off: usize, val: u32) {
            self.0[off..off + 4].copy_from_slice(&val.to_le_bytes());
        }

        pub(crate) fn write16(&mut self, off: usize, val: u16) {
            self.0[off..off + 2].copy_from_slice(&val.to_le_bytes());
        }
    }

    fn bar_with_features(features: u32) -> &'static mut FakeBar {
        let bar = FakeBar::leak();
        // Memory does not act on feature_select, so both halves read the
        // same word.
        bar.write32(0x04, features);
        bar.write16(0x18, 64);
        bar
    }

    #[test]
    fn negotiates_version_1_and_device_features() {
        let bar = bar_with_features(0x0000_0021);
        let transport = unsafe { ModernTransport::new(bar.addr()) };
        assert_eq!(transport.retry_limit(), DEFAULT_MAX_ATTEMPTS);

        // Offered: 0x21 | 0x21 << 32, so bit 32 (VERSION_1) is set
        let accepted = transport.initialize(&VirtIONetNegotiation, &[]);
        assert_eq!(accepted, Ok((1 << 32) | 0x21));

        // driver_feature holds the last written half
        assert_eq!(bar.read32(0x0C), 1);
        assert_eq!(bar.read32(0x08), 1);
        assert_eq!(bar.0[0x14], 0x0F);
    }

    #[test]
    fn missing_version_1_fails_device() {
        let bar = bar_with_features(0x0000_0020);
        let transport = unsafe { ModernTransport::new(bar.addr()) };

        assert_eq!(
            transport.initialize(&VirtIONetNegotiation, &[]),
            Err(VirtIOInitializationError::InvalidVirtIOVersion)
        );
        assert_eq!(bar.0[0x14], 0x83);
    }

    #[test]
    fn activates_queue_registers() {
        let bar = bar_with_features(0);
        let transport = unsafe { ModernTransport::new(bar.addr()) };
        let addrs = VirtqueueAddresses {
            descriptor_area: 0x1_2345_6000,
            driver_area: 0x1_2345_6400,
            device_area: 0x1_2345_6800,
        };

        assert_eq!(transport.activate_queue(0, 32, addrs), Ok(()));
        assert_eq!(bar.read16(0x18), 32);
        assert_eq!(bar.read32(0x20), 0x2345_6000);
        assert_eq!(bar.read32(0x24), 0x1);
        assert_eq!(bar.read32(0x28), 0x2345_6400);
        assert_eq!(bar.read32(0x30), 0x2345_6800);
        assert_eq!(bar.read16(0x1A), super::NO_VECTOR);
        assert_eq!(bar.read16(0x1C), 1);

        // Enabling twice means the device was not reset
        assert_eq!(
            transport.activate_queue(0, 32, addrs),
            Err(VirtIOInitializationError::DeviceError)
        );
    }

    #[test]
    fn notify_writes_queue_index_at_offset() {
        let bar = bar_with_features(0);
        bar.write16(0x1E, 3);
        let notify_base = bar.addr() + 0x40;
        let transport = unsafe {
            ModernTransport::new(bar.addr()).with_notify_region(NotifyRegion {
                base: notify_base,
                multiplier: 4,
            })
        };

        transport.queue_notify(1);
        assert_eq!(bar.read16(0x40 + 12), 1);
    }

    /// Reads the queue size while the device bumps `config_generation`
    /// during each of the first `changes` reads.
    fn read_with_generation_changes(limit: usize, changes: usize) -> Result<u16, VirtIOInitializationError> {
        let bar = bar_with_features(0);
        let generation = (bar.addr() + 0x15) as *mut u8;
        let transport = unsafe { ModernTransport::new(bar.addr()) }.with_retry_limit(limit);
        let remaining = Cell::new(changes);
        transport.consistent(|| {
            if remaining.get() > 0 {
                remaining.set(remaining.get() - 1);
                unsafe { generation.write_volatile(generation.read_volatile().wrapping_add(1)) };
            }
            transport.regs.queue_size.get()
        })
    }

    #[test]
    fn generation_changes_below_limit_are_retried() {
        assert_eq!(read_with_generation_changes(4, 0), Ok(64));
        assert_eq!(read_with_generation_changes(4, 3), Ok(64));
        assert_eq!(read_with_generation_changes(DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS - 1), Ok(64));
    }

    #[test]
    fn generation_changing_on_every_attempt_is_unstable() {
        assert_eq!(
            read_with_generation_changes(4, 4),
            Err(VirtIOInitializationError::TransportUnstable)
        );
        assert_eq!(
            read_with_generation_changes(4, 10),
            Err(VirtIOInitializationError::TransportUnstable)
        );
        assert_eq!(
            read_with_generation_changes(DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_ATTEMPTS),
            Err(VirtIOInitializationError::TransportUnstable)
        );
    }

    #[test]
    fn zero_retry_limit_reports_unstable() {
        let bar = bar_with_features(0);
        let transport = unsafe { ModernTransport::new(bar.addr()) }.with_retry_limit(0);
        assert_eq!(
            transport.device_features(),
            Err(VirtIOInitializationError::TransportUnstable)
        );
    }
}
