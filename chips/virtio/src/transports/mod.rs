// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! VirtIO transports and the device initialization sequence.
//!
//! A transport provides access to a device's status, feature and queue
//! registers. The initialization sequence of section 3.1 of the VirtIO
//! specification is implemented once, in [`VirtIOTransport::initialize`], on
//! top of those accessors.

use log::debug;
use tock_registers::{register_bitfields, LocalRegisterCopy};

use super::config::CONFIG;
use super::devices::{VirtIODeviceDriver, VirtIODeviceType, DEVICE_FEATURES_MASK};
use super::queues::{Virtqueue, VirtqueueAddresses};

pub mod consistent;

register_bitfields![u8,
    pub DeviceStatus [
        Acknowledge OFFSET(0) NUMBITS(1) [],
        Driver OFFSET(1) NUMBITS(1) [],
        DriverOk OFFSET(2) NUMBITS(1) [],
        FeaturesOk OFFSET(3) NUMBITS(1) [],
        DeviceNeedsReset OFFSET(6) NUMBITS(1) [],
        Failed OFFSET(7) NUMBITS(1) []
    ]
];

pub type DeviceStatusVal = LocalRegisterCopy<u8, DeviceStatus::Register>;

register_bitfields![u64,
    pub TransportFeatures [
        RingIndirectDesc OFFSET(28) NUMBITS(1) [],
        RingEventIdx OFFSET(29) NUMBITS(1) [],
        Version1 OFFSET(32) NUMBITS(1) [],
        AccessPlatform OFFSET(33) NUMBITS(1) [],
        RingPacked OFFSET(34) NUMBITS(1) [],
        InOrder OFFSET(35) NUMBITS(1) [],
        OrderPlatform OFFSET(36) NUMBITS(1) [],
        SRIOV OFFSET(37) NUMBITS(1) []
    ]
];

pub type TransportFeaturesVal = LocalRegisterCopy<u64, TransportFeatures::Register>;

/// Progress of a device through initialization, derived from its status
/// register.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum DeviceState {
    Reset,
    Acknowledged,
    DriverLoaded,
    FeaturesOk,
    DriverOk,
    Failed,
}

impl DeviceState {
    /// The furthest state whose bits are all present in `status`.
    pub fn from_status(status: DeviceStatusVal) -> DeviceState {
        if status.is_set(DeviceStatus::Failed) {
            DeviceState::Failed
        } else if status.is_set(DeviceStatus::DriverOk) {
            DeviceState::DriverOk
        } else if status.is_set(DeviceStatus::FeaturesOk) {
            DeviceState::FeaturesOk
        } else if status.is_set(DeviceStatus::Driver) {
            DeviceState::DriverLoaded
        } else if status.is_set(DeviceStatus::Acknowledge) {
            DeviceState::Acknowledged
        } else {
            DeviceState::Reset
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum VirtIOInitializationError {
    /// Feature negotiation failed. Either the driver rejected the offered
    /// features (`accepted` is `None`), or the device cleared `FEATURES_OK`
    /// after the driver wrote back the `accepted` set.
    FeatureNegotiationFailed {
        offered: u64,
        accepted: Option<u64>,
    },
    /// The device kept changing its configuration while it was being read.
    TransportUnstable,
    /// The device did not report a reset status after being reset.
    ResetTimeout,
    /// A modern device did not offer `VIRTIO_F_VERSION_1`.
    InvalidVirtIOVersion,
    /// The driver does not drive devices of this type.
    IncompatibleDriverDeviceType(VirtIODeviceType),
    /// The device reports a size of zero for the queue with this index.
    VirtqueueNotAvailable(usize),
    /// The transport cannot use the memory layout or size of the queue with
    /// this index.
    UnsupportedQueueLayout(usize),
    /// The device is in an unexpected state.
    DeviceError,
}

/// Register access of a VirtIO transport.
///
/// Implementors provide the register accessors; the initialization sequence
/// is shared through the provided [`reset`](VirtIOTransport::reset) and
/// [`initialize`](VirtIOTransport::initialize) methods.
pub trait VirtIOTransport {
    /// Reads the device status register.
    fn device_status(&self) -> Result<DeviceStatusVal, VirtIOInitializationError>;

    /// Writes the device status register.
    fn set_device_status(&self, status: DeviceStatusVal);

    /// Reads the full set of features offered by the device.
    fn device_features(&self) -> Result<u64, VirtIOInitializationError>;

    /// Writes the set of features accepted by the driver.
    fn set_driver_features(&self, features: u64);

    /// Selects the transport and queue feature bits (24 and up) to accept out
    /// of `offered`.
    fn negotiate_transport_features(&self, offered: u64) -> Result<u64, VirtIOInitializationError>;

    /// Selects the queue subsequent queue register accesses refer to.
    fn queue_select(&self, queue: u16);

    /// Size of the selected queue, zero if the queue does not exist.
    fn queue_size(&self) -> Result<u16, VirtIOInitializationError>;

    /// Hands queue `queue`, negotiated to `size` entries, to the device and
    /// marks it ready.
    fn activate_queue(
        &self,
        queue: u16,
        size: u16,
        addrs: VirtqueueAddresses,
    ) -> Result<(), VirtIOInitializationError>;

    /// Notifies the device of new buffers in queue `queue`.
    fn queue_notify(&self, queue: u16);

    /// Resets the device and waits for the reset to complete.
    fn reset(&self) -> Result<(), VirtIOInitializationError> {
        self.set_device_status(DeviceStatusVal::new(0));
        for _ in 0..CONFIG.reset_poll_limit {
            if self.device_status()?.get() == 0 {
                return Ok(());
            }
        }
        Err(VirtIOInitializationError::ResetTimeout)
    }

    /// Drives the device from reset to `DRIVER_OK`, per section 3.1 of the
    /// VirtIO specification.
    ///
    /// Every status write adds exactly one bit to the previously written
    /// value. On failure `FAILED` is added instead and the device is left
    /// unusable. The queues in `queues` are activated in order, as queue 0,
    /// 1, and so on.
    ///
    /// Returns the full set of negotiated features.
    fn initialize(
        &self,
        driver: &dyn VirtIODeviceDriver,
        queues: &[&dyn Virtqueue],
    ) -> Result<u64, VirtIOInitializationError> {
        let mut status = DeviceStatusVal::new(0);
        let result = drive_to_ok(self, &mut status, driver, queues);
        if result.is_err() {
            status.modify(DeviceStatus::Failed::SET);
            self.set_device_status(status);
        }
        result
    }
}

fn drive_to_ok<T: VirtIOTransport + ?Sized>(
    transport: &T,
    status: &mut DeviceStatusVal,
    driver: &dyn VirtIODeviceDriver,
    queues: &[&dyn Virtqueue],
) -> Result<u64, VirtIOInitializationError> {
    // 1. Reset the device
    transport.reset()?;

    // 2. Set the ACKNOWLEDGE status bit: the guest OS has noticed the device
    status.modify(DeviceStatus::Acknowledge::SET);
    transport.set_device_status(*status);

    // 3. Set the DRIVER status bit: the guest OS knows how to drive the device
    status.modify(DeviceStatus::Driver::SET);
    transport.set_device_status(*status);

    // 4. Read device feature bits, write the subset of feature bits
    // understood by OS & driver to the device
    //
    // Feature bits 0-23 are for the driver, 24-37 for the transport & queue,
    // 38 and above reserved.
    let offered = transport.device_features()?;
    debug!("VirtIO: device offers features {:#018x}", offered);

    let transport_features = transport.negotiate_transport_features(offered)?;
    let driver_features = driver
        .negotiate_features(offered & DEVICE_FEATURES_MASK)
        .ok_or(VirtIOInitializationError::FeatureNegotiationFailed {
            offered,
            accepted: None,
        })?
        & offered
        & DEVICE_FEATURES_MASK;

    let selected = transport_features | driver_features;
    transport.set_driver_features(selected);
    debug!("VirtIO: driver accepts features {:#018x}", selected);

    // 5. Set the FEATURES_OK status bit. We MUST NOT accept new feature bits
    // after this step.
    status.modify(DeviceStatus::FeaturesOk::SET);
    transport.set_device_status(*status);

    // 6. Re-read device status to ensure that FEATURES_OK is still set,
    // otherwise the device does not support the subset of features & is
    // unusable.
    if !transport.device_status()?.is_set(DeviceStatus::FeaturesOk) {
        return Err(VirtIOInitializationError::FeatureNegotiationFailed {
            offered,
            accepted: Some(selected),
        });
    }

    // 7. Perform device specific setup
    transport.queue_select(0);
    debug!("VirtIO: queue 0 size: {}", transport.queue_size()?);

    for (index, queue) in queues.iter().enumerate() {
        transport.queue_select(index as u16);
        let max = transport.queue_size()?;
        if max == 0 {
            return Err(VirtIOInitializationError::VirtqueueNotAvailable(index));
        }

        let size = queue.negotiate_queue_size(max as usize);
        queue.initialize(index as u32, size);
        transport.activate_queue(index as u16, size as u16, queue.physical_addresses())?;
        debug!("VirtIO: queue {}: {} of {} entries", index, size, max);
    }

    // 8. Set the DRIVER_OK status bit
    status.modify(DeviceStatus::DriverOk::SET);
    transport.set_device_status(*status);

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use core::cell::{Cell, RefCell};
    use std::vec::Vec;

    use super::{
        DeviceState, DeviceStatus, DeviceStatusVal, TransportFeatures, TransportFeaturesVal,
        VirtIOInitializationError, VirtIOTransport,
    };
    use crate::devices::virtio_net::VirtIONetNegotiation;
    use crate::devices::{VirtIODeviceDriver, VirtIODeviceType};
    use crate::queues::{Virtqueue, VirtqueueAddresses};

    const VERSION_1: u64 = 1 << 32;
    const EVENT_IDX: u64 = 1 << 29;

    /// Device that accepts everything unless told otherwise.
    struct FakeTransport {
        status: Cell<u8>,
        status_writes: RefCell<Vec<u8>>,
        offered: u64,
        driver_features: Cell<u64>,
        reject_features: bool,
        stuck_in_reset: bool,
        queue_sizes: [u16; 2],
        selected: Cell<u16>,
        activated: RefCell<Vec<(u16, u16, VirtqueueAddresses)>>,
    }

    impl FakeTransport {
        fn new(offered: u64) -> Self {
            FakeTransport {
                status: Cell::new(0x0F),
                status_writes: RefCell::new(Vec::new()),
                offered,
                driver_features: Cell::new(0),
                reject_features: false,
                stuck_in_reset: false,
                queue_sizes: [256, 256],
                selected: Cell::new(0),
                activated: RefCell::new(Vec::new()),
            }
        }

        fn writes(&self) -> Vec<u8> {
            self.status_writes.borrow().clone()
        }
    }

    impl VirtIOTransport for FakeTransport {
        fn device_status(&self) -> Result<DeviceStatusVal, VirtIOInitializationError> {
            let mut status = DeviceStatusVal::new(self.status.get());
            if self.stuck_in_reset {
                status.modify(DeviceStatus::DeviceNeedsReset::SET);
            }
            if self.reject_features {
                status.modify(DeviceStatus::FeaturesOk::CLEAR);
            }
            Ok(status)
        }

        fn set_device_status(&self, status: DeviceStatusVal) {
            self.status.set(status.get());
            self.status_writes.borrow_mut().push(status.get());
        }

        fn device_features(&self) -> Result<u64, VirtIOInitializationError> {
            Ok(self.offered)
        }

        fn set_driver_features(&self, features: u64) {
            self.driver_features.set(features);
        }

        fn negotiate_transport_features(
            &self,
            offered: u64,
        ) -> Result<u64, VirtIOInitializationError> {
            let offered = TransportFeaturesVal::new(offered);
            if !offered.is_set(TransportFeatures::Version1) {
                return Err(VirtIOInitializationError::InvalidVirtIOVersion);
            }
            Ok(VERSION_1)
        }

        fn queue_select(&self, queue: u16) {
            self.selected.set(queue);
        }

        fn queue_size(&self) -> Result<u16, VirtIOInitializationError> {
            Ok(self.queue_sizes[self.selected.get() as usize])
        }

        fn activate_queue(
            &self,
            queue: u16,
            size: u16,
            addrs: VirtqueueAddresses,
        ) -> Result<(), VirtIOInitializationError> {
            self.activated.borrow_mut().push((queue, size, addrs));
            Ok(())
        }

        fn queue_notify(&self, _queue: u16) {}
    }

    struct RejectAll;

    impl VirtIODeviceDriver for RejectAll {
        fn negotiate_features(&self, _offered_features: u64) -> Option<u64> {
            None
        }

        fn device_type(&self) -> VirtIODeviceType {
            VirtIODeviceType::EntropySource
        }
    }

    struct FixedQueue {
        capacity: usize,
        negotiated: Cell<Option<(u32, usize)>>,
    }

    impl Virtqueue for FixedQueue {
        fn physical_addresses(&self) -> VirtqueueAddresses {
            VirtqueueAddresses {
                descriptor_area: 0x1000,
                driver_area: 0x1100,
                device_area: 0x1200,
            }
        }

        fn negotiate_queue_size(&self, max_elements: usize) -> usize {
            max_elements.min(self.capacity)
        }

        fn initialize(&self, queue_number: u32, queue_elements: usize) {
            self.negotiated.set(Some((queue_number, queue_elements)));
        }
    }

    #[test]
    fn status_bits_accumulate_in_order() {
        let transport = FakeTransport::new(VERSION_1 | EVENT_IDX | 0x21);
        let accepted = transport.initialize(&VirtIONetNegotiation, &[]);

        assert_eq!(accepted, Ok(VERSION_1 | 0x21));
        assert_eq!(transport.driver_features.get(), VERSION_1 | 0x21);
        assert_eq!(transport.writes(), [0x00, 0x01, 0x03, 0x0B, 0x0F]);
        assert_eq!(
            DeviceState::from_status(DeviceStatusVal::new(transport.status.get())),
            DeviceState::DriverOk
        );
    }

    #[test]
    fn device_clearing_features_ok_fails_negotiation() {
        let mut transport = FakeTransport::new(VERSION_1 | 0x01);
        transport.reject_features = true;

        let result = transport.initialize(&VirtIONetNegotiation, &[]);
        assert_eq!(
            result,
            Err(VirtIOInitializationError::FeatureNegotiationFailed {
                offered: VERSION_1 | 0x01,
                accepted: Some(VERSION_1 | 0x01),
            })
        );

        let writes = transport.writes();
        assert_eq!(writes, [0x00, 0x01, 0x03, 0x0B, 0x8B]);
        assert!(writes.iter().all(|s| s & 0x04 == 0));
    }

    #[test]
    fn driver_rejecting_features_fails_device() {
        let transport = FakeTransport::new(VERSION_1);
        let result = transport.initialize(&RejectAll, &[]);
        assert_eq!(
            result,
            Err(VirtIOInitializationError::FeatureNegotiationFailed {
                offered: VERSION_1,
                accepted: None,
            })
        );
        assert_eq!(transport.writes(), [0x00, 0x01, 0x03, 0x83]);
    }

    #[test]
    fn missing_version_1_is_rejected() {
        let transport = FakeTransport::new(0x01);
        assert_eq!(
            transport.initialize(&VirtIONetNegotiation, &[]),
            Err(VirtIOInitializationError::InvalidVirtIOVersion)
        );
        assert_eq!(transport.writes().last(), Some(&0x83));
    }

    #[test]
    fn reset_that_never_completes_times_out() {
        let mut transport = FakeTransport::new(VERSION_1);
        transport.stuck_in_reset = true;
        assert_eq!(
            transport.initialize(&VirtIONetNegotiation, &[]),
            Err(VirtIOInitializationError::ResetTimeout)
        );
        assert_eq!(transport.writes(), [0x00, 0x80]);
    }

    #[test]
    fn queues_are_sized_and_activated() {
        let transport = FakeTransport::new(VERSION_1);
        let rx = FixedQueue {
            capacity: 16,
            negotiated: Cell::new(None),
        };
        let tx = FixedQueue {
            capacity: 1024,
            negotiated: Cell::new(None),
        };

        assert!(transport.initialize(&VirtIONetNegotiation, &[&rx, &tx]).is_ok());
        assert_eq!(rx.negotiated.get(), Some((0, 16)));
        assert_eq!(tx.negotiated.get(), Some((1, 256)));

        let activated = transport.activated.borrow();
        assert_eq!(activated.len(), 2);
        assert_eq!((activated[0].0, activated[0].1), (0, 16));
        assert_eq!((activated[1].0, activated[1].1), (1, 256));
    }

    #[test]
    fn missing_queue_fails_device() {
        let mut transport = FakeTransport::new(VERSION_1);
        transport.queue_sizes = [256, 0];
        let q = FixedQueue {
            capacity: 8,
            negotiated: Cell::new(None),
        };

        assert_eq!(
            transport.initialize(&VirtIONetNegotiation, &[&q, &q]),
            Err(VirtIOInitializationError::VirtqueueNotAvailable(1))
        );
        assert_eq!(transport.writes().last(), Some(&0x8B));
    }

    #[test]
    fn state_from_status() {
        assert_eq!(
            DeviceState::from_status(DeviceStatusVal::new(0)),
            DeviceState::Reset
        );
        assert_eq!(
            DeviceState::from_status(DeviceStatusVal::new(0x03)),
            DeviceState::DriverLoaded
        );
        assert_eq!(
            DeviceState::from_status(DeviceStatusVal::new(0x8F)),
            DeviceState::Failed
        );
    }
}
