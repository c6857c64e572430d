// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use virtio::devices::VirtIODeviceType;

/// PCI vendor ID shared by all virtio devices.
pub const VENDOR_ID: u16 = 0x1AF4;

/// Modern virtio devices use PCI device ID `DEVICE_ID_BASE + <virtio type>`.
pub const DEVICE_ID_BASE: u16 = 0x1040;

/// PCI device IDs of transitional devices, which also implement the legacy
/// interface.
pub const TRANSITIONAL_DEVICE_IDS: core::ops::RangeInclusive<u16> = 0x1000..=0x103F;

/// Maps a virtio PCI device ID to the virtio device type it exposes.
pub fn device_type_from_pci_id(device_id: u16) -> Option<VirtIODeviceType> {
    use VirtIODeviceType as DT;

    match device_id {
        0x1000 => Some(DT::NetworkCard),
        0x1001 => Some(DT::BlockDevice),
        0x1002 => Some(DT::TraditionalMemoryBallooning),
        0x1003 => Some(DT::Console),
        0x1004 => Some(DT::SCSIHost),
        0x1005 => Some(DT::EntropySource),
        0x1009 => Some(DT::Transport9P),
        id if id >= DEVICE_ID_BASE => {
            VirtIODeviceType::from_device_id((id - DEVICE_ID_BASE) as u32)
        }
        _ => None,
    }
}
