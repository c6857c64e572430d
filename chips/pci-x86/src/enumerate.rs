// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use log::info;

use crate::bdf::Bdf;
use crate::bus::Bus;
use crate::cfg::{offset, ConfigSpace};
use crate::class::class_name;
use crate::device::Device;
use crate::port::PortIo;

/// Device slots per bus.
pub const MAX_DEVICES: u8 = 32;

/// Functions per multifunction device.
pub const MAX_FUNCTIONS: u8 = 8;

const HEADER_TYPE_MASK: u8 = 0x7F;
const MULTIFUNCTION: u8 = 0x80;

/// Scans every device slot of `bus` and passes each present function to
/// `visit`.
///
/// Slots whose header type is neither a normal device (0) nor a bridge (1)
/// are skipped, which includes empty slots reading all ones. Functions whose
/// vendor ID reads `0xFFFF` are absent and skipped.
///
/// Returns the number of device slots scanned, not the number of functions.
///
/// ```ignore
/// let cfg = ConfigSpace::new(unsafe { X86PortIo::new() });
/// let root = Bus::root();
/// pci_x86::enumerate(&cfg, &root, |dev| {
///     if dev.vendor_id() == 0x1AF4 {
///         // Found a virtio function
///     }
/// });
/// ```
pub fn enumerate<'a, P: PortIo>(
    cfg: &ConfigSpace<P>,
    bus: &'a Bus,
    mut visit: impl FnMut(Device<'a>),
) -> usize {
    let mut slots = 0;

    for device_index in 0..MAX_DEVICES {
        let slot = Bdf::new(bus.bus_number(), device_index, 0);
        let header = (cfg.read32(slot, offset::CACHE_LINE_SIZE) >> 16) as u8;
        if header & HEADER_TYPE_MASK > 1 {
            continue;
        }
        slots += 1;

        let functions = if header & MULTIFUNCTION != 0 {
            MAX_FUNCTIONS
        } else {
            1
        };

        for function_index in 0..functions {
            let bdf = Bdf::new(bus.bus_number(), device_index, function_index);
            let id = cfg.read32(bdf, offset::VENDOR_ID);
            if id as u16 == 0xFFFF {
                continue;
            }
            let interrupt = cfg.read32(bdf, offset::INT_LINE);
            let class = cfg.read32(bdf, offset::CLASS_CODE);

            let dev = Device::from_config(bus, device_index, function_index, id, class, interrupt);
            info!(
                "PCI: {}: {:04x}:{:04x}: class: {:02x}.{:02x} ({}) irq: {}",
                bdf,
                dev.vendor_id(),
                dev.device_id(),
                dev.class_code(),
                dev.subclass(),
                class_name(dev.class_code()),
                dev.irq_line()
            );
            visit(dev);
        }
    }

    slots
}
