// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Discovery and bring-up of virtio functions on the root bus.

use log::{debug, info, warn};
use pci_x86::bar::map_bars;
use pci_x86::cap::walk;
use pci_x86::{enumerate, AddressTranslator, Bar, Bus, ConfigSpace, Device, Function, PciError, PortIo};
use virtio::devices::virtio_net::VirtIONetNegotiation;
use virtio::devices::{VirtIODeviceDriver, VirtIODeviceType};
use virtio::transports::VirtIOTransport;

use crate::cfg_type;
use crate::cfg_window::{PciCfgWindow, CAP_DATA};
use crate::device::{VirtIOPCIDevice, VirtIOPCITransport};
use crate::error::VirtIOPCIError;
use crate::ids::{device_type_from_pci_id, VENDOR_ID};
use crate::legacy::LegacyTransport;
use crate::modern::{ModernTransport, NotifyRegion, COMMON_CFG_SIZE};
use crate::registry::VirtIODeviceRegistry;

const CAP_LEN: u8 = 2;
const CAP_BAR: u8 = 4;
const CAP_OFFSET: u8 = 8;
const CAP_LENGTH: u8 = 12;
const CAP_NOTIFY_OFF_MULTIPLIER: u8 = 16;

static NET: VirtIONetNegotiation = VirtIONetNegotiation;

/// Feature negotiation strategy for devices of type `device_type`, if one is
/// available.
pub fn driver_for(device_type: VirtIODeviceType) -> Option<&'static dyn VirtIODeviceDriver> {
    match device_type {
        VirtIODeviceType::NetworkCard => Some(&NET),
        _ => None,
    }
}

/// Outcome of a [`probe`] run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ProbeSummary {
    /// Device slots scanned on the root bus.
    pub slots: usize,
    /// Virtio functions brought up and registered.
    pub registered: usize,
    /// Virtio functions that could not be brought up or registered.
    pub failed: usize,
}

/// BAR, offset and length of the structure a vendor-specific capability at
/// `cap` describes. `None` unless the BAR is an implemented memory BAR.
fn cap_region<P: PortIo>(func: &Function<'_, P>, dev: &Device<'_>, cap: u8) -> Option<(Bar, u32, u32)> {
    let bar = dev.bar(func.read8(cap + CAP_BAR) as usize)?;
    if bar.is_io() {
        return None;
    }
    Some((*bar, func.read32(cap + CAP_OFFSET), func.read32(cap + CAP_LENGTH)))
}

/// Config space offset of the `width`-byte field at `at` in the capability at
/// `cap`. The capability's length byte must cover the field.
fn cap_field<P: PortIo>(func: &Function<'_, P>, cap: u8, at: u8, width: u8) -> Result<u8, VirtIOPCIError> {
    let malformed = VirtIOPCIError::Pci(PciError::MalformedCapabilityChain { offset: cap });
    let len = func.read8(cap.checked_add(CAP_LEN).ok_or(malformed)?);
    if (at as usize + width as usize) > len as usize {
        return Err(malformed);
    }
    cap.checked_add(at).ok_or(malformed)
}

/// Overlays the common configuration structure of `dev`.
///
/// # Safety
///
/// See [`bring_up`].
unsafe fn modern_transport<'c, P: PortIo>(
    func: &Function<'_, P>,
    dev: &Device<'_>,
    common: u8,
) -> Result<VirtIOPCITransport<'c, &'c P>, VirtIOPCIError> {
    let (common_bar, offset, length) =
        cap_region(func, dev, common).ok_or(VirtIOPCIError::CommonConfigOutOfRange)?;
    if length < COMMON_CFG_SIZE || !common_bar.contains(offset, COMMON_CFG_SIZE) {
        return Err(VirtIOPCIError::CommonConfigOutOfRange);
    }

    let mut common_cfg = ModernTransport::new(common_bar.base + offset as u64);

    if let Some(notify) = dev.capabilities().get(cfg_type::NOTIFY) {
        let multiplier = cap_field(func, notify, CAP_NOTIFY_OFF_MULTIPLIER, 4)?;
        match cap_region(func, dev, notify) {
            Some((bar, offset, length)) if bar.contains(offset, length) => {
                common_cfg = common_cfg.with_notify_region(NotifyRegion {
                    base: bar.base + offset as u64,
                    multiplier: func.read32(multiplier),
                });
            }
            _ => warn!("VirtIO: {}: notify structure outside of its BAR", dev.bdf()),
        }
    }

    Ok(VirtIOPCITransport::Modern {
        mmio_base: common_bar.base,
        mmio_size: common_bar.size,
        common_cfg,
    })
}

/// Brings the virtio function `dev` up to `DRIVER_OK`.
///
/// Enables decoding and bus mastering, maps the BARs, walks the capability
/// list and drives the device through initialization over the modern
/// transport when a common configuration capability is present, or the
/// legacy transport in the first I/O BAR otherwise. On failure after the
/// status handshake started, the device is left with `FAILED` set.
///
/// # Safety
///
/// Memory BARs of `dev`, translated through `translator`, must be mapped
/// device memory that nothing else accesses for as long as `cfg` is
/// borrowed.
pub unsafe fn bring_up<'c, P: PortIo>(
    cfg: &'c ConfigSpace<P>,
    dev: &mut Device<'_>,
    translator: &dyn AddressTranslator,
) -> Result<VirtIOPCIDevice<'c, &'c P>, VirtIOPCIError> {
    if dev.vendor_id() != VENDOR_ID {
        return Err(VirtIOPCIError::NotAVirtIODevice);
    }
    let device_type = device_type_from_pci_id(dev.device_id())
        .ok_or(VirtIOPCIError::UnsupportedDeviceType(dev.device_id()))?;
    let driver =
        driver_for(device_type).ok_or(VirtIOPCIError::UnsupportedDeviceType(dev.device_id()))?;

    let func = dev.function(cfg);
    func.enable();
    map_bars(cfg, dev, translator);

    match walk(cfg, dev) {
        Ok(_) => {}
        // Transitional devices without capabilities still have the legacy
        // register block
        Err(PciError::NoCapabilityList) if dev.io_base().is_some() => {}
        Err(err) => return Err(err.into()),
    }

    let cfg_window = match dev.capabilities().get(cfg_type::PCI_CFG) {
        Some(cap) => {
            cap_field(&func, cap, CAP_DATA, 4)?;
            let malformed = PciError::MalformedCapabilityChain { offset: cap };
            Some(PciCfgWindow::new(cap).ok_or(malformed)?)
        }
        None => None,
    };

    let transport = if let Some(common) = dev.capabilities().get(cfg_type::COMMON) {
        modern_transport(&func, dev, common)?
    } else if let Some(io_base) = dev.io_base() {
        VirtIOPCITransport::Legacy(LegacyTransport::new(cfg.ports(), io_base))
    } else {
        return Err(VirtIOPCIError::NoTransport);
    };

    let features = transport.initialize(driver, &[])?;
    info!(
        "VirtIO: {}: {:?} up ({} transport), features {:#x}, irq: {}",
        dev.bdf(),
        device_type,
        if transport.is_modern() { "modern" } else { "legacy" },
        features,
        dev.irq_line()
    );

    let device = VirtIOPCIDevice::new(dev.bdf(), device_type, dev.irq_line(), features, transport);
    Ok(match cfg_window {
        Some(window) => device.with_cfg_window(window),
        None => device,
    })
}

/// Scans the root bus, brings up every virtio function found and stores it
/// in `registry`.
///
/// A function that fails to come up is logged and skipped; the scan always
/// covers the whole bus.
///
/// # Safety
///
/// See [`bring_up`]; the requirement applies to every virtio function on
/// the root bus.
pub unsafe fn probe<'c, P: PortIo>(
    cfg: &'c ConfigSpace<P>,
    translator: &dyn AddressTranslator,
    registry: &mut VirtIODeviceRegistry<'c, &'c P>,
) -> ProbeSummary {
    let root = Bus::root();
    let mut registered = 0;
    let mut failed = 0;

    let slots = enumerate(cfg, &root, |mut dev| {
        if dev.vendor_id() != VENDOR_ID {
            return;
        }

        let result = if registry.is_full() {
            Err(VirtIOPCIError::RegistryFull)
        } else {
            // Safety: guaranteed by the caller
            unsafe { bring_up(cfg, &mut dev, translator) }.and_then(|device| registry.allocate(device))
        };

        match result {
            Ok(handle) => {
                debug!("VirtIO: {}: registered as device {}", dev.bdf(), handle);
                registered += 1;
            }
            Err(err) => {
                warn!("VirtIO: {}: bring-up failed: {:?}", dev.bdf(), err);
                failed += 1;
            }
        }
    });

    ProbeSummary {
        slots,
        registered,
        failed,
    }
}
