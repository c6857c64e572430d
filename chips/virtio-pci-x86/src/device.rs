// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use pci_x86::{Bdf, PortIo};
use virtio::devices::VirtIODeviceType;
use virtio::queues::VirtqueueAddresses;
use virtio::transports::{DeviceStatusVal, VirtIOInitializationError, VirtIOTransport};

use crate::cfg_window::PciCfgWindow;
use crate::legacy::LegacyTransport;
use crate::modern::ModernTransport;

/// Register set through which a virtio PCI function is driven.
pub enum VirtIOPCITransport<'a, P> {
    /// Pre-1.0 register block in the function's first I/O BAR.
    Legacy(LegacyTransport<P>),
    /// Common configuration structure overlaid on a memory BAR.
    Modern {
        /// Virtual address of the BAR holding the structure.
        mmio_base: u64,
        /// Size of that BAR in bytes.
        mmio_size: u32,
        common_cfg: ModernTransport<'a>,
    },
}

impl<P: PortIo> VirtIOPCITransport<'_, P> {
    pub fn is_modern(&self) -> bool {
        matches!(self, VirtIOPCITransport::Modern { .. })
    }

    fn inner(&self) -> &dyn VirtIOTransport {
        match self {
            VirtIOPCITransport::Legacy(legacy) => legacy,
            VirtIOPCITransport::Modern { common_cfg, .. } => common_cfg,
        }
    }
}

impl<P: PortIo> VirtIOTransport for VirtIOPCITransport<'_, P> {
    fn device_status(&self) -> Result<DeviceStatusVal, VirtIOInitializationError> {
        self.inner().device_status()
    }

    fn set_device_status(&self, status: DeviceStatusVal) {
        self.inner().set_device_status(status)
    }

    fn device_features(&self) -> Result<u64, VirtIOInitializationError> {
        self.inner().device_features()
    }

    fn set_driver_features(&self, features: u64) {
        self.inner().set_driver_features(features)
    }

    fn negotiate_transport_features(&self, offered: u64) -> Result<u64, VirtIOInitializationError> {
        self.inner().negotiate_transport_features(offered)
    }

    fn queue_select(&self, queue: u16) {
        self.inner().queue_select(queue)
    }

    fn queue_size(&self) -> Result<u16, VirtIOInitializationError> {
        self.inner().queue_size()
    }

    fn activate_queue(
        &self,
        queue: u16,
        size: u16,
        addrs: VirtqueueAddresses,
    ) -> Result<(), VirtIOInitializationError> {
        self.inner().activate_queue(queue, size, addrs)
    }

    fn queue_notify(&self, queue: u16) {
        self.inner().queue_notify(queue)
    }
}

/// A virtio function that has been brought up to `DRIVER_OK`.
pub struct VirtIOPCIDevice<'a, P> {
    bdf: Bdf,
    device_type: VirtIODeviceType,
    irq: u8,
    features: u64,
    cfg_window: Option<PciCfgWindow>,
    transport: VirtIOPCITransport<'a, P>,
}

impl<'a, P: PortIo> VirtIOPCIDevice<'a, P> {
    pub fn new(
        bdf: Bdf,
        device_type: VirtIODeviceType,
        irq: u8,
        features: u64,
        transport: VirtIOPCITransport<'a, P>,
    ) -> Self {
        Self {
            bdf,
            device_type,
            irq,
            features,
            cfg_window: None,
            transport,
        }
    }

    /// Records the function's PCI configuration access capability.
    pub fn with_cfg_window(mut self, window: PciCfgWindow) -> Self {
        self.cfg_window = Some(window);
        self
    }

    pub fn bdf(&self) -> Bdf {
        self.bdf
    }

    pub fn device_type(&self) -> VirtIODeviceType {
        self.device_type
    }

    /// Legacy interrupt line of the function.
    pub fn irq(&self) -> u8 {
        self.irq
    }

    /// Feature bits negotiated during bring-up.
    pub fn features(&self) -> u64 {
        self.features
    }

    pub fn cfg_window(&self) -> Option<PciCfgWindow> {
        self.cfg_window
    }

    pub fn transport(&self) -> &VirtIOPCITransport<'a, P> {
        &self.transport
    }
}
