// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use crate::bdf::Bdf;

/// A PCI bus.
///
/// Devices enumerated on a bus borrow it rather than own it. A bus behind a
/// bridge remembers the bridge by its address only; it does not keep the
/// bridge's [`Device`](crate::Device) alive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Bus {
    bus_number: u8,
    parent_bridge: Option<Bdf>,
}

impl Bus {
    /// The root bus (bus 0, no parent bridge).
    pub const fn root() -> Self {
        Self {
            bus_number: 0,
            parent_bridge: None,
        }
    }

    /// A secondary bus reached through the bridge at `parent_bridge`.
    pub const fn behind(bus_number: u8, parent_bridge: Bdf) -> Self {
        Self {
            bus_number,
            parent_bridge: Some(parent_bridge),
        }
    }

    pub const fn bus_number(&self) -> u8 {
        self.bus_number
    }

    pub const fn parent_bridge(&self) -> Option<Bdf> {
        self.parent_bridge
    }

    pub const fn is_root(&self) -> bool {
        self.parent_bridge.is_none()
    }
}
