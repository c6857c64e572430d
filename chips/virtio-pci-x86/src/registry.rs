// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

use crate::config::CONFIG;
use crate::device::VirtIOPCIDevice;
use crate::error::VirtIOPCIError;

/// Number of slots in a [`VirtIODeviceRegistry`].
pub const REGISTRY_CAPACITY: usize = CONFIG.registry_capacity;

/// Fixed-capacity table of brought-up virtio devices.
///
/// The slot index returned by [`allocate`](Self::allocate) is the device's
/// handle. Slots are never freed, so handles are stable and never reused.
pub struct VirtIODeviceRegistry<'a, P> {
    slots: [Option<VirtIOPCIDevice<'a, P>>; REGISTRY_CAPACITY],
}

impl<'a, P> VirtIODeviceRegistry<'a, P> {
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    /// Stores `device` in the first empty slot and returns its handle.
    pub fn allocate(&mut self, device: VirtIOPCIDevice<'a, P>) -> Result<usize, VirtIOPCIError> {
        let handle = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(VirtIOPCIError::RegistryFull)?;
        self.slots[handle] = Some(device);
        Ok(handle)
    }

    pub fn get(&self, handle: usize) -> Option<&VirtIOPCIDevice<'a, P>> {
        self.slots.get(handle).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub const fn capacity(&self) -> usize {
        REGISTRY_CAPACITY
    }

    /// Iterates over `(handle, device)` pairs in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &VirtIOPCIDevice<'a, P>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(handle, slot)| slot.as_ref().map(|dev| (handle, dev)))
    }
}

impl<P> Default for VirtIODeviceRegistry<'_, P> {
    fn default() -> Self {
        Self::new()
    }
}
