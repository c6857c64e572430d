// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

pub mod split_queue;

/// A VirtIO queue as seen by a transport during device initialization.
///
/// The transport negotiates the queue size with the device, then hands the
/// queue's memory regions to the device.
pub trait Virtqueue {
    /// The guest-physical addresses of the queue's three memory regions.
    fn physical_addresses(&self) -> VirtqueueAddresses;

    /// Pick a queue size no larger than `max_elements`, the maximum the
    /// device supports, and return it.
    fn negotiate_queue_size(&self, max_elements: usize) -> usize;

    /// Bind the queue to `queue_number` with `queue_elements` entries.
    fn initialize(&self, queue_number: u32, queue_elements: usize);
}

/// Memory regions of a virtqueue, as passed to the device.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VirtqueueAddresses {
    /// Descriptor table.
    pub descriptor_area: u64,
    /// Available ring, written by the driver.
    pub driver_area: u64,
    /// Used ring, written by the device.
    pub device_area: u64,
}
