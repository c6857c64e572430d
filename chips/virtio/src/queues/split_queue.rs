// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2023.

//! VirtIO Split Virtqueue memory layout.
//!
//! This module describes the memory layout of a Split Virtqueue, as defined in
//! 2.6 Split Virtqueues of the [Virtual I/O Device (VIRTIO) Specification,
//! Version
//! 1.1](https://docs.oasis-open.org/virtio/virtio/v1.1/csprd01/virtio-v1.1-csprd01.html).
//! A split virtqueue consists of three regions: the descriptor table, the
//! available ring (driver area) and the used ring (device area). Modern
//! transports accept the three regions at independent addresses, while the
//! legacy PCI transport takes a single page frame number and expects the used
//! ring on the next page boundary after the available ring.
//!
//! Descriptor production and consumption are not handled here.

use core::cell::Cell;
use core::cmp;

use tock_registers::register_bitfields;
use tock_registers::registers::InMemoryRegister;

use super::super::queues::{Virtqueue, VirtqueueAddresses};

pub const DESCRIPTOR_ALIGNMENT: usize = 16;
pub const AVAILABLE_RING_ALIGNMENT: usize = 2;
pub const USED_RING_ALIGNMENT: usize = 4;

/// Alignment of the used ring for queues handed to a legacy transport.
pub const LEGACY_QUEUE_ALIGNMENT: usize = 4096;

/// Size of one descriptor table entry.
pub const DESCRIPTOR_SIZE: usize = 16;

/// Size of one used ring element.
pub const USED_ELEMENT_SIZE: usize = 8;

register_bitfields![u16,
    pub DescriptorFlags [
        Next OFFSET(0) NUMBITS(1) [],
        WriteOnly OFFSET(1) NUMBITS(1) [],
        Indirect OFFSET(2) NUMBITS(1) []
    ],
    pub AvailableRingFlags [
        NoInterrupt OFFSET(0) NUMBITS(1) []
    ],
    pub UsedRingFlags [
        NoNotify OFFSET(0) NUMBITS(1) []
    ],
];

/// A single Virtqueue descriptor, 16 bytes.
#[repr(C)]
pub struct VirtqueueDescriptor {
    /// Guest physical address of the buffer to share
    pub addr: InMemoryRegister<u64>,
    /// Length of the shared buffer
    pub len: InMemoryRegister<u32>,
    pub flags: InMemoryRegister<u16, DescriptorFlags::Register>,
    /// Index of the chained descriptor, if `flags.Next` is set
    pub next: InMemoryRegister<u16>,
}

impl Default for VirtqueueDescriptor {
    fn default() -> VirtqueueDescriptor {
        VirtqueueDescriptor {
            addr: InMemoryRegister::new(0),
            len: InMemoryRegister::new(0),
            flags: InMemoryRegister::new(0),
            next: InMemoryRegister::new(0),
        }
    }
}

/// The Virtqueue descriptor table.
#[repr(C, align(16))]
pub struct VirtqueueDescriptors<const MAX_QUEUE_SIZE: usize>(pub [VirtqueueDescriptor; MAX_QUEUE_SIZE]);

impl<const MAX_QUEUE_SIZE: usize> Default for VirtqueueDescriptors<MAX_QUEUE_SIZE> {
    fn default() -> Self {
        VirtqueueDescriptors(core::array::from_fn(|_| VirtqueueDescriptor::default()))
    }
}

// Needed to build the ring array with `core::array::from_fn`.
#[repr(transparent)]
pub struct VirtqueueAvailableElement(pub InMemoryRegister<u16>);

impl Default for VirtqueueAvailableElement {
    fn default() -> VirtqueueAvailableElement {
        VirtqueueAvailableElement(InMemoryRegister::new(0))
    }
}

/// The Virtqueue available ring, `6 + 2 * n` bytes.
///
/// `idx` only ever increments; the driver never takes back exposed buffers.
#[repr(C, align(2))]
pub struct VirtqueueAvailableRing<const MAX_QUEUE_SIZE: usize> {
    pub flags: InMemoryRegister<u16, AvailableRingFlags::Register>,
    pub idx: InMemoryRegister<u16>,
    pub ring: [VirtqueueAvailableElement; MAX_QUEUE_SIZE],
    /// Only honored by the device if `VIRTIO_F_EVENT_IDX` was negotiated.
    pub used_event: InMemoryRegister<u16>,
}

impl<const MAX_QUEUE_SIZE: usize> Default for VirtqueueAvailableRing<MAX_QUEUE_SIZE> {
    fn default() -> Self {
        VirtqueueAvailableRing {
            flags: InMemoryRegister::new(0),
            idx: InMemoryRegister::new(0),
            ring: core::array::from_fn(|_| VirtqueueAvailableElement::default()),
            used_event: InMemoryRegister::new(0),
        }
    }
}

/// A single element of the [`VirtqueueUsedRing`].
#[repr(C)]
pub struct VirtqueueUsedElement {
    /// Head of the returned descriptor chain.
    pub id: InMemoryRegister<u32>,
    /// Bytes written by the device into the chain.
    pub len: InMemoryRegister<u32>,
}

impl Default for VirtqueueUsedElement {
    fn default() -> VirtqueueUsedElement {
        VirtqueueUsedElement {
            id: InMemoryRegister::new(0),
            len: InMemoryRegister::new(0),
        }
    }
}

/// The Virtqueue used ring, `6 + 8 * n` bytes.
///
/// Written only by the device once the queue is live.
#[repr(C, align(4))]
pub struct VirtqueueUsedRing<const MAX_QUEUE_SIZE: usize> {
    pub flags: InMemoryRegister<u16, UsedRingFlags::Register>,
    pub idx: InMemoryRegister<u16>,
    pub ring: [VirtqueueUsedElement; MAX_QUEUE_SIZE],
    /// Only honored by the driver if `VIRTIO_F_EVENT_IDX` was negotiated.
    pub avail_event: InMemoryRegister<u16>,
}

impl<const MAX_QUEUE_SIZE: usize> Default for VirtqueueUsedRing<MAX_QUEUE_SIZE> {
    fn default() -> Self {
        VirtqueueUsedRing {
            flags: InMemoryRegister::new(0),
            idx: InMemoryRegister::new(0),
            ring: core::array::from_fn(|_| VirtqueueUsedElement::default()),
            avail_event: InMemoryRegister::new(0),
        }
    }
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Placement of a split virtqueue's regions within one contiguous buffer.
///
/// All offsets are relative to the start of the descriptor table.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SplitVirtqueueLayout {
    pub queue_size: usize,
    pub available_ring_offset: usize,
    pub used_ring_offset: usize,
    pub total_size: usize,
}

impl SplitVirtqueueLayout {
    pub const fn descriptor_table_size(queue_size: usize) -> usize {
        DESCRIPTOR_SIZE * queue_size
    }

    pub const fn available_ring_size(queue_size: usize) -> usize {
        6 + 2 * queue_size
    }

    pub const fn used_ring_size(queue_size: usize) -> usize {
        6 + USED_ELEMENT_SIZE * queue_size
    }

    const fn with_used_alignment(queue_size: usize, used_alignment: usize) -> Self {
        let available_ring_offset = Self::descriptor_table_size(queue_size);
        let used_ring_offset = align_up(
            available_ring_offset + Self::available_ring_size(queue_size),
            used_alignment,
        );
        SplitVirtqueueLayout {
            queue_size,
            available_ring_offset,
            used_ring_offset,
            total_size: used_ring_offset + Self::used_ring_size(queue_size),
        }
    }

    /// Tightest layout permitted by the ring alignment requirements.
    pub const fn modern(queue_size: usize) -> Self {
        Self::with_used_alignment(queue_size, USED_RING_ALIGNMENT)
    }

    /// Layout expected by the legacy transport, with the used ring starting
    /// on a page boundary.
    pub const fn legacy(queue_size: usize) -> Self {
        Self::with_used_alignment(queue_size, LEGACY_QUEUE_ALIGNMENT)
    }

    /// Region addresses for a queue whose descriptor table is at `base`.
    pub fn addresses(&self, base: u64) -> VirtqueueAddresses {
        VirtqueueAddresses {
            descriptor_area: base,
            driver_area: base + self.available_ring_offset as u64,
            device_area: base + self.used_ring_offset as u64,
        }
    }

    /// Whether `addrs` places the three regions exactly where this layout
    /// does, relative to the descriptor table.
    pub fn matches(&self, addrs: &VirtqueueAddresses) -> bool {
        *addrs == self.addresses(addrs.descriptor_area)
    }
}

/// A split virtqueue built from caller-provided ring memory.
///
/// The rings must be zeroed (as their `Default` implementations produce) and
/// must stay in place for as long as the device may access them.
pub struct SplitVirtqueue<'a, const MAX_QUEUE_SIZE: usize> {
    descriptors: &'a mut VirtqueueDescriptors<MAX_QUEUE_SIZE>,
    available_ring: &'a mut VirtqueueAvailableRing<MAX_QUEUE_SIZE>,
    used_ring: &'a mut VirtqueueUsedRing<MAX_QUEUE_SIZE>,

    initialized: Cell<bool>,
    queue_number: Cell<u32>,
    max_elements: Cell<usize>,
}

impl<'a, const MAX_QUEUE_SIZE: usize> SplitVirtqueue<'a, MAX_QUEUE_SIZE> {
    pub fn new(
        descriptors: &'a mut VirtqueueDescriptors<MAX_QUEUE_SIZE>,
        available_ring: &'a mut VirtqueueAvailableRing<MAX_QUEUE_SIZE>,
        used_ring: &'a mut VirtqueueUsedRing<MAX_QUEUE_SIZE>,
    ) -> Self {
        assert!((core::ptr::from_ref(descriptors) as usize).is_multiple_of(DESCRIPTOR_ALIGNMENT));
        assert!(
            (core::ptr::from_ref(available_ring) as usize).is_multiple_of(AVAILABLE_RING_ALIGNMENT)
        );
        assert!((core::ptr::from_ref(used_ring) as usize).is_multiple_of(USED_RING_ALIGNMENT));

        SplitVirtqueue {
            descriptors,
            available_ring,
            used_ring,

            initialized: Cell::new(false),
            queue_number: Cell::new(0),
            max_elements: Cell::new(MAX_QUEUE_SIZE),
        }
    }

    /// Get the queue number associated with this Virtqueue.
    ///
    /// Prior to initialization the SplitVirtqueue does not have an associated
    /// queue number and will return `None`.
    pub fn queue_number(&self) -> Option<u32> {
        if self.initialized.get() {
            Some(self.queue_number.get())
        } else {
            None
        }
    }

    /// Number of ring entries in use, as negotiated with the device.
    pub fn queue_size(&self) -> usize {
        self.max_elements.get()
    }
}

impl<const MAX_QUEUE_SIZE: usize> Virtqueue for SplitVirtqueue<'_, MAX_QUEUE_SIZE> {
    fn physical_addresses(&self) -> VirtqueueAddresses {
        VirtqueueAddresses {
            descriptor_area: core::ptr::from_ref(self.descriptors) as u64,
            driver_area: core::ptr::from_ref(self.available_ring) as u64,
            device_area: core::ptr::from_ref(self.used_ring) as u64,
        }
    }

    fn negotiate_queue_size(&self, max_elements: usize) -> usize {
        let negotiated = cmp::min(MAX_QUEUE_SIZE, max_elements);
        self.max_elements.set(negotiated);
        negotiated
    }

    fn initialize(&self, queue_number: u32, queue_elements: usize) {
        self.queue_number.set(queue_number);
        self.max_elements.set(queue_elements);
        self.initialized.set(true);
    }
}
