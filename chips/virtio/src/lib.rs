// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

//! VirtIO support.
//!
//! Transport-independent parts of a VirtIO driver: device types and
//! per-class feature negotiation, the device-status state machine driven
//! through the [`VirtIOTransport`](transports::VirtIOTransport) trait, and
//! the memory layout of split virtqueues. Bus-specific transports implement
//! the trait's register accessors.

#![no_std]
#![crate_name = "virtio"]
#![crate_type = "rlib"]

#[cfg(test)]
#[macro_use]
extern crate std;

mod config;

pub mod devices;
pub mod queues;
pub mod transports;
