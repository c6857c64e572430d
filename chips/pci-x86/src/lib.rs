// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! PCI support library for x86 kernels
//!
//! This crate discovers devices attached to the root PCI bus and prepares
//! them for a driver: it enumerates the bus/device/function space, walks each
//! function's capability list and sizes its Base Address Registers. It targets
//! the PCI Local Bus Specification, Revision 3.0, as published by the PCI-SIG.
//! All references to the PCI specification throughout this crate's
//! documentation and comments refer to this document.
//!
//! Limitations:
//!
//! * No support for PCI Express extended configuration space.
//! * x86 only, using configuration mechanism #1 (I/O ports `0xCF8`/`0xCFC`).
//! * Only the root bus is scanned; bridges are not followed.

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

mod bdf;
pub use self::bdf::Bdf;

pub mod bar;
pub use self::bar::{AddressTranslator, Bar, BarKind, IdentityTranslator};

mod bus;
pub use self::bus::Bus;

pub mod cap;
pub use self::cap::{CapIter, Capability, CapabilityMap};

pub mod cfg;
pub use self::cfg::ConfigSpace;

mod class;
pub use self::class::class_name;

mod device;
pub use self::device::{Command, CommandVal, Device, Function, Status, StatusVal};

mod enumerate;
pub use self::enumerate::{enumerate, MAX_DEVICES, MAX_FUNCTIONS};

mod error;
pub use self::error::PciError;

pub mod port;
pub use self::port::{PortIo, X86PortIo};

#[cfg(any(test, feature = "sim"))]
pub mod sim;
