// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

/// Names of the PCI base classes, indexed by class code.
const CLASS_NAMES: [&str; 18] = [
    "Unclassified",
    "Mass storage controller",
    "Network controller",
    "Display controller",
    "Multimedia controller",
    "Memory controller",
    "Bridge device",
    "Simple communication controller",
    "Base system peripheral",
    "Input device controller",
    "Docking station",
    "Processor",
    "Serial bus controller",
    "Wireless controller",
    "Intelligent controller",
    "Satellite communication controller",
    "Encryption controller",
    "Signal processing controller",
];

/// Returns a human readable name for a PCI base class code.
pub fn class_name(class_code: u8) -> &'static str {
    CLASS_NAMES
        .get(class_code as usize)
        .copied()
        .unwrap_or("Unknown")
}
