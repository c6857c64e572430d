// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! Base Address Register sizing and decoding.
//!
//! Each BAR is sized with the protocol from section 6.2.5.1 of the PCI
//! specification: save the register, write all ones, read back the writable
//! address bits, then restore the original value. The decoded regions are
//! stored in the function's [`Device`] record.

use log::{debug, warn};

use crate::cfg::ConfigSpace;
use crate::device::Device;
use crate::port::PortIo;

/// Address space a BAR decodes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BarKind {
    Memory32,
    Memory64,
    Io,
}

/// A decoded, implemented BAR.
///
/// For memory BARs `base` is the virtual address produced by the
/// [`AddressTranslator`]; for I/O BARs it is the port number.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Bar {
    pub kind: BarKind,
    pub base: u64,
    pub size: u32,
}

impl Bar {
    pub fn is_io(&self) -> bool {
        self.kind == BarKind::Io
    }

    /// Whether `offset..offset + len` lies within this region.
    pub fn contains(&self, offset: u32, len: u32) -> bool {
        offset
            .checked_add(len)
            .is_some_and(|end| end <= self.size)
    }
}

/// Translates physical addresses of memory BARs into addresses the kernel
/// can dereference.
pub trait AddressTranslator {
    fn phys_to_virt(&self, phys: u64) -> u64;
}

/// Translator for kernels that identity map device memory.
#[derive(Copy, Clone, Debug, Default)]
pub struct IdentityTranslator;

impl AddressTranslator for IdentityTranslator {
    fn phys_to_virt(&self, phys: u64) -> u64 {
        phys
    }
}

const BAR_IO: u32 = 0x1;
const BAR_MEM_TYPE_MASK: u32 = 0x6;
const BAR_MEM_TYPE_64: u32 = 0x4;
const BAR_MEM_ADDR_MASK: u32 = !0xF;
const BAR_IO_ADDR_MASK: u32 = 0xFFFC;

/// Sizes and decodes all six BARs of `dev`, storing the results in
/// [`Device::bars`]. The first I/O BAR also becomes the device's
/// [`io_base`](Device::io_base).
///
/// Unimplemented BARs stay `None`. A 64-bit memory BAR occupies two slots;
/// only the lower one gets an entry. Returns the number of implemented BARs.
pub fn map_bars<P: PortIo>(
    cfg: &ConfigSpace<P>,
    dev: &mut Device<'_>,
    translator: &dyn AddressTranslator,
) -> usize {
    let func = dev.function(cfg);
    let bdf = dev.bdf();
    let mut count = 0;
    let mut index = 0;

    while index < 6 {
        let Some(orig) = func.bar(index) else { break };
        func.set_bar(index, 0xFFFF_FFFF);
        let readback = func.bar(index).unwrap_or(0);
        func.set_bar(index, orig);

        if readback == 0 {
            index += 1;
            continue;
        }

        // Type bits are read-only, but some devices drop them from the
        // all-ones readback, so they are taken from the original value
        let (kind, phys, size) = if orig & BAR_IO != 0 {
            let size = (!((readback & BAR_IO_ADDR_MASK) as u16)).wrapping_add(1) as u32;
            (BarKind::Io, (orig & BAR_IO_ADDR_MASK) as u64, size)
        } else {
            let size = (!(readback & BAR_MEM_ADDR_MASK)).wrapping_add(1);
            if orig & BAR_MEM_TYPE_MASK == BAR_MEM_TYPE_64 {
                if index == 5 {
                    warn!("PCI: {}: 64-bit BAR {} has no upper half", bdf, index);
                    break;
                }
                let high = func.bar(index + 1).unwrap_or(0) as u64;
                let low = (orig & BAR_MEM_ADDR_MASK) as u64;
                (BarKind::Memory64, low | (high << 32), size)
            } else {
                (BarKind::Memory32, (orig & BAR_MEM_ADDR_MASK) as u64, size)
            }
        };

        if size != 0 {
            if phys == 0 {
                warn!(
                    "PCI: {}: BAR {} has {} bytes but no base address",
                    bdf, index, size
                );
            }

            let base = match kind {
                BarKind::Io => {
                    debug!("PCI: {}: io region {}: {} ports at {:#x}", bdf, index, size, phys);
                    if dev.io_base.is_none() {
                        dev.io_base = Some(phys as u16);
                    }
                    phys
                }
                BarKind::Memory32 | BarKind::Memory64 => {
                    debug!("PCI: {}: mem region {}: {} bytes at {:#x}", bdf, index, size, phys);
                    translator.phys_to_virt(phys)
                }
            };

            dev.bars[index] = Some(Bar { kind, base, size });
            count += 1;
        }

        index += if kind == BarKind::Memory64 { 2 } else { 1 };
    }

    count
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::{map_bars, AddressTranslator, Bar, BarKind, IdentityTranslator};
    use crate::cfg::{CONFIG_ADDRESS, CONFIG_DATA};
    use crate::sim::{SimulatedConfigSpace, SimulatedFunction};
    use crate::{Bdf, Bus, ConfigSpace, Device, PortIo};

    const BDF: Bdf = Bdf::new(0, 3, 0);

    struct Offset(u64);

    impl AddressTranslator for Offset {
        fn phys_to_virt(&self, phys: u64) -> u64 {
            phys + self.0
        }
    }

    fn setup(f: SimulatedFunction) -> SimulatedConfigSpace {
        let sim = SimulatedConfigSpace::new();
        sim.insert(f);
        sim
    }

    #[test]
    fn sizes_32bit_memory_bar_and_restores_it() {
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1000);
        f.set_bar(0, 0xFEBF_0000, 0xFFFF_FFF0);
        let sim = setup(f);
        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = Device::from_config(&bus, 3, 0, 0x1000_1AF4, 0, 0);

        assert_eq!(map_bars(&cfg, &mut dev, &IdentityTranslator), 1);
        assert_eq!(
            dev.bar(0),
            Some(&Bar {
                kind: BarKind::Memory32,
                base: 0xFEBF_0000,
                size: 16,
            })
        );
        assert!(dev.bars()[1..].iter().all(Option::is_none));
        assert_eq!(cfg.read32(BDF, 0x10), 0xFEBF_0000);
        assert_eq!(dev.io_base(), None);
    }

    #[test]
    fn combines_64bit_memory_bar_pair() {
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_bar(4, 0xFE00_0004, 0xFFFF_FFF0);
        f.set_bar(5, 0x0000_0001, 0xFFFF_FFFF);
        let sim = setup(f);
        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = Device::from_config(&bus, 3, 0, 0x1041_1AF4, 0, 0);

        assert_eq!(map_bars(&cfg, &mut dev, &IdentityTranslator), 1);
        assert_eq!(
            dev.bar(4),
            Some(&Bar {
                kind: BarKind::Memory64,
                base: 0x1_FE00_0000,
                size: 16,
            })
        );
        assert_eq!(dev.bar(5), None);
        assert_eq!(cfg.read32(BDF, 0x20), 0xFE00_0004);
        assert_eq!(cfg.read32(BDF, 0x24), 0x0000_0001);
    }

    /// Passes everything through to a simulated root complex, except that
    /// the sizing readback of BAR 4 comes back without its type bits.
    struct TypelessReadback {
        sim: SimulatedConfigSpace,
        address: Cell<u32>,
    }

    impl PortIo for TypelessReadback {
        fn inb(&self, port: u16) -> u8 {
            self.sim.inb(port)
        }

        fn inw(&self, port: u16) -> u16 {
            self.sim.inw(port)
        }

        fn inl(&self, port: u16) -> u32 {
            let val = self.sim.inl(port);
            if port == CONFIG_DATA && self.address.get() & 0xFC == 0x20 && val == 0xFFFF_FFF4 {
                0xFFFF_FFF0
            } else {
                val
            }
        }

        fn outb(&self, port: u16, val: u8) {
            self.sim.outb(port, val)
        }

        fn outw(&self, port: u16, val: u16) {
            self.sim.outw(port, val)
        }

        fn outl(&self, port: u16, val: u32) {
            if port == CONFIG_ADDRESS {
                self.address.set(val);
            }
            self.sim.outl(port, val)
        }
    }

    #[test]
    fn bar_type_comes_from_original_value() {
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1041);
        f.set_bar(4, 0xFE00_0004, 0xFFFF_FFF0);
        f.set_bar(5, 0x0000_0001, 0xFFFF_FFFF);
        let ports = TypelessReadback {
            sim: setup(f),
            address: Cell::new(0),
        };
        let cfg = ConfigSpace::new(&ports);
        assert_eq!(cfg.read32(BDF, 0x20), 0xFE00_0004);

        let bus = Bus::root();
        let mut dev = Device::from_config(&bus, 3, 0, 0x1041_1AF4, 0, 0);

        assert_eq!(map_bars(&cfg, &mut dev, &IdentityTranslator), 1);
        assert_eq!(
            dev.bar(4),
            Some(&Bar {
                kind: BarKind::Memory64,
                base: 0x1_FE00_0000,
                size: 16,
            })
        );
        assert_eq!(dev.bar(5), None);
        assert_eq!(dev.io_base(), None);
    }

    #[test]
    fn io_bar_becomes_io_base() {
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1000);
        f.set_bar(0, 0x0000_C041, 0xFFFF_FFE0);
        f.set_bar(1, 0xFEBD_1000, 0xFFFF_F000);
        let sim = setup(f);
        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = Device::from_config(&bus, 3, 0, 0x1000_1AF4, 0, 0);

        assert_eq!(map_bars(&cfg, &mut dev, &Offset(0xFFFF_8000_0000_0000)), 2);
        assert_eq!(
            dev.bar(0),
            Some(&Bar {
                kind: BarKind::Io,
                base: 0xC040,
                size: 32,
            })
        );
        assert_eq!(dev.io_base(), Some(0xC040));
        assert_eq!(dev.bar(1).map(|b| b.base), Some(0xFFFF_8000_FEBD_1000));
        assert_eq!(dev.bar(1).map(|b| b.size), Some(0x1000));
    }

    #[test]
    fn zero_base_is_recorded() {
        let mut f = SimulatedFunction::new(BDF, 0x1AF4, 0x1000);
        f.set_bar(2, 0, 0xFFFF_FF00);
        let sim = setup(f);
        let cfg = ConfigSpace::new(&sim);
        let bus = Bus::root();
        let mut dev = Device::from_config(&bus, 3, 0, 0x1000_1AF4, 0, 0);

        assert_eq!(map_bars(&cfg, &mut dev, &IdentityTranslator), 1);
        assert_eq!(dev.bar(2).map(|b| (b.base, b.size)), Some((0, 256)));
    }
}
