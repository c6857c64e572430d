// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2025.

//! x86 I/O port access.
//!
//! Configuration space and the legacy virtio register window are both reached
//! through the x86 I/O port space. All accesses in this crate go through the
//! [`PortIo`] trait so that the owner of the port space can be swapped out,
//! e.g. for a simulated configuration space in tests.
//!
//! [`X86PortIo`] issues `in`/`out` directly. Tock keeps these wrappers in
//! its `x86` arch crate (`x86::registers::io`), which is not published to
//! crates.io and so is not a dependency here; the functions below have the
//! same shape as its `inb`/`outb` family.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use core::arch::asm;

/// Byte, word and dword access to the I/O port space.
pub trait PortIo {
    fn inb(&self, port: u16) -> u8;
    fn inw(&self, port: u16) -> u16;
    fn inl(&self, port: u16) -> u32;
    fn outb(&self, port: u16, val: u8);
    fn outw(&self, port: u16, val: u16);
    fn outl(&self, port: u16, val: u32);
}

impl<T: PortIo + ?Sized> PortIo for &T {
    #[inline]
    fn inb(&self, port: u16) -> u8 {
        (**self).inb(port)
    }

    #[inline]
    fn inw(&self, port: u16) -> u16 {
        (**self).inw(port)
    }

    #[inline]
    fn inl(&self, port: u16) -> u32 {
        (**self).inl(port)
    }

    #[inline]
    fn outb(&self, port: u16, val: u8) {
        (**self).outb(port, val)
    }

    #[inline]
    fn outw(&self, port: u16, val: u16) {
        (**self).outw(port, val)
    }

    #[inline]
    fn outl(&self, port: u16, val: u32) {
        (**self).outl(port, val)
    }
}

/// The processor's I/O port space, accessed with `in`/`out` instructions.
#[derive(Copy, Clone, Debug)]
pub struct X86PortIo(());

impl X86PortIo {
    /// Returns a handle to the I/O port space.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive ownership of every port accessed through
    /// this handle for as long as it is in use. In particular, configuration
    /// space accesses are two-step (address latch, then data) and must not be
    /// interleaved with another user of ports `0xCF8`-`0xCFF`.
    pub const unsafe fn new() -> Self {
        Self(())
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
impl PortIo for X86PortIo {
    #[inline]
    fn inb(&self, port: u16) -> u8 {
        let ret: u8;
        unsafe {
            asm!("in al, dx", out("al") ret, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        ret
    }

    #[inline]
    fn inw(&self, port: u16) -> u16 {
        let ret: u16;
        unsafe {
            asm!("in ax, dx", out("ax") ret, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        ret
    }

    #[inline]
    fn inl(&self, port: u16) -> u32 {
        let ret: u32;
        unsafe {
            asm!("in eax, dx", out("eax") ret, in("dx") port, options(nomem, nostack, preserves_flags));
        }
        ret
    }

    #[inline]
    fn outb(&self, port: u16, val: u8) {
        unsafe {
            asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    fn outw(&self, port: u16, val: u16) {
        unsafe {
            asm!("out dx, ax", in("dx") port, in("ax") val, options(nomem, nostack, preserves_flags));
        }
    }

    #[inline]
    fn outl(&self, port: u16, val: u32) {
        unsafe {
            asm!("out dx, eax", in("dx") port, in("eax") val, options(nomem, nostack, preserves_flags));
        }
    }
}

//For CI only

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
impl PortIo for X86PortIo {
    fn inb(&self, _port: u16) -> u8 {
        unimplemented!()
    }

    fn inw(&self, _port: u16) -> u16 {
        unimplemented!()
    }

    fn inl(&self, _port: u16) -> u32 {
        unimplemented!()
    }

    fn outb(&self, _port: u16, _val: u8) {
        unimplemented!()
    }

    fn outw(&self, _port: u16, _val: u16) {
        unimplemented!()
    }

    fn outl(&self, _port: u16, _val: u32) {
        unimplemented!()
    }
}
