//! x86_64 registers and instructions used by the monitor.

pub mod pio;

use core::arch::asm;

/// The CR3 register, holding the physical address of the active page-table
/// root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Cr3(pub u64);

impl Cr3 {
    /// Reads the current CR3.
    #[inline]
    pub fn current() -> Self {
        let cr3: u64;
        unsafe {
            asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self(cr3)
    }

    /// Physical address of the page-table root, without the PCID/flag bits.
    #[inline]
    pub const fn into_usize(self) -> usize {
        (self.0 & !0xfff) as usize
    }
}

/// Reads the frame pointer (`rbp`) of the calling function.
#[inline(always)]
pub fn read_rbp() -> usize {
    let rbp: usize;
    unsafe {
        asm!("mov {}, rbp", out(reg) rbp, options(nomem, nostack, preserves_flags));
    }
    rbp
}

/// Reads the stack pointer (`rsp`).
#[inline(always)]
pub fn read_rsp() -> usize {
    let rsp: usize;
    unsafe {
        asm!("mov {}, rsp", out(reg) rsp, options(nomem, nostack, preserves_flags));
    }
    rsp
}

/// Invalidates the TLB entry of the page containing `va`.
///
/// # Safety
/// Must run at CPL 0.
#[inline]
pub unsafe fn invlpg(va: usize) {
    unsafe {
        asm!("invlpg [{0}]", in(reg) va, options(nostack));
    }
}
