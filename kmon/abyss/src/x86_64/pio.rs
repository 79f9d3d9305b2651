//! Port-mapped I/O.

use core::arch::asm;

/// An I/O port.
#[derive(Clone, Copy)]
pub struct Pio {
    port: u16,
}

impl Pio {
    /// Create a handle for `port`.
    pub const fn new(port: u16) -> Self {
        Self { port }
    }

    /// Read a byte from the port.
    #[inline]
    pub fn read_u8(&self) -> u8 {
        let value: u8;
        unsafe {
            asm!("in al, dx", out("al") value, in("dx") self.port, options(nomem, nostack, preserves_flags));
        }
        value
    }

    /// Write a byte to the port.
    #[inline]
    pub fn write_u8(&self, value: u8) {
        unsafe {
            asm!("out dx, al", in("dx") self.port, in("al") value, options(nomem, nostack, preserves_flags));
        }
    }
}
