//! Machine access for the kernel monitor.
//!
//! `abyss` is where the monitor meets the hardware: the direct-map address
//! model, the COM1 console and the log built on it, the frame-pointer walker,
//! and the few x86_64 registers and instructions the monitor needs. What the
//! commands print is decided in [`kmon`].
//!
//! [`kmon`]: ../kmon/index.html
#![no_std]
#![allow(clippy::missing_safety_doc)]

#[cfg(test)]
extern crate std;

use core::sync::atomic::AtomicBool;

#[macro_use]
pub mod kprint;
pub mod addressing;
pub mod dev;
pub mod interrupt;
pub mod spinlock;
pub mod unwind;
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

/// When set, `info!`, `warning!` and `debug!` print nothing.
#[doc(hidden)]
pub static QUITE: AtomicBool = AtomicBool::new(false);
