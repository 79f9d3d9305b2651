//! # kmon: an interactive kernel monitor
//!
//! The monitor is a tiny command shell the kernel drops into at boot or on a
//! trap. An operator types commands on the serial console and the monitor
//! answers with what it can see of the machine:
//!
//! - `backtrace` walks the frame-pointer chain and names every caller.
//! - `showmappings` prints the translation of each page in a range.
//! - `setperm` sets, clears, or toggles one permission bit of a mapping.
//! - `dump` prints memory words, addressed virtually or physically.
//! - `kerninfo` prints where the kernel image sits in memory.
//!
//! ## Layout
//!
//! The crate never touches the machine directly. Every command receives an
//! [`Env`] that bundles the capabilities it may use: a [`Peeker`] for memory,
//! a [`PageTableWalk`] for the active page table, and a [`SymbolResolver`]
//! for debug information. The `kernel` feature provides the implementations
//! backed by the running kernel (see `kernel`); tests provide fakes.
//!
//! - [`mm`]: page-table entries and the walk that finds them.
//! - [`symbols`]: address to source position lookup.
//! - [`backtrace`], [`inspect`]: what the commands print.
//! - [`monitor`], [`commands`]: the read-eval loop and the command table.
//! - [`teletype`]: line input from the console.
//!
//! [`Peeker`]: abyss::unwind::Peeker
//! [`PageTableWalk`]: mm::PageTableWalk
//! [`SymbolResolver`]: symbols::SymbolResolver
#![no_std]
#![warn(missing_docs)]

#[macro_use]
extern crate abyss;
extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod backtrace;
pub mod commands;
pub mod inspect;
#[cfg(feature = "kernel")]
pub mod kernel;
pub mod mm;
pub mod monitor;
pub mod symbols;
pub mod teletype;

pub use abyss::{addressing, debug, info, interrupt, print, println, unwind, warning};

use abyss::{
    addressing::{Kva, Pa},
    unwind::{Peeker, StackFrame},
};
use alloc::string::String;
use core::ops::Range;
use mm::PageTableWalk;
use symbols::SymbolResolver;

/// Size of a kernel stack. Stacks are aligned to their size, so the stack
/// containing an address is found by masking.
pub const STACK_SIZE: usize = 0x10_0000;

/// Capabilities the commands act through.
pub struct Env<'a> {
    /// Readable memory. Used for the stack and for `dump`.
    pub memory: &'a dyn Peeker,
    /// The active page table.
    pub page_table: &'a mut dyn PageTableWalk,
    /// Debug information for code addresses.
    pub symbols: &'a dyn SymbolResolver,
    /// Frame the backtrace starts from. `None` means the frame of the
    /// running `backtrace` command itself.
    pub frame: Option<StackFrame>,
    /// Bounds of the current stack, if known.
    pub stack: Option<Range<usize>>,
    /// Placement of the kernel image, if known.
    pub layout: Option<KernelLayout>,
}

/// Addresses of the linker-defined symbols that delimit the kernel image.
///
/// All fields are kernel virtual addresses except `start`, which is the
/// physical load address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelLayout {
    /// Physical address the image is loaded at.
    pub start: usize,
    /// Entry point.
    pub entry: usize,
    /// End of the code.
    pub etext: usize,
    /// End of the initialized data.
    pub edata: usize,
    /// End of the image.
    pub end: usize,
}

impl KernelLayout {
    /// Physical address of the kernel virtual address `va`, if `va` lies in
    /// the direct map. The image itself may be mapped elsewhere, so `va` is
    /// also tried as an offset from the entry point.
    pub fn phys(&self, va: usize) -> Option<usize> {
        if let Some(pa) = Kva::new(va).and_then(|kva| kva.checked_into_pa()) {
            return Some(pa.into_usize());
        }
        va.checked_sub(self.entry)
            .and_then(|ofs| self.start.checked_add(ofs))
            .and_then(Pa::new)
            .map(Pa::into_usize)
    }

    /// Memory footprint of the image in KiB, rounded up.
    pub fn footprint_kb(&self) -> usize {
        self.end.saturating_sub(self.entry).div_ceil(1024)
    }
}

/// Errors the commands report to the operator.
#[derive(Debug, PartialEq, Eq)]
pub enum MonitorError {
    /// An argument is not a number.
    InvalidNumber(String),
    /// An argument is not a permission mode.
    InvalidMode(String),
    /// An argument is not a permission flag.
    InvalidPermission(String),
    /// An argument is not an address-space tag.
    InvalidAddressSpace(String),
    /// An address is not canonical.
    NonCanonical(usize),
    /// A physical address is outside the direct map.
    NotDirectMapped(usize),
    /// Input could not be read from the console.
    Teletype,
    /// Output could not be written to the console.
    Console,
}

impl From<core::fmt::Error> for MonitorError {
    fn from(_: core::fmt::Error) -> Self {
        MonitorError::Console
    }
}

impl core::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidNumber(s) => write!(f, "Invalid number: {s}"),
            Self::InvalidMode(s) => write!(f, "Invalid mode: {s} (use 0/clear, 1/set, 2/toggle)"),
            Self::InvalidPermission(s) => write!(f, "Invalid permission: {s} (use P, W or U)"),
            Self::InvalidAddressSpace(s) => write!(f, "Invalid address space: {s} (use P or V)"),
            Self::NonCanonical(v) => write!(f, "Address 0x{v:x} is not canonical"),
            Self::NotDirectMapped(v) => {
                write!(f, "Physical address 0x{v:x} is outside the direct map")
            }
            Self::Teletype => write!(f, "Cannot read from the console"),
            Self::Console => write!(f, "Cannot write to the console"),
        }
    }
}
