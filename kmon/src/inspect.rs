//! Inspection and editing of the address space.
//!
//! Every operation looks up the page an address belongs to before touching
//! it. An unmapped page turns into a diagnostic line; memory behind it is
//! never read.
use crate::{
    MonitorError,
    mm::{PageTableWalk, PermMode, Pte, PteFlags, PtePerm},
};
use abyss::{
    addressing::{Kva, PAGE_MASK, PAGE_SIZE, Pa, VA_TO_PA_OFF, Va},
    unwind::{Peeker, WORD},
};
use core::fmt::Write;

/// Which address space a `dump` range is given in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSpace {
    /// Physical addresses, read through the direct map.
    Physical,
    /// Virtual addresses of the active page table.
    Virtual,
}

impl AddressSpace {
    /// Parses `P`/`p` or `V`/`v` (or any word starting with them).
    pub fn parse(s: &str) -> Option<Self> {
        match s.chars().next()?.to_ascii_uppercase() {
            'P' => Some(AddressSpace::Physical),
            'V' => Some(AddressSpace::Virtual),
            _ => None,
        }
    }
}

/// Prints the three editable permission bits as `0` or `1`.
pub struct Perms(pub PteFlags);

impl core::fmt::Display for Perms {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let bit = |flag| self.0.contains(flag) as u8;
        write!(
            f,
            "PTE_P {}, PTE_W {}, PTE_U {}",
            bit(PteFlags::P),
            bit(PteFlags::RW),
            bit(PteFlags::US)
        )
    }
}

/// The present leaf entry governing `addr` and the physical address `addr`
/// maps to, if any.
fn translate(pt: &dyn PageTableWalk, addr: usize) -> Option<(&Pte, Pa)> {
    let va = Va::new(addr)?;
    let (pte, size) = pt.walk_sized(va).ok()?;
    Some((pte, pte.translate(va, size)?))
}

/// Prints the translation of every page from the one containing `start` up
/// to the one containing `end`.
///
/// Returns the number of pages that were mapped.
pub fn show_mappings(
    pt: &dyn PageTableWalk,
    start: usize,
    end: usize,
    out: &mut dyn Write,
) -> Result<usize, MonitorError> {
    let mut mapped = 0;
    let mut page = start & !PAGE_MASK;
    while page <= end {
        match translate(pt, page) {
            Some((pte, pa)) => {
                writeln!(
                    out,
                    "VA 0x{:x}, PA 0x{:x}, {}",
                    page,
                    pa.into_usize(),
                    Perms(pte.flags())
                )?;
                mapped += 1;
            }
            None => writeln!(out, "Page 0x{page:x} has no mapping!")?,
        }
        page = match page.checked_add(PAGE_SIZE) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(mapped)
}

/// Flags of one entry before and after [`set_perm`] changed it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermChange {
    /// Flags before the change.
    pub before: PteFlags,
    /// Flags after the change.
    pub after: PteFlags,
}

/// Applies `mode` to the `perm` bit of the entry that maps `va`.
///
/// Returns `None` without changing anything if `va` is unmapped.
pub fn set_perm(
    pt: &mut dyn PageTableWalk,
    va: Va,
    mode: PermMode,
    perm: PtePerm,
    out: &mut dyn Write,
) -> Result<Option<PermChange>, MonitorError> {
    let pte = match pt.walk_mut(va) {
        Ok(pte) if pte.is_present() => pte,
        _ => {
            writeln!(out, "Page 0x{:x} has no mapping!", va.into_usize())?;
            return Ok(None);
        }
    };
    let before = pte.flags();
    writeln!(out, "BEFORE: {}", Perms(before))?;
    let after = pte.update(mode, perm);
    pt.invalidate(va);
    writeln!(out, "AFTER: {}", Perms(after))?;
    Ok(Some(PermChange { before, after }))
}

/// Reads the word at `addr` once every page it spans is known to be mapped.
fn read_word(pt: &dyn PageTableWalk, memory: &dyn Peeker, addr: usize) -> Option<usize> {
    let last = addr.checked_add(WORD - 1)?;
    let mut page = addr & !PAGE_MASK;
    while page <= last {
        translate(pt, page)?;
        page = page.checked_add(PAGE_SIZE)?;
    }
    memory.read_usize(addr)
}

fn to_kernel_alias(pa: usize) -> Result<usize, MonitorError> {
    Pa::new(pa)
        .and_then(Pa::checked_into_kva)
        .map(Kva::into_usize)
        .ok_or(MonitorError::NotDirectMapped(pa))
}

/// Prints the word at every byte address from `start` to `end`.
///
/// Physical bounds are read through their direct-map aliases and reported as
/// physical addresses. Returns the number of words that could be read.
pub fn dump(
    pt: &dyn PageTableWalk,
    memory: &dyn Peeker,
    space: AddressSpace,
    start: usize,
    end: usize,
    out: &mut dyn Write,
) -> Result<usize, MonitorError> {
    let (mut addr, end) = match space {
        AddressSpace::Virtual => (start, end),
        AddressSpace::Physical => (to_kernel_alias(start)?, to_kernel_alias(end)?),
    };
    let mut read = 0;
    while addr <= end {
        let shown = match space {
            AddressSpace::Virtual => addr,
            AddressSpace::Physical => addr - VA_TO_PA_OFF,
        };
        match read_word(pt, memory, addr) {
            Some(value) => {
                writeln!(out, "0x{shown:x}: 0x{value:x}")?;
                read += 1;
            }
            None => writeln!(out, "0x{shown:x}: Bad address")?,
        }
        addr = match addr.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(read)
}
