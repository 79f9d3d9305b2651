//! Page-table entries, their permission bits, and the walk that finds them.
//!
//! The monitor reaches page tables through [`PageTableWalk`]: given a virtual
//! address it returns the leaf entry that governs it, and that entry may be
//! edited in place. [`PageTable`] implements the walk for the x86_64 4-level
//! layout over any [`PageTableFrames`], which decides how a table page at a
//! physical address is reached (the direct map in the kernel, a plain map in
//! tests).
use abyss::addressing::{PAGE_MASK, Pa, Va};
use num_enum::TryFromPrimitive;

bitflags::bitflags! {
    /// Flags for pte.
    ///
    /// Bits 12 through 51 hold the frame number and are not flags.
    pub struct PteFlags: usize {
        /// Present; the entry maps a page.
        const P = 1 << 0;
        /// Read/write; if 0, writes are not allowed to the page.
        const RW = 1 << 1;
        /// User/supervisor; if 0, user-mode accesses are not allowed.
        const US = 1 << 2;
        /// Page-level write-through.
        const PWT = 1 << 3;
        /// Page-level cache disable.
        const PCD = 1 << 4;
        /// Accessed.
        const A = 1 << 5;
        /// Dirty.
        const D = 1 << 6;
        /// Memory type of a 4-KByte page.
        const PAT = 1 << 7;
        /// Page size; in a page-directory or page-directory-pointer entry the
        /// entry maps a large page instead of referencing a table. Shares bit
        /// 7 with [`PteFlags::PAT`].
        const PS = 1 << 7;
        /// Global.
        const G = 1 << 8;
        #[doc(hidden)] const _IGN_9 = 1 << 9;
        #[doc(hidden)] const _IGN_10 = 1 << 10;
        #[doc(hidden)] const _IGN_11 = 1 << 11;
        #[doc(hidden)] const _IGN_52 = 1 << 52;
        #[doc(hidden)] const _IGN_53 = 1 << 53;
        #[doc(hidden)] const _IGN_54 = 1 << 54;
        #[doc(hidden)] const _IGN_55 = 1 << 55;
        #[doc(hidden)] const _IGN_56 = 1 << 56;
        #[doc(hidden)] const _IGN_57 = 1 << 57;
        #[doc(hidden)] const _IGN_58 = 1 << 58;
        /// Protection key bit 0.
        const PK_0 = 1 << 59;
        /// Protection key bit 1.
        const PK_1 = 1 << 60;
        /// Protection key bit 2.
        const PK_2 = 1 << 61;
        /// Protection key bit 3.
        const PK_3 = 1 << 62;
        /// Execute-disable.
        const XD = 1 << 63;
    }
}

/// One of the three permission bits the monitor can edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PtePerm {
    /// The present bit.
    Present,
    /// The writable bit.
    Writable,
    /// The user-accessible bit.
    User,
}

impl PtePerm {
    /// The bit this permission occupies in an entry.
    pub const fn flag(self) -> PteFlags {
        match self {
            PtePerm::Present => PteFlags::P,
            PtePerm::Writable => PteFlags::RW,
            PtePerm::User => PteFlags::US,
        }
    }

    /// Parses an operator-supplied flag name.
    ///
    /// Only the first character matters: `P`, `W`, or `U` in either case, so
    /// `present`, `writable` and `user` are accepted as well.
    pub fn parse(s: &str) -> Option<Self> {
        match s.chars().next()?.to_ascii_uppercase() {
            'P' => Some(PtePerm::Present),
            'W' => Some(PtePerm::Writable),
            'U' => Some(PtePerm::User),
            _ => None,
        }
    }
}

/// How [`Pte::update`] changes a permission bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum PermMode {
    /// Clear the bit.
    Clear = 0,
    /// Set the bit.
    Set = 1,
    /// Invert the bit.
    Toggle = 2,
}

impl PermMode {
    /// Parses an operator-supplied mode: `0`, `1`, `2`, or one of the words
    /// `clear`, `set`, `toggle` (also `change`).
    pub fn parse(s: &str) -> Option<Self> {
        if let [digit @ b'0'..=b'9'] = s.as_bytes() {
            return PermMode::try_from(digit - b'0').ok();
        }
        if s.eq_ignore_ascii_case("clear") {
            Some(PermMode::Clear)
        } else if s.eq_ignore_ascii_case("set") {
            Some(PermMode::Set)
        } else if s.eq_ignore_ascii_case("toggle") || s.eq_ignore_ascii_case("change") {
            Some(PermMode::Toggle)
        } else {
            None
        }
    }
}

/// Page Table Entry (PTE).
///
/// A leaf entry of the page table. At the page-directory and
/// page-directory-pointer levels the same layout describes a large page when
/// [`PteFlags::PS`] is set.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Pte(pub usize);

impl core::fmt::Debug for Pte {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pte({:016x}, {:?})", self.frame(), self.flags())
    }
}

impl Pte {
    /// Get the physical address pointed to by this entry, or `None` if the
    /// entry is not present.
    #[inline]
    pub const fn pa(&self) -> Option<Pa> {
        if self.flags().contains(PteFlags::P) {
            Pa::new(self.frame())
        } else {
            None
        }
    }

    /// The frame bits of the entry, regardless of the present bit.
    #[inline]
    pub const fn frame(&self) -> usize {
        self.0 & !PteFlags::all().bits()
    }

    /// Get the flags associated with this entry.
    #[inline]
    pub const fn flags(&self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    /// Whether the entry maps a page.
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.flags().contains(PteFlags::P)
    }

    /// Physical address `va` maps to through this entry, when the entry is a
    /// present leaf mapping a page of `size`.
    ///
    /// For large pages the low frame bits are not part of the address (bit
    /// 12 is `PAT` there), so the frame is masked to the page size.
    pub const fn translate(&self, va: Va, size: PageSize) -> Option<Pa> {
        if !self.is_present() {
            return None;
        }
        let mask = size.bytes() - 1;
        Pa::new((self.frame() & !mask) | (va.into_usize() & mask))
    }

    /// Applies `mode` to the bit of `perm` and returns the resulting flags.
    ///
    /// Only that bit changes. The frame bits and every other flag are kept,
    /// even when the present bit is cleared.
    pub fn update(&mut self, mode: PermMode, perm: PtePerm) -> PteFlags {
        let mut flags = self.flags();
        match mode {
            PermMode::Clear => flags.remove(perm.flag()),
            PermMode::Set => flags.insert(perm.flag()),
            PermMode::Toggle => flags.toggle(perm.flag()),
        }
        self.0 = (self.0 & !PteFlags::all().bits()) | flags.bits();
        flags
    }
}

/// Size of the page a leaf entry maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSize {
    /// A 4-KByte page, mapped by a page-table entry.
    Size4K,
    /// A 2-MByte page, mapped by a page-directory entry with `PS` set.
    Size2M,
    /// A 1-GByte page, mapped by a page-directory-pointer entry with `PS`
    /// set.
    Size1G,
}

impl PageSize {
    /// Size in bytes.
    pub const fn bytes(self) -> usize {
        match self {
            PageSize::Size4K => 1 << 12,
            PageSize::Size2M => 1 << 21,
            PageSize::Size1G => 1 << 30,
        }
    }
}

/// Error that occurs during page table walking.
#[derive(Debug, PartialEq, Eq)]
pub enum PageTableMappingError {
    /// Unaligned address.
    ///
    /// Index decomposition requires a page-aligned address.
    Unaligned,

    /// Not exist.
    ///
    /// Some table on the way to the leaf is not present or not reachable.
    NotExist,
}

/// Represents page table indices for a given virtual address (VA).
///
/// In the x86_64 architecture, virtual addresses are translated to physical
/// addresses using a 4-level paging hierarchy:
/// - PML4 (Page Map Level 4)
/// - PDPT (Page Directory Pointer Table)
/// - PD (Page Directory)
/// - PT (Page Table)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PtIndices {
    /// The virtual address (VA) associated with this page table index
    /// breakdown.
    pub va: Va,

    /// Page Map Level 4 Index (PML4EI).
    pub pml4ei: usize,

    /// Page Directory Pointer table Index (PDPTEI).
    pub pdptei: usize,

    /// Page Directory Index (PDEI).
    pub pdei: usize,

    /// Page Table Index (PTEI).
    pub ptei: usize,
}

impl PtIndices {
    /// Extracts page table indices from a given virtual address ([`Va`]).
    ///
    /// # Returns
    /// - `Ok(Self)`: If `va` is page-aligned (i.e., lower 12 bits are zero).
    /// - `Err(PageTableMappingError::Unaligned)`: If `va` is not page-aligned.
    pub fn from_va(va: Va) -> Result<Self, PageTableMappingError> {
        let addr = va.into_usize();
        if addr & PAGE_MASK == 0 {
            Ok(Self {
                va,
                pml4ei: (addr >> 39) & 0x1ff,
                pdptei: (addr >> 30) & 0x1ff,
                pdei: (addr >> 21) & 0x1ff,
                ptei: (addr >> 12) & 0x1ff,
            })
        } else {
            Err(PageTableMappingError::Unaligned)
        }
    }
}

/// Lookup and in-place modification of the entry that maps an address.
pub trait PageTableWalk {
    /// Returns the leaf entry governing `va`.
    ///
    /// The entry is returned even if its present bit is clear; callers decide
    /// what a non-present leaf means. `NotExist` is returned when no leaf can
    /// be reached.
    fn walk(&self, va: Va) -> Result<&Pte, PageTableMappingError> {
        self.walk_sized(va).map(|(pte, _)| pte)
    }

    /// Like [`PageTableWalk::walk`], also telling the size of the page the
    /// leaf maps.
    fn walk_sized(&self, va: Va) -> Result<(&Pte, PageSize), PageTableMappingError>;

    /// Mutable version of [`PageTableWalk::walk`].
    fn walk_mut(&mut self, va: Va) -> Result<&mut Pte, PageTableMappingError>;

    /// Drops any cached translation of `va` after its entry was modified.
    fn invalidate(&mut self, va: Va);
}

/// Access to the pages that hold page tables.
pub trait PageTableFrames {
    /// The table stored in the frame at `pa`.
    fn table(&self, pa: Pa) -> Option<&[Pte; 512]>;

    /// Mutable version of [`PageTableFrames::table`].
    fn table_mut(&mut self, pa: Pa) -> Option<&mut [Pte; 512]>;

    /// Flushes the translation of `va` cached by the processor.
    fn flush(&mut self, _va: Va) {}
}

/// A 4-level page table rooted at a physical address.
pub struct PageTable<F: PageTableFrames> {
    root: Pa,
    frames: F,
}

impl<F: PageTableFrames> PageTable<F> {
    /// Wraps the table whose PML4 lives at `root`.
    pub fn new(root: Pa, frames: F) -> Self {
        Self { root, frames }
    }

    /// Physical address of the PML4.
    pub fn root(&self) -> Pa {
        self.root
    }

    /// The frames backing this table.
    pub fn frames(&self) -> &F {
        &self.frames
    }

    /// Mutable access to the frames backing this table.
    pub fn frames_mut(&mut self) -> &mut F {
        &mut self.frames
    }

    /// Finds the table and the slot in it holding the leaf for `va`.
    fn locate(&self, va: Va) -> Result<(Pa, usize, PageSize), PageTableMappingError> {
        let indices = PtIndices::from_va(va.page_down())?;
        let mut table = self.root;
        for (depth, index) in [indices.pml4ei, indices.pdptei, indices.pdei]
            .into_iter()
            .enumerate()
        {
            let entry = self
                .frames
                .table(table)
                .ok_or(PageTableMappingError::NotExist)?[index];
            // 1-GByte and 2-MByte pages end the walk early.
            if depth > 0 && entry.is_present() && entry.flags().contains(PteFlags::PS) {
                let size = if depth == 1 {
                    PageSize::Size1G
                } else {
                    PageSize::Size2M
                };
                return Ok((table, index, size));
            }
            table = entry.pa().ok_or(PageTableMappingError::NotExist)?;
        }
        Ok((table, indices.ptei, PageSize::Size4K))
    }
}

impl<F: PageTableFrames> PageTableWalk for PageTable<F> {
    fn walk_sized(&self, va: Va) -> Result<(&Pte, PageSize), PageTableMappingError> {
        let (table, index, size) = self.locate(va)?;
        self.frames
            .table(table)
            .map(|t| (&t[index], size))
            .ok_or(PageTableMappingError::NotExist)
    }

    fn walk_mut(&mut self, va: Va) -> Result<&mut Pte, PageTableMappingError> {
        let (table, index, _) = self.locate(va)?;
        self.frames
            .table_mut(table)
            .map(|t| &mut t[index])
            .ok_or(PageTableMappingError::NotExist)
    }

    fn invalidate(&mut self, va: Va) {
        self.frames.flush(va.page_down())
    }
}
