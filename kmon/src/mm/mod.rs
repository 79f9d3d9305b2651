//! Memory management structures the monitor inspects.
//!
//! The monitor never allocates or frees page tables. It only looks up the
//! entry that governs an address and edits its permission bits in place.

pub mod page_table;

pub use page_table::{
    PageSize, PageTable, PageTableFrames, PageTableMappingError, PageTableWalk, PermMode, PtIndices,
    Pte, PteFlags, PtePerm,
};
