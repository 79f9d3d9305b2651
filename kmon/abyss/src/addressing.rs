//! Addresses as the monitor sees them.
//!
//! The kernel keeps all of physical memory mapped at [`VA_TO_PA_OFF`]: the
//! byte at physical address `pa` is readable at `pa + VA_TO_PA_OFF`. That
//! window is the *direct map*, and it is how the monitor reaches page-table
//! frames and serves physical `dump` requests.
//!
//! - [`Pa`]: a physical address.
//! - [`Kva`]: a kernel virtual address in the upper half.
//! - [`Va`]: any canonical virtual address.
//!
//! Conversions between [`Pa`] and [`Kva`] are checked against the size of
//! the direct map, because the addresses come from an operator.
//!
//! ```
//! use abyss::addressing::{Kva, Pa};
//!
//! let kva = Pa::new(0x1234_5000).unwrap().checked_into_kva().unwrap();
//! assert_eq!(kva.into_usize(), 0xffff_ff00_1234_5000);
//! assert_eq!(kva.checked_into_pa(), Pa::new(0x1234_5000));
//! assert_eq!(Kva::new(0x1000), None);
//! ```

/// Start of the direct map; physical address 0 appears here.
pub const VA_TO_PA_OFF: usize = 0xffff_ff00_0000_0000;

/// Bytes of physical memory covered by the direct map (one PML4 slot).
pub const DIRECT_MAP_SIZE: usize = 1 << 39;

/// Size of a base page.
pub const PAGE_SIZE: usize = 0x1000;

/// Bits of an address that select a byte within its page.
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

const HIGH_HALF: usize = 0xffff_8000_0000_0000;

macro_rules! address {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            /// The address as a plain integer.
            #[inline]
            pub const fn into_usize(self) -> usize {
                self.0
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($name), "(0x{:x})"), self.0)
            }
        }
    };
}

address! {
    /// A physical address.
    ///
    /// Never dereferenced as is; see [`Pa::checked_into_kva`].
    Pa
}

address! {
    /// A kernel virtual address, i.e. a canonical upper-half address.
    Kva
}

address! {
    /// A canonical virtual address.
    Va
}

impl Pa {
    /// `None` if `addr` has any of the top 16 bits set.
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        if addr >> 48 == 0 { Some(Self(addr)) } else { None }
    }

    /// The alias of this address in the direct map, if it is covered.
    #[inline]
    pub const fn checked_into_kva(self) -> Option<Kva> {
        if self.0 < DIRECT_MAP_SIZE {
            Some(Kva(self.0 + VA_TO_PA_OFF))
        } else {
            None
        }
    }
}

impl Kva {
    /// `None` unless `addr` is a canonical upper-half address.
    ///
    /// ```
    /// use abyss::addressing::Kva;
    ///
    /// assert!(Kva::new(0xffff_8000_0000_0000).is_some());
    /// assert!(Kva::new(0x0000_7fff_ffff_f000).is_none());
    /// ```
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        if addr & HIGH_HALF == HIGH_HALF { Some(Self(addr)) } else { None }
    }

    /// The physical address this alias stands for, if it lies in the
    /// direct map. The kernel image is mapped above the direct map, so its
    /// addresses yield `None`.
    #[inline]
    pub const fn checked_into_pa(self) -> Option<Pa> {
        match self.0.checked_sub(VA_TO_PA_OFF) {
            Some(pa) if pa < DIRECT_MAP_SIZE => Some(Pa(pa)),
            _ => None,
        }
    }
}

impl Va {
    /// `None` unless bits 47 through 63 of `addr` are all equal.
    #[inline]
    pub const fn new(addr: usize) -> Option<Self> {
        match addr & HIGH_HALF {
            0 | HIGH_HALF => Some(Self(addr)),
            _ => None,
        }
    }

    /// The first address of the page containing this one.
    #[inline]
    pub const fn page_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }
}
