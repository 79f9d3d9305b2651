//! Debug-symbol lookup for code addresses.
//!
//! A [`SymbolResolver`] maps an instruction address to the source position
//! and the function that contains it. Every field of the result is optional,
//! and the backtrace prints `?` for whatever is missing.
//!
//! Three resolvers are provided:
//! - [`NoSymbols`], which knows nothing.
//! - [`SymbolTable`], a sorted list of function ranges.
//! - [`DwarfResolver`] (feature `dwarf`), which reads the line tables and the
//!   symbol table of an ELF image.
use alloc::{string::String, vec::Vec};

/// What is known about the code at one address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DebugSymbol {
    /// Source file name.
    pub file: Option<String>,
    /// Source line number.
    pub line: Option<u32>,
    /// Name of the enclosing function.
    pub function: Option<String>,
    /// Start address of the enclosing function.
    pub function_addr: Option<usize>,
}

impl DebugSymbol {
    /// Distance of `pc` from the start of the enclosing function.
    pub fn offset(&self, pc: usize) -> Option<usize> {
        self.function_addr.and_then(|start| pc.checked_sub(start))
    }
}

/// Maps code addresses to debug symbols.
pub trait SymbolResolver {
    /// Looks up `pc`. Unknown fields are left as `None`.
    fn resolve(&self, pc: usize) -> DebugSymbol;
}

/// A resolver without any debug information.
pub struct NoSymbols;

impl SymbolResolver for NoSymbols {
    fn resolve(&self, _pc: usize) -> DebugSymbol {
        DebugSymbol::default()
    }
}

/// A function and the address range it occupies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    /// First address of the function.
    pub start: usize,
    /// Size in bytes; 0 if unknown, in which case the function extends up to
    /// the next entry.
    pub size: usize,
    /// Function name.
    pub name: String,
    /// Source file the function is defined in, if known.
    pub file: Option<String>,
}

impl SymbolEntry {
    fn contains(&self, pc: usize) -> bool {
        pc >= self.start && (self.size == 0 || pc - self.start < self.size)
    }
}

/// Function ranges sorted by start address.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function occupying `start..start + size`.
    pub fn insert(&mut self, start: usize, size: usize, name: impl Into<String>) -> &mut SymbolEntry {
        let at = self.entries.partition_point(|e| e.start <= start);
        self.entries.insert(
            at,
            SymbolEntry {
                start,
                size,
                name: name.into(),
                file: None,
            },
        );
        &mut self.entries[at]
    }

    /// The entry whose range contains `pc`.
    pub fn lookup(&self, pc: usize) -> Option<&SymbolEntry> {
        let at = self.entries.partition_point(|e| e.start <= pc);
        self.entries[..at].last().filter(|e| e.contains(pc))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, pc: usize) -> DebugSymbol {
        match self.lookup(pc) {
            Some(entry) => DebugSymbol {
                file: entry.file.clone(),
                line: None,
                function: Some(entry.name.clone()),
                function_addr: Some(entry.start),
            },
            None => DebugSymbol::default(),
        }
    }
}

#[cfg(feature = "dwarf")]
pub use dwarf::{DwarfResolver, SymbolError};

#[cfg(feature = "dwarf")]
mod dwarf {
    use super::{DebugSymbol, SymbolResolver, SymbolTable};
    use addr2line::Context;
    use alloc::{borrow::Cow, string::ToString, sync::Arc};

    type Reader = gimli::EndianArcSlice<gimli::LittleEndian>;

    /// Failure to load debug information from an image.
    #[derive(Debug)]
    pub enum SymbolError {
        /// The image is not a parsable object file.
        Object(object::Error),
        /// The DWARF sections are malformed.
        Dwarf(gimli::Error),
    }

    impl core::fmt::Display for SymbolError {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            match self {
                Self::Object(e) => write!(f, "bad object file: {e}"),
                Self::Dwarf(e) => write!(f, "bad debug information: {e}"),
            }
        }
    }

    /// Resolves addresses with the DWARF line tables and the symbol table of
    /// an ELF image.
    pub struct DwarfResolver {
        context: Context<Reader>,
        functions: SymbolTable,
    }

    impl DwarfResolver {
        /// Loads the debug information of the ELF `image`.
        pub fn from_elf(image: &[u8]) -> Result<Self, SymbolError> {
            use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

            let kernel = object::File::parse(image).map_err(SymbolError::Object)?;
            let dwarf = gimli::Dwarf::load(|id| -> Result<_, gimli::Error> {
                let data = kernel
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(Cow::Borrowed(&[]));
                let data: Arc<[u8]> = Arc::from(data.as_ref());
                Ok(gimli::EndianArcSlice::new(data, gimli::LittleEndian))
            })
            .map_err(SymbolError::Dwarf)?;
            let context = Context::from_dwarf(dwarf).map_err(SymbolError::Dwarf)?;

            let mut functions = SymbolTable::new();
            for symbol in kernel.symbols().filter(|s| s.kind() == SymbolKind::Text) {
                if let Ok(name) = symbol.name() {
                    let name = addr2line::demangle_auto(Cow::Borrowed(name), None);
                    functions.insert(symbol.address() as usize, symbol.size() as usize, name);
                }
            }
            Ok(Self { context, functions })
        }

        /// The function table read from the image.
        pub fn functions(&self) -> &SymbolTable {
            &self.functions
        }
    }

    impl SymbolResolver for DwarfResolver {
        fn resolve(&self, pc: usize) -> DebugSymbol {
            let mut symbol = self.functions.resolve(pc);
            if let Ok(Some(location)) = self.context.find_location(pc as u64) {
                symbol.file = location.file.map(|f| f.to_string()).or(symbol.file);
                symbol.line = location.line;
            }
            // The innermost frame names the function the instruction was
            // inlined into last, which is what the source line belongs to.
            if let Ok(mut frames) = self.context.find_frames(pc as u64)
                && let Ok(Some(frame)) = frames.next()
                && let Some(Ok(name)) = frame.function.as_ref().map(|n| n.demangle())
            {
                symbol.function = Some(name.into_owned());
            }
            symbol
        }
    }
}
