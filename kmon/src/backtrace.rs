//! Printing a stack backtrace.
//!
//! ```text
//! Stack backtrace:
//!   rbp ffffff8000ffdf30  rip ffffff80000410b2  args 0000000000000001 ...
//!          kern/monitor.rs:212: kmon::monitor::Monitor::run+412
//! ```
use crate::{MonitorError, symbols::SymbolResolver};
use abyss::unwind::{
    ActivationRecord, FramePointerUnwinder, Peeker, StackFrame, UnwindError,
};
use core::{fmt::Write, ops::Range};

/// Printed in place of an argument word that could not be read.
const UNKNOWN_WORD: &str = "????????????????";

/// Prints the first line of an activation record.
pub struct FrameLine<'a>(pub &'a ActivationRecord);

impl core::fmt::Display for FrameLine<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "  rbp {:016x}  rip {:016x}  args", self.0.fp, self.0.ret)?;
        for arg in self.0.args.iter() {
            match arg {
                Some(v) => write!(f, " {v:016x}")?,
                None => write!(f, " {UNKNOWN_WORD}")?,
            }
        }
        Ok(())
    }
}

/// Prints the source position of a return address.
pub struct SymbolLine<'a> {
    /// The resolved symbol.
    pub symbol: &'a crate::symbols::DebugSymbol,
    /// The return address the symbol was resolved for.
    pub ret: usize,
}

impl core::fmt::Display for SymbolLine<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let symbol = self.symbol;
        write!(f, "         {}:", symbol.file.as_deref().unwrap_or("?"))?;
        match symbol.line {
            Some(line) => write!(f, "{line}: ")?,
            None => write!(f, "?: ")?,
        }
        write!(f, "{}+", symbol.function.as_deref().unwrap_or("?"))?;
        match symbol.offset(self.ret) {
            Some(ofs) => write!(f, "{ofs}"),
            None => write!(f, "?"),
        }
    }
}

/// Walks the frame-pointer chain from `frame` and prints every activation
/// record, innermost first.
///
/// Each return address is looked up one byte before the address itself, so
/// that a call that ends a function resolves to the caller's line. The printed
/// offset is still taken from the return address.
///
/// Returns the number of frames printed and the error that stopped the walk,
/// if any.
pub fn print_backtrace(
    frame: StackFrame,
    stack: Option<Range<usize>>,
    memory: &dyn Peeker,
    symbols: &dyn SymbolResolver,
    out: &mut dyn Write,
) -> Result<(usize, Option<UnwindError>), MonitorError> {
    writeln!(out, "Stack backtrace:")?;
    let mut unwinder = FramePointerUnwinder::new(frame, memory);
    if let Some(stack) = stack {
        unwinder = unwinder.with_stack_bounds(stack);
    }
    let mut depth = 0;
    for record in unwinder {
        match record {
            Ok(record) => {
                let symbol = symbols.resolve(record.ret.saturating_sub(1));
                writeln!(out, "{}", FrameLine(&record))?;
                writeln!(
                    out,
                    "{}",
                    SymbolLine {
                        symbol: &symbol,
                        ret: record.ret,
                    }
                )?;
                depth += 1;
            }
            Err(e) => {
                writeln!(out, "** Backtrace stopped: {e}")?;
                return Ok((depth, Some(e)));
            }
        }
    }
    Ok((depth, None))
}
