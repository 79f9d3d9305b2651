//! The built-in monitor commands.
//!
//! Wrong argument counts print the usage of the command. Arguments that do
//! not parse print a one-line diagnostic. Both leave the monitor running.
use crate::{
    Env, MonitorError,
    backtrace::print_backtrace,
    inspect::{self, AddressSpace},
    mm::{PermMode, PtePerm},
    monitor::{Command, Context},
};
use abyss::{addressing::Va, unwind::StackFrame};
use alloc::string::ToString;
use core::fmt::Write;

/// Parses a number the way `strtol(s, NULL, 0)` does: `0x` prefix for
/// hexadecimal, a leading `0` for octal, decimal otherwise.
pub fn parse_number(s: &str) -> Result<usize, MonitorError> {
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    if digits.starts_with(['+', '-']) {
        return Err(MonitorError::InvalidNumber(s.to_string()));
    }
    usize::from_str_radix(digits, radix).map_err(|_| MonitorError::InvalidNumber(s.to_string()))
}

/// Prints the diagnostic for a failed command and returns the status that
/// keeps the monitor running.
fn finish(out: &mut dyn Write, result: Result<(), MonitorError>) -> isize {
    match result {
        Ok(()) | Err(MonitorError::Console) => 0,
        Err(e) => {
            let _ = writeln!(out, "{e}");
            0
        }
    }
}

/// `help`: lists every command.
pub struct Help;

impl Command for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn description(&self) -> &'static str {
        "Display this list of commands"
    }

    fn invoke(&self, _args: &[&str], cx: &mut Context<'_, '_>) -> isize {
        let result = cx.commands.iter().try_for_each(|command| {
            writeln!(cx.out, "{} - {}", command.name(), command.description())
        });
        finish(cx.out, result.map_err(Into::into))
    }
}

/// `kerninfo`: prints where the kernel image lives.
pub struct KernInfo;

impl Command for KernInfo {
    fn name(&self) -> &'static str {
        "kerninfo"
    }

    fn description(&self) -> &'static str {
        "Display information about the kernel"
    }

    fn invoke(&self, _args: &[&str], cx: &mut Context<'_, '_>) -> isize {
        let result = kerninfo(cx.env, cx.out);
        finish(cx.out, result)
    }
}

fn kerninfo(env: &Env<'_>, out: &mut dyn Write) -> Result<(), MonitorError> {
    let Some(layout) = env.layout else {
        writeln!(out, "Kernel layout is unknown")?;
        return Ok(());
    };
    writeln!(out, "Special kernel symbols:")?;
    writeln!(out, "  _start                  {:016x} (phys)", layout.start)?;
    for (name, va) in [
        ("entry", layout.entry),
        ("etext", layout.etext),
        ("edata", layout.edata),
        ("end", layout.end),
    ] {
        write!(out, "  {name:<6} {va:016x} (virt)  ")?;
        match layout.phys(va) {
            Some(pa) => writeln!(out, "{pa:016x} (phys)")?,
            None => writeln!(out, "{:>16} (phys)", "?")?,
        }
    }
    writeln!(
        out,
        "Kernel executable memory footprint: {}KB",
        layout.footprint_kb()
    )?;
    Ok(())
}

/// `backtrace`: prints the chain of callers.
pub struct Backtrace;

#[cfg(target_arch = "x86_64")]
#[inline(always)]
fn current_frame() -> StackFrame {
    StackFrame::current()
}

#[cfg(not(target_arch = "x86_64"))]
fn current_frame() -> StackFrame {
    StackFrame::new(0)
}

impl Command for Backtrace {
    fn name(&self) -> &'static str {
        "backtrace"
    }

    fn description(&self) -> &'static str {
        "Display a listing of function call frames"
    }

    fn invoke(&self, _args: &[&str], cx: &mut Context<'_, '_>) -> isize {
        let env = &*cx.env;
        let frame = match env.frame {
            Some(frame) => frame,
            None => current_frame(),
        };
        let result = print_backtrace(frame, env.stack.clone(), env.memory, env.symbols, cx.out);
        finish(cx.out, result.map(|_| ()))
    }
}

/// `showmappings <start> <end>`: prints the translation of a range of pages.
pub struct ShowMappings;

impl Command for ShowMappings {
    fn name(&self) -> &'static str {
        "showmappings"
    }

    fn description(&self) -> &'static str {
        "Display all of the physical page mappings"
    }

    fn invoke(&self, args: &[&str], cx: &mut Context<'_, '_>) -> isize {
        let [_, start, end] = args else {
            let _ = writeln!(cx.out, "Usage: showmappings <start_va> <end_va>");
            return 0;
        };
        let result = (|| {
            let (start, end) = (parse_number(start)?, parse_number(end)?);
            inspect::show_mappings(&*cx.env.page_table, start, end, cx.out).map(|_| ())
        })();
        finish(cx.out, result)
    }
}

/// `setperm <va> <mode> <perm>`: edits one permission bit of a mapping.
pub struct SetPerm;

impl Command for SetPerm {
    fn name(&self) -> &'static str {
        "setperm"
    }

    fn description(&self) -> &'static str {
        "Explicitly set, clear, or change the permissions of any mapping in the current address space"
    }

    fn invoke(&self, args: &[&str], cx: &mut Context<'_, '_>) -> isize {
        let [_, va, mode, perm] = args else {
            let _ = writeln!(cx.out, "Usage: setperm <va> <mode> <perm>");
            let _ = writeln!(cx.out, "\tmode = 0 (clear), 1 (set), 2 (toggle)");
            let _ = writeln!(cx.out, "\tperm = P, W, U");
            return 0;
        };
        let result = (|| {
            let addr = parse_number(va)?;
            let va = Va::new(addr).ok_or(MonitorError::NonCanonical(addr))?;
            let mode =
                PermMode::parse(mode).ok_or_else(|| MonitorError::InvalidMode(mode.to_string()))?;
            let perm = PtePerm::parse(perm)
                .ok_or_else(|| MonitorError::InvalidPermission(perm.to_string()))?;
            inspect::set_perm(&mut *cx.env.page_table, va, mode, perm, cx.out).map(|_| ())
        })();
        finish(cx.out, result)
    }
}

/// `dump <P|V> <start> <end>`: prints memory contents.
pub struct Dump;

impl Command for Dump {
    fn name(&self) -> &'static str {
        "dump"
    }

    fn description(&self) -> &'static str {
        "Dump the contents of a range of memory"
    }

    fn invoke(&self, args: &[&str], cx: &mut Context<'_, '_>) -> isize {
        let [_, space, start, end] = args else {
            let _ = writeln!(cx.out, "Usage: dump <space> <start> <end>");
            let _ = writeln!(cx.out, "\tspace = P (physical), V (virtual)");
            return 0;
        };
        let result = (|| {
            let space = AddressSpace::parse(space)
                .ok_or_else(|| MonitorError::InvalidAddressSpace(space.to_string()))?;
            let (start, end) = (parse_number(start)?, parse_number(end)?);
            let env = &*cx.env;
            inspect::dump(&*env.page_table, env.memory, space, start, end, cx.out).map(|_| ())
        })();
        finish(cx.out, result)
    }
}

/// `exit`: leaves the monitor.
pub struct Exit;

impl Command for Exit {
    fn name(&self) -> &'static str {
        "exit"
    }

    fn description(&self) -> &'static str {
        "Leave the kernel monitor"
    }

    fn invoke(&self, _args: &[&str], _cx: &mut Context<'_, '_>) -> isize {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers() {
        assert_eq!(parse_number("0x1f"), Ok(0x1f));
        assert_eq!(parse_number("0XFF"), Ok(0xff));
        assert_eq!(parse_number("017"), Ok(0o17));
        assert_eq!(parse_number("0"), Ok(0));
        assert_eq!(parse_number("42"), Ok(42));
        assert_eq!(
            parse_number("0xffffff0000001000"),
            Ok(0xffff_ff00_0000_1000)
        );
        for bad in ["", "0x", "09", "12a", "-1", "0x+1"] {
            assert_eq!(
                parse_number(bad),
                Err(MonitorError::InvalidNumber(bad.to_string()))
            );
        }
    }
}
