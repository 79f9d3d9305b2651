mod common;

use common::{Ram, env, page_table, run};
use kmon::{
    symbols::{NoSymbols, SymbolTable},
    unwind::{StackFrame, WORD},
};

const BASE: usize = 0x7000_0000;
const FRAME: usize = 0x100;

/// Lays out `rets.len()` frames, innermost at `BASE`, each `FRAME` bytes
/// above the previous one. The outermost frame saves a zero frame pointer.
fn stack(rets: &[usize]) -> Ram {
    let mut ram = Ram::default();
    for (i, ret) in rets.iter().enumerate() {
        let fp = BASE + i * FRAME;
        let caller = if i + 1 == rets.len() { 0 } else { fp + FRAME };
        ram.write_word(fp, caller);
        ram.write_word(fp + WORD, *ret);
        for k in 0..5 {
            ram.write_word(fp + (2 + k) * WORD, 0x10 * i + k);
        }
    }
    ram
}

fn symbols() -> SymbolTable {
    let mut table = SymbolTable::new();
    table.insert(0x1000, 0x100, "kern::monitor::run").file = Some("kern/monitor.rs".into());
    table.insert(0x2000, 0x100, "kern::init").file = Some("kern/init.rs".into());
    table.insert(0x3000, 0x100, "kern::entry");
    table
}

#[test]
fn prints_every_frame() {
    let ram = stack(&[0x1010, 0x2020, 0x3030]);
    let mut pt = page_table();
    let symbols = symbols();
    let mut env = env(&ram, &mut pt, &symbols);
    env.frame = Some(StackFrame::new(BASE));

    let (status, out) = run(&mut env, "backtrace");
    assert_eq!(status, 0);
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(
        lines,
        [
            "Stack backtrace:",
            "  rbp 0000000070000000  rip 0000000000001010  args \
             0000000000000000 0000000000000001 0000000000000002 0000000000000003 \
             0000000000000004",
            "         kern/monitor.rs:?: kern::monitor::run+16",
            "  rbp 0000000070000100  rip 0000000000002020  args \
             0000000000000010 0000000000000011 0000000000000012 0000000000000013 \
             0000000000000014",
            "         kern/init.rs:?: kern::init+32",
            "  rbp 0000000070000200  rip 0000000000003030  args \
             0000000000000020 0000000000000021 0000000000000022 0000000000000023 \
             0000000000000024",
            "         ?:?: kern::entry+48",
        ]
    );
}

#[test]
fn depth_matches_chain_length() {
    for depth in [1, 2, 7] {
        let rets: Vec<_> = (0..depth).map(|i| 0x9000 + i).collect();
        let ram = stack(&rets);
        let mut pt = page_table();
        let mut env = env(&ram, &mut pt, &NoSymbols);
        env.frame = Some(StackFrame::new(BASE));
        let (_, out) = run(&mut env, "backtrace");
        assert_eq!(out.lines().filter(|l| l.starts_with("  rbp ")).count(), depth);
        assert_eq!(out.lines().filter(|l| *l == "         ?:?: ?+?").count(), depth);
        assert!(!out.contains("stopped"));
    }
}

#[test]
fn arguments_beyond_stack_are_unknown() {
    let ram = stack(&[0x1010, 0x2020, 0x3030]);
    let mut pt = page_table();
    let mut env = env(&ram, &mut pt, &NoSymbols);
    env.frame = Some(StackFrame::new(BASE));
    env.stack = Some(BASE..BASE + 2 * FRAME + 4 * WORD);

    let (_, out) = run(&mut env, "backtrace");
    let last = out.lines().filter(|l| l.starts_with("  rbp ")).next_back().unwrap();
    assert_eq!(
        last,
        "  rbp 0000000070000200  rip 0000000000003030  args \
         0000000000000020 0000000000000021 ???????????????? ???????????????? \
         ????????????????"
    );
}

#[test]
fn cyclic_chain_terminates() {
    let mut ram = stack(&[0x1010, 0x2020]);
    // The outer frame points back at the inner one.
    ram.write_word(BASE + FRAME, BASE);
    let mut pt = page_table();
    let mut env = env(&ram, &mut pt, &NoSymbols);
    env.frame = Some(StackFrame::new(BASE));

    let (status, out) = run(&mut env, "backtrace");
    assert_eq!(status, 0);
    assert_eq!(out.lines().filter(|l| l.starts_with("  rbp ")).count(), 2);
    assert_eq!(
        out.lines().last(),
        Some("** Backtrace stopped: saved frame pointer 0x70000000 does not lie above 0x70000100")
    );
}

#[test]
fn misaligned_frame_pointer_stops() {
    let mut ram = stack(&[0x1010, 0x2020]);
    ram.write_word(BASE, BASE + 3);
    let mut pt = page_table();
    let mut env = env(&ram, &mut pt, &NoSymbols);
    env.frame = Some(StackFrame::new(BASE));

    let (_, out) = run(&mut env, "backtrace");
    assert_eq!(out.lines().filter(|l| l.starts_with("  rbp ")).count(), 1);
    assert_eq!(
        out.lines().last(),
        Some("** Backtrace stopped: frame pointer 0x70000003 is misaligned")
    );
}

#[test]
fn zero_frame_pointer_prints_header_only() {
    let ram = Ram::default();
    let mut pt = page_table();
    let mut env = env(&ram, &mut pt, &NoSymbols);
    env.frame = Some(StackFrame::new(0));
    let (_, out) = run(&mut env, "backtrace");
    assert_eq!(out, "Stack backtrace:\n");
}

#[cfg(feature = "dwarf")]
#[test]
fn dwarf_resolver_rejects_non_elf() {
    assert!(kmon::symbols::DwarfResolver::from_elf(b"definitely not an object file").is_err());
}
