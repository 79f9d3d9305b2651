//! The trap frame the monitor is entered with.
//!
//! When the kernel drops into the monitor from an exception, the entry stub
//! has saved the general-purpose registers below the frame the CPU pushed.
//! [`Registers`] overlays that memory and prints it as a register dump.

/// General-purpose registers, in the order the entry stub pushes them.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[allow(missing_docs)]
pub struct GeneralPurposeRegisters {
    pub r15: usize,
    pub r14: usize,
    pub r13: usize,
    pub r12: usize,
    pub r11: usize,
    pub r10: usize,
    pub r9: usize,
    pub r8: usize,
    pub rsi: usize,
    pub rdi: usize,
    pub rbp: usize,
    pub rdx: usize,
    pub rcx: usize,
    pub rbx: usize,
    pub rax: usize,
}

/// What the CPU pushes on an exception, from `rip` up.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
#[allow(missing_docs)]
pub struct InterruptStackFrame {
    pub rip: usize,
    pub cs: usize,
    pub rflags: usize,
    pub rsp: usize,
    pub ss: usize,
}

/// A saved trap frame.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Registers {
    /// Saved by software.
    pub gprs: GeneralPurposeRegisters,
    /// Pushed by the CPU for some exceptions, 0 otherwise.
    pub error_code: u64,
    /// Pushed by the CPU.
    pub interrupt_stack_frame: InterruptStackFrame,
}

impl core::fmt::Debug for Registers {
    /// Four registers per line, then `rip`, the error code and the flags:
    ///
    /// ```text
    /// RAX: 0000000000000000 | RBX: 0000000000000000 | ...
    /// ```
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (g, i) = (&self.gprs, &self.interrupt_stack_frame);
        let rows: [[(&str, usize); 4]; 4] = [
            [("RAX", g.rax), ("RBX", g.rbx), ("RCX", g.rcx), ("RDX", g.rdx)],
            [("RSI", g.rsi), ("RDI", g.rdi), ("RBP", g.rbp), ("RSP", i.rsp)],
            [("R8 ", g.r8), ("R9 ", g.r9), ("R10", g.r10), ("R11", g.r11)],
            [("R12", g.r12), ("R13", g.r13), ("R14", g.r14), ("R15", g.r15)],
        ];
        for row in rows {
            for (n, (name, value)) in row.into_iter().enumerate() {
                let sep = if n == 0 { "" } else { " | " };
                write!(f, "{sep}{name}: {value:016x}")?;
            }
            writeln!(f)?;
        }
        writeln!(
            f,
            "RIP: {:016x} | Error Code: {:#x} | RFLAGS: {:016x}",
            i.rip, self.error_code, i.rflags
        )?;
        write!(f, "CS:  {:#x} | SS: {:#x}", i.cs, i.ss)
    }
}
