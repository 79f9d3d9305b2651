//! Bindings of the monitor to the running kernel.
//!
//! Everything here touches the machine: raw memory, CR3, the linker symbols
//! of the kernel image and the COM1 serial port.
use crate::{
    Env, KernelLayout, MonitorError, STACK_SIZE,
    mm::{PageTable, PageTableFrames, Pte},
    monitor::Monitor,
    symbols::SymbolResolver,
    teletype::Teletype,
};
use abyss::{
    addressing::{Pa, Va},
    dev::x86_64::serial::{self, Com1Sink},
    interrupt::Registers,
    unwind::Peeker,
    x86_64::{Cr3, invlpg, read_rsp},
};
use alloc::boxed::Box;
use core::fmt::Write;

/// Memory of the running kernel, read through raw pointers.
///
/// Reads are not validated; callers check the page table or the stack
/// bounds first.
pub struct KernelMemory;

impl Peeker for KernelMemory {
    fn peek(&self, addr: usize, buf: &mut [u8]) -> Option<()> {
        addr.checked_add(buf.len())?;
        unsafe {
            core::ptr::copy_nonoverlapping(addr as *const u8, buf.as_mut_ptr(), buf.len());
        }
        Some(())
    }
}

/// Page-table frames reached through the direct map.
pub struct DirectMap;

impl PageTableFrames for DirectMap {
    fn table(&self, pa: Pa) -> Option<&[Pte; 512]> {
        let kva = pa.checked_into_kva()?;
        unsafe { (kva.into_usize() as *const [Pte; 512]).as_ref() }
    }

    fn table_mut(&mut self, pa: Pa) -> Option<&mut [Pte; 512]> {
        let kva = pa.checked_into_kva()?;
        unsafe { (kva.into_usize() as *mut [Pte; 512]).as_mut() }
    }

    fn flush(&mut self, va: Va) {
        unsafe { invlpg(va.into_usize()) }
    }
}

/// The page table loaded in CR3.
pub type ActivePageTable = PageTable<DirectMap>;

/// Wraps the page table loaded in CR3.
pub fn active_page_table() -> Result<ActivePageTable, MonitorError> {
    let root = Cr3::current().into_usize();
    let root = Pa::new(root).ok_or(MonitorError::NotDirectMapped(root))?;
    Ok(PageTable::new(root, DirectMap))
}

impl KernelLayout {
    /// Reads the layout from the linker script symbols `_start`, `entry`,
    /// `etext`, `edata` and `end`.
    pub fn current() -> Self {
        unsafe extern "C" {
            static _start: u8;
            static entry: u8;
            static etext: u8;
            static edata: u8;
            static end: u8;
        }
        Self {
            start: &raw const _start as usize,
            entry: &raw const entry as usize,
            etext: &raw const etext as usize,
            edata: &raw const edata as usize,
            end: &raw const end as usize,
        }
    }
}

/// The COM1 serial console as a [`Teletype`].
#[derive(Default)]
pub struct Com1 {
    sink: Com1Sink,
}

impl Com1 {
    /// Creates a new COM1 teletype.
    pub const fn new() -> Self {
        Self {
            sink: Com1Sink::new(),
        }
    }
}

impl Write for Com1 {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.sink.write_str(s)
    }
}

impl Teletype for Com1 {
    fn read(&mut self, data: &mut [u8]) -> Result<usize, MonitorError> {
        serial::read_bytes_busywait(data).ok_or(MonitorError::Teletype)
    }
}

/// Sends the kernel log to COM1.
///
/// # Safety
/// Initializes the serial port; must not race with other users of COM1.
pub unsafe fn install_console() {
    unsafe {
        serial::init();
    }
    let _ = abyss::kprint::install_sink(Box::leak(Box::new(Com1Sink::new())));
}

/// Runs the monitor on COM1 against the running kernel.
///
/// `tf` is the trap frame when the monitor is entered from an exception.
/// Returns when the operator leaves the monitor.
pub fn enter(tf: Option<&Registers>, symbols: &dyn SymbolResolver) -> Result<(), MonitorError> {
    let mut page_table = active_page_table()?;
    let stack = read_rsp() & !(STACK_SIZE - 1);
    let mut env = Env {
        memory: &KernelMemory,
        page_table: &mut page_table,
        symbols,
        frame: None,
        stack: Some(stack..stack + STACK_SIZE),
        layout: Some(KernelLayout::current()),
    };
    info!("kmon: entering the monitor");
    Monitor::new().run(&mut Com1::new(), &mut env, tf)
}
