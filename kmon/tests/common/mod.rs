#![allow(dead_code)]
//! In-memory stand-ins for the machine.

use kmon::{
    Env,
    addressing::{Pa, Va},
    mm::{PageTable, PageTableFrames, PtIndices, Pte, PteFlags},
    monitor::Monitor,
    symbols::SymbolResolver,
    teletype::Teletype,
    unwind::Peeker,
    MonitorError,
};
use std::collections::{BTreeMap, VecDeque};

/// Physical address of the PML4 of every test page table.
pub const ROOT: usize = 0x1_0000;

#[derive(Default)]
pub struct Frames {
    pub tables: BTreeMap<usize, Box<[Pte; 512]>>,
    pub flushed: Vec<Va>,
    next: usize,
}

impl Frames {
    fn alloc(&mut self) -> usize {
        let pa = ROOT + 0x1000 * (self.next + 1);
        self.next += 1;
        self.tables.insert(pa, Box::new([Pte(0); 512]));
        pa
    }
}

impl PageTableFrames for Frames {
    fn table(&self, pa: Pa) -> Option<&[Pte; 512]> {
        self.tables.get(&pa.into_usize()).map(|t| &**t)
    }

    fn table_mut(&mut self, pa: Pa) -> Option<&mut [Pte; 512]> {
        self.tables.get_mut(&pa.into_usize()).map(|t| &mut **t)
    }

    fn flush(&mut self, va: Va) {
        self.flushed.push(va);
    }
}

pub type TestPageTable = PageTable<Frames>;

pub fn page_table() -> TestPageTable {
    let mut frames = Frames::default();
    frames.tables.insert(ROOT, Box::new([Pte(0); 512]));
    PageTable::new(Pa::new(ROOT).unwrap(), frames)
}

/// Maps the 4-KByte page at `va` to `pa`, creating the tables on the way.
pub fn map(pt: &mut TestPageTable, va: usize, pa: usize, flags: PteFlags) {
    let idx = PtIndices::from_va(Va::new(va).unwrap()).unwrap();
    let mut table = pt.root().into_usize();
    for index in [idx.pml4ei, idx.pdptei, idx.pdei] {
        let frames = pt.frames_mut();
        table = match frames.tables[&table][index].pa() {
            Some(next) => next.into_usize(),
            None => {
                let next = frames.alloc();
                let inner = PteFlags::P | PteFlags::RW | PteFlags::US;
                frames.tables.get_mut(&table).unwrap()[index] = Pte(next | inner.bits());
                next
            }
        };
    }
    pt.frames_mut().tables.get_mut(&table).unwrap()[idx.ptei] = Pte(pa | flags.bits());
}

/// Maps a 2-MByte page at `va` to `pa`.
pub fn map_large(pt: &mut TestPageTable, va: usize, pa: usize, flags: PteFlags) {
    let idx = PtIndices::from_va(Va::new(va).unwrap()).unwrap();
    let mut table = pt.root().into_usize();
    for index in [idx.pml4ei, idx.pdptei] {
        let frames = pt.frames_mut();
        table = match frames.tables[&table][index].pa() {
            Some(next) => next.into_usize(),
            None => {
                let next = frames.alloc();
                frames.tables.get_mut(&table).unwrap()[index] =
                    Pte(next | (PteFlags::P | PteFlags::RW).bits());
                next
            }
        };
    }
    pt.frames_mut().tables.get_mut(&table).unwrap()[idx.pdei] =
        Pte(pa | (flags | PteFlags::PS).bits());
}

/// Maps a 1-GByte page at `va` to `pa`.
pub fn map_huge(pt: &mut TestPageTable, va: usize, pa: usize, flags: PteFlags) {
    let idx = PtIndices::from_va(Va::new(va).unwrap()).unwrap();
    let root = pt.root().into_usize();
    let frames = pt.frames_mut();
    let pdpt = match frames.tables[&root][idx.pml4ei].pa() {
        Some(next) => next.into_usize(),
        None => {
            let next = frames.alloc();
            frames.tables.get_mut(&root).unwrap()[idx.pml4ei] =
                Pte(next | (PteFlags::P | PteFlags::RW).bits());
            next
        }
    };
    frames.tables.get_mut(&pdpt).unwrap()[idx.pdptei] = Pte(pa | (flags | PteFlags::PS).bits());
}

/// Byte-addressed memory; only written bytes are readable.
#[derive(Default)]
pub struct Ram(pub BTreeMap<usize, u8>);

impl Ram {
    pub fn write_word(&mut self, addr: usize, value: usize) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.0.insert(addr + i, b);
        }
    }

    pub fn fill(&mut self, addr: usize, bytes: &[u8]) {
        for (i, b) in bytes.iter().enumerate() {
            self.0.insert(addr + i, *b);
        }
    }
}

impl Peeker for Ram {
    fn peek(&self, addr: usize, buf: &mut [u8]) -> Option<()> {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = *self.0.get(&addr.checked_add(i)?)?;
        }
        Some(())
    }
}

/// A console fed from a script of lines.
#[derive(Default)]
pub struct Console {
    pub input: VecDeque<String>,
    pub out: String,
}

impl Console {
    pub fn scripted(lines: &[&str]) -> Self {
        Self {
            input: lines.iter().map(|l| format!("{l}\n")).collect(),
            out: String::new(),
        }
    }
}

impl std::fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.out.push_str(s);
        Ok(())
    }
}

impl Teletype for Console {
    fn read(&mut self, data: &mut [u8]) -> Result<usize, MonitorError> {
        let Some(line) = self.input.pop_front() else {
            return Ok(0);
        };
        let len = line.len().min(data.len());
        data[..len].copy_from_slice(&line.as_bytes()[..len]);
        Ok(len)
    }
}

pub fn env<'a>(
    memory: &'a dyn Peeker,
    page_table: &'a mut TestPageTable,
    symbols: &'a dyn SymbolResolver,
) -> Env<'a> {
    Env {
        memory,
        page_table,
        symbols,
        frame: None,
        stack: None,
        layout: None,
    }
}

/// Runs one command line with the built-in commands.
pub fn run(env: &mut Env<'_>, line: &str) -> (isize, String) {
    let mut out = String::new();
    let status = Monitor::new().run_cmd(line, env, &mut out);
    (status, out)
}
