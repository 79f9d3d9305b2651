//! The COM1 16550 UART: the monitor's console.
use crate::{spinlock::SpinLock, x86_64::pio::Pio};

const COM1: u16 = 0x3f8;

// Register offsets from the base port.
const DATA: u16 = 0;
const IER: u16 = 1;
const FCR: u16 = 2;
const LCR: u16 = 3;
const MCR: u16 = 4;
const LSR: u16 = 5;

const LCR_DLAB: u8 = 0x80;
const LCR_8N1: u8 = 0x03;
const LSR_DATA_READY: u8 = 0x01;
const LSR_THR_EMPTY: u8 = 0x20;

const BAUD: u32 = 9600;

const EOT: u8 = 0x04;
const DEL: u8 = 0x7f;
const BACKSPACE: u8 = 0x08;

fn reg(offset: u16) -> Pio {
    Pio::new(COM1 + offset)
}

/// Programs COM1 for 9600 baud, 8N1, FIFOs off, receive interrupts on.
///
/// # Safety
/// Reprograms the UART under anybody else using it.
pub unsafe fn init() {
    reg(FCR).write_u8(0);
    reg(LCR).write_u8(LCR_DLAB);
    reg(DATA).write_u8((115_200 / BAUD) as u8);
    reg(IER).write_u8(0);
    reg(LCR).write_u8(LCR_8N1);
    reg(MCR).write_u8(0);
    reg(IER).write_u8(1);
    // Drain anything pending.
    reg(FCR).read_u8();
    reg(DATA).read_u8();
}

fn put(byte: u8) {
    // Bounded wait for the transmitter.
    for _ in 0..12_800 {
        if reg(LSR).read_u8() & LSR_THR_EMPTY != 0 {
            break;
        }
        Pio::new(0x84).read_u8();
    }
    reg(DATA).write_u8(byte);
}

fn get() -> u8 {
    while reg(LSR).read_u8() & LSR_DATA_READY == 0 {
        core::hint::spin_loop();
    }
    reg(DATA).read_u8()
}

static READER: SpinLock<()> = SpinLock::new(());

/// Reads one line from COM1 into `buffer`, echoing what is typed.
///
/// Stops after a carriage return or line feed (kept in `buffer`), on Ctrl+D
/// (dropped), or when `buffer` is full. DEL rubs out the previous byte.
/// Returns the number of bytes stored, or `None` if another context is
/// already reading.
pub fn read_bytes_busywait(buffer: &mut [u8]) -> Option<usize> {
    let reader = READER.try_lock().ok()?;
    let mut len = 0;
    while len < buffer.len() {
        match get() {
            EOT => break,
            DEL => {
                if len > 0 {
                    len -= 1;
                    for b in [BACKSPACE, b' ', BACKSPACE] {
                        put(b);
                    }
                }
            }
            byte => {
                put(byte);
                buffer[len] = byte;
                len += 1;
                if byte == b'\n' || byte == b'\r' {
                    break;
                }
            }
        }
    }
    reader.unlock();
    Some(len)
}

/// Writes formatted text to COM1.
#[derive(Default)]
pub struct Com1Sink;

impl Com1Sink {
    /// A writer to COM1. COM1 should have been set up with [`init`].
    pub const fn new() -> Self {
        Com1Sink
    }
}

impl core::fmt::Write for Com1Sink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        s.bytes().for_each(put);
        Ok(())
    }
}
