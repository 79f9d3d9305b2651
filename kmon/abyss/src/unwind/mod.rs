//! Frame-pointer based stack unwinding.
//!
//! Every function compiled with frame pointers begins with
//! `push rbp; mov rbp, rsp`, which leaves the following activation record
//! behind (addresses grow upwards):
//!
//! ```text
//!   fp + 6 * WORD  | argument word 4 |
//!        ...       |       ...       |
//!   fp + 2 * WORD  | argument word 0 |
//!   fp + 1 * WORD  | return address  |
//!   fp             | caller's fp     | <- rbp
//! ```
//!
//! Following the saved frame pointers yields the callers one by one, until
//! the zero frame pointer planted by the earliest startup code is reached.
//!
//! [`FramePointerUnwinder`] never touches memory directly: every word goes
//! through a [`Peeker`], and each frame pointer is checked before it is
//! followed.

use core::ops::Range;

/// Size of a machine word on the stack.
pub const WORD: usize = core::mem::size_of::<usize>();

/// Number of argument words reported for each activation record.
pub const UNWIND_ARGS: usize = 5;

/// Read access to memory.
///
/// Implementors decide which addresses are readable; a read of any other
/// address returns `None` instead of faulting.
pub trait Peeker {
    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    fn peek(&self, addr: usize, buf: &mut [u8]) -> Option<()>;

    /// Reads the machine word at `addr`.
    fn read_usize(&self, addr: usize) -> Option<usize> {
        let mut buf = [0u8; WORD];
        self.peek(addr, &mut buf)?;
        Some(usize::from_le_bytes(buf))
    }
}

impl<P: Peeker + ?Sized> Peeker for &P {
    fn peek(&self, addr: usize, buf: &mut [u8]) -> Option<()> {
        (**self).peek(addr, buf)
    }
}

/// The frame an unwind starts from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackFrame {
    rbp: usize,
}

impl StackFrame {
    /// A frame anchored at the given frame pointer.
    pub const fn new(rbp: usize) -> Self {
        Self { rbp }
    }

    /// The frame of the caller of this function.
    #[cfg(target_arch = "x86_64")]
    #[inline(always)]
    pub fn current() -> Self {
        Self::new(crate::x86_64::read_rbp())
    }

    /// The frame pointer.
    pub const fn fp(&self) -> usize {
        self.rbp
    }
}

/// One live call frame, reconstructed from the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivationRecord {
    /// Frame pointer of this frame.
    pub fp: usize,
    /// Address the frame returns to.
    pub ret: usize,
    /// The words above the return address. `None` when a word lies outside
    /// the stack or cannot be read.
    pub args: [Option<usize>; UNWIND_ARGS],
}

/// Reasons a frame-pointer chain could not be followed further.
#[derive(Clone, PartialEq, Eq)]
pub enum UnwindError {
    /// The frame pointer is not word aligned.
    Misaligned(usize),
    /// A frame slot lies outside the stack.
    MemoryOutOfBound(usize, Range<usize>),
    /// A frame slot could not be read.
    Unreadable(usize),
    /// The caller's frame pointer does not lie above the callee's.
    NotMonotonic {
        /// The callee's frame pointer.
        fp: usize,
        /// The saved frame pointer found in it.
        next: usize,
    },
}

impl core::fmt::Debug for UnwindError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Misaligned(v) => write!(f, "Misaligned(0x{v:x})"),
            Self::MemoryOutOfBound(v, r) => {
                write!(f, "MemoryOutOfBound(0x{v:x}, 0x{:x}..0x{:x})", r.start, r.end)
            }
            Self::Unreadable(v) => write!(f, "Unreadable(0x{v:x})"),
            Self::NotMonotonic { fp, next } => {
                write!(f, "NotMonotonic(0x{fp:x} -> 0x{next:x})")
            }
        }
    }
}

impl core::fmt::Display for UnwindError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Misaligned(v) => write!(f, "frame pointer 0x{v:x} is misaligned"),
            Self::MemoryOutOfBound(v, r) => write!(
                f,
                "0x{v:x} is outside the stack 0x{:x}..0x{:x}",
                r.start, r.end
            ),
            Self::Unreadable(v) => write!(f, "cannot read 0x{v:x}"),
            Self::NotMonotonic { fp, next } => write!(
                f,
                "saved frame pointer 0x{next:x} does not lie above 0x{fp:x}"
            ),
        }
    }
}

/// Iterator over the activation records of a frame-pointer chain, innermost
/// first.
///
/// The walk ends when a zero frame pointer is reached. If a frame pointer
/// fails validation, a single `Err` is yielded and the walk ends.
pub struct FramePointerUnwinder<'a, P: Peeker + ?Sized> {
    peeker: &'a P,
    fp: usize,
    prev: Option<usize>,
    stack: Option<Range<usize>>,
}

impl<'a, P: Peeker + ?Sized> FramePointerUnwinder<'a, P> {
    /// Starts an unwind at `frame`.
    pub fn new(frame: StackFrame, peeker: &'a P) -> Self {
        Self {
            peeker,
            fp: frame.fp(),
            prev: None,
            stack: None,
        }
    }

    /// Restricts every frame slot to `stack`.
    pub fn with_stack_bounds(mut self, stack: Range<usize>) -> Self {
        self.stack = Some(stack);
        self
    }

    fn in_bounds(&self, addr: usize) -> Result<(), UnwindError> {
        match &self.stack {
            Some(stack) if !(stack.start <= addr && addr < stack.end && stack.end - addr >= WORD) => {
                Err(UnwindError::MemoryOutOfBound(addr, stack.clone()))
            }
            _ => Ok(()),
        }
    }

    fn read_slot(&self, fp: usize, slot: usize) -> Result<usize, UnwindError> {
        let addr = slot
            .checked_mul(WORD)
            .and_then(|ofs| fp.checked_add(ofs))
            .ok_or(UnwindError::Unreadable(fp))?;
        self.in_bounds(addr)?;
        self.peeker
            .read_usize(addr)
            .ok_or(UnwindError::Unreadable(addr))
    }

    fn record(&self, fp: usize) -> Result<(ActivationRecord, usize), UnwindError> {
        if !fp.is_multiple_of(WORD) {
            return Err(UnwindError::Misaligned(fp));
        }
        if let Some(prev) = self.prev
            && fp <= prev
        {
            return Err(UnwindError::NotMonotonic { fp: prev, next: fp });
        }
        let caller = self.read_slot(fp, 0)?;
        let ret = self.read_slot(fp, 1)?;
        let mut args = [None; UNWIND_ARGS];
        for (i, arg) in args.iter_mut().enumerate() {
            *arg = self.read_slot(fp, 2 + i).ok();
        }
        Ok((ActivationRecord { fp, ret, args }, caller))
    }
}

impl<P: Peeker + ?Sized> Iterator for FramePointerUnwinder<'_, P> {
    type Item = Result<ActivationRecord, UnwindError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fp == 0 {
            return None;
        }
        let fp = self.fp;
        match self.record(fp) {
            Ok((record, caller)) => {
                self.prev = Some(fp);
                self.fp = caller;
                Some(Ok(record))
            }
            Err(e) => {
                self.fp = 0;
                Some(Err(e))
            }
        }
    }
}

impl<P: Peeker + ?Sized> core::iter::FusedIterator for FramePointerUnwinder<'_, P> {}

#[cfg(test)]
mod tests {
    use super::*;

    /// Word-addressed fake stack starting at `base`.
    struct Words<const N: usize> {
        base: usize,
        words: [usize; N],
    }

    impl<const N: usize> Peeker for Words<N> {
        fn peek(&self, addr: usize, buf: &mut [u8]) -> Option<()> {
            let ofs = addr.checked_sub(self.base)?;
            let end = ofs.checked_add(buf.len())?;
            if end > N * WORD {
                return None;
            }
            for (i, b) in buf.iter_mut().enumerate() {
                let at = ofs + i;
                *b = self.words[at / WORD].to_le_bytes()[at % WORD];
            }
            Some(())
        }
    }

    const BASE: usize = 0x8000;

    fn slot(i: usize) -> usize {
        BASE + i * WORD
    }

    #[test]
    fn walks_until_zero_frame_pointer() {
        let mut words = [0usize; 24];
        // Innermost frame at slot 0, caller at slot 8, outermost at slot 16.
        words[0] = slot(8);
        words[1] = 0x1111;
        words[2..7].copy_from_slice(&[1, 2, 3, 4, 5]);
        words[8] = slot(16);
        words[9] = 0x2222;
        words[16] = 0;
        words[17] = 0x3333;
        let stack = Words { base: BASE, words };

        let frames: [_; 3] = {
            let mut it = FramePointerUnwinder::new(StackFrame::new(slot(0)), &stack);
            let frames = [it.next(), it.next(), it.next()];
            assert!(it.next().is_none());
            frames
        };
        let first = frames[0].clone().unwrap().unwrap();
        assert_eq!(first.fp, slot(0));
        assert_eq!(first.args, [Some(1), Some(2), Some(3), Some(4), Some(5)]);
        let rets: [usize; 3] = frames.map(|f| f.unwrap().unwrap().ret);
        assert_eq!(rets, [0x1111, 0x2222, 0x3333]);
    }

    #[test]
    fn zero_frame_pointer_yields_nothing() {
        let stack = Words { base: BASE, words: [0usize; 4] };
        assert!(FramePointerUnwinder::new(StackFrame::new(0), &stack).next().is_none());
    }

    #[test]
    fn stops_on_cycle() {
        let mut words = [0usize; 16];
        words[0] = slot(8);
        words[8] = slot(0);
        let stack = Words { base: BASE, words };
        let mut it = FramePointerUnwinder::new(StackFrame::new(slot(0)), &stack);
        assert!(matches!(it.next(), Some(Ok(_))));
        assert!(matches!(it.next(), Some(Ok(_))));
        assert_eq!(
            it.next(),
            Some(Err(UnwindError::NotMonotonic { fp: slot(8), next: slot(0) }))
        );
        assert!(it.next().is_none());
    }

    #[test]
    fn arguments_outside_stack_are_unknown() {
        let mut words = [0usize; 4];
        words[1] = 0x4444;
        let stack = Words { base: BASE, words };
        let mut it = FramePointerUnwinder::new(StackFrame::new(slot(0)), &stack)
            .with_stack_bounds(BASE..slot(4));
        let record = it.next().unwrap().unwrap();
        assert_eq!(record.ret, 0x4444);
        assert_eq!(record.args, [Some(0), Some(0), None, None, None]);
        assert!(it.next().is_none());
    }

    #[test]
    fn frame_pointer_outside_stack() {
        let stack = Words { base: BASE, words: [0usize; 4] };
        let mut it = FramePointerUnwinder::new(StackFrame::new(slot(8)), &stack)
            .with_stack_bounds(BASE..slot(4));
        assert_eq!(
            it.next(),
            Some(Err(UnwindError::MemoryOutOfBound(slot(8), BASE..slot(4))))
        );
        assert!(it.next().is_none());
    }
}
