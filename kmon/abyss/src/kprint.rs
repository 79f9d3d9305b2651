//! Kernel print utilities.
//!
//! Messages are formatted into whatever sink has been installed with
//! [`install_sink`]. Until a sink is installed, every message is dropped, so
//! code that logs can run before the serial port is brought up.

use crate::spinlock::SpinLock;
use core::fmt::Write;

/// A destination for kernel log messages.
pub type Sink = &'static mut (dyn Write + Send);

static SINK: SpinLock<Option<Sink>> = SpinLock::new(None);

/// Installs the sink that receives every subsequent message.
///
/// Returns the previously installed sink, if any.
pub fn install_sink(sink: Sink) -> Option<Sink> {
    let mut guard = SINK.lock();
    let prev = guard.replace(sink);
    guard.unlock();
    prev
}

/// Removes the current sink; later messages are dropped.
pub fn take_sink() -> Option<Sink> {
    let mut guard = SINK.lock();
    let prev = guard.take();
    guard.unlock();
    prev
}

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    let mut guard = SINK.lock();
    if let Some(sink) = guard.as_mut() {
        let _ = write!(sink, "{fmt}");
    }
    guard.unlock();
}

#[doc(hidden)]
pub fn _log(level: &str, fmt: core::fmt::Arguments<'_>) {
    if !crate::QUITE.load(core::sync::atomic::Ordering::SeqCst) {
        _print(format_args!("[{level}] {fmt}\n"));
    }
}

/// Formats a message into the installed sink.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// [`print!`] followed by a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Logs a line tagged `[INFO]`, unless `QUITE` is set.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::kprint::_log("INFO", format_args!($($arg)*)));
}

/// Logs a line tagged `[WARN]`, unless `QUITE` is set.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => ($crate::kprint::_log("WARN", format_args!($($arg)*)));
}

/// Logs a line tagged `[DEBUG]`, unless `QUITE` is set.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => ($crate::kprint::_log("DEBUG", format_args!($($arg)*)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::boxed::Box;

    static WRITTEN: AtomicUsize = AtomicUsize::new(0);

    struct Counter;

    impl Write for Counter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            WRITTEN.fetch_add(s.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn messages_reach_installed_sink() {
        print!("dropped");
        assert_eq!(WRITTEN.load(Ordering::SeqCst), 0);

        assert!(install_sink(Box::leak(Box::new(Counter))).is_none());
        println!("hello");
        assert_eq!(WRITTEN.load(Ordering::SeqCst), 6);

        info!("x");
        assert_eq!(WRITTEN.load(Ordering::SeqCst), 6 + "[INFO] x\n".len());
        crate::QUITE.store(true, Ordering::SeqCst);
        warning!("muted");
        crate::QUITE.store(false, Ordering::SeqCst);
        assert_eq!(WRITTEN.load(Ordering::SeqCst), 15);

        assert!(take_sink().is_some());
        print!("gone");
        assert_eq!(WRITTEN.load(Ordering::SeqCst), 15);
    }
}
