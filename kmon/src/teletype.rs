//! A teletype (TTY) interface for character-based I/O.
//!
//! The monitor talks to its operator through a [`Teletype`]: output is
//! formatted into it with `core::fmt::Write`, and input is read from it one
//! line at a time with [`readline`].
use crate::MonitorError;
use core::fmt::Write;

/// Size of the buffer a command line is read into.
pub const CMDBUF_SIZE: usize = 80;

/// The `Teletype` trait represents a generic character-based input/output
/// device.
pub trait Teletype: Write {
    /// Reads at most one line of input into `data`.
    ///
    /// # Returns
    /// - `Ok(usize)`: The number of bytes read; `0` at end of input.
    /// - `Err(MonitorError)`: If the device cannot be read.
    fn read(&mut self, data: &mut [u8]) -> Result<usize, MonitorError>;
}

/// Prints `prompt` and reads one command line into `buf`.
///
/// The line terminator is removed. Bytes that do not form valid UTF-8 end the
/// line early. Returns `Ok(None)` at end of input.
pub fn readline<'b, T: Teletype + ?Sized>(
    tty: &mut T,
    prompt: &str,
    buf: &'b mut [u8; CMDBUF_SIZE],
) -> Result<Option<&'b str>, MonitorError> {
    tty.write_str(prompt)?;
    let len = tty.read(&mut buf[..])?;
    if len == 0 {
        return Ok(None);
    }
    let line = &buf[..len.min(CMDBUF_SIZE)];
    let line = match core::str::from_utf8(line) {
        Ok(line) => line,
        Err(e) => core::str::from_utf8(&line[..e.valid_up_to()]).unwrap_or_default(),
    };
    Ok(Some(line.trim_end_matches(['\r', '\n'])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    struct OneLine {
        input: &'static [u8],
        out: String,
    }

    impl Write for OneLine {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            self.out.push_str(s);
            Ok(())
        }
    }

    impl Teletype for OneLine {
        fn read(&mut self, data: &mut [u8]) -> Result<usize, MonitorError> {
            let len = self.input.len().min(data.len());
            data[..len].copy_from_slice(&self.input[..len]);
            self.input = &self.input[len..];
            Ok(len)
        }
    }

    #[test]
    fn strips_terminator() {
        let mut tty = OneLine {
            input: b"help\r\n",
            out: String::new(),
        };
        let mut buf = [0; CMDBUF_SIZE];
        assert_eq!(readline(&mut tty, "K> ", &mut buf), Ok(Some("help")));
        assert_eq!(tty.out, "K> ");
        assert_eq!(readline(&mut tty, "K> ", &mut buf), Ok(None));
    }

    #[test]
    fn invalid_utf8_is_cut() {
        let mut tty = OneLine {
            input: b"dump\xff V\n",
            out: String::new(),
        };
        let mut buf = [0; CMDBUF_SIZE];
        assert_eq!(readline(&mut tty, "", &mut buf), Ok(Some("dump")));
    }
}
