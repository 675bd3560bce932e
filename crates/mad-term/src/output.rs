// SPDX-License-Identifier: MIT
//
// Frame output buffering.
//
// A frame is a clear, a handful of rows and a few cursor commands. Written
// piecemeal that is dozens of tiny writes, and the terminal may paint the
// half-finished state in between. `OutputBuffer` collects the whole frame
// in memory and hands it to the writer in one `write_all`.

use std::io::{self, Write};

/// A byte buffer that accumulates one frame of terminal output.
///
/// Default capacity: 4 KB, enough for a screen of placeholder rows.
#[derive(Debug)]
pub struct OutputBuffer {
    buf: Vec<u8>,
}

const DEFAULT_CAPACITY: usize = 4096;

impl OutputBuffer {
    /// Create an empty buffer with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(DEFAULT_CAPACITY),
        }
    }

    /// Bytes queued for the next flush.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// `true` when nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The accumulated bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drop the queued bytes. The allocation is kept for the next frame.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Write accumulated output to `w`, flush it, and clear the buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `w` fails. The buffer keeps its
    /// contents in that case.
    pub fn flush_to(&mut self, w: &mut impl Write) -> io::Result<()> {
        if !self.buf.is_empty() {
            w.write_all(&self.buf)?;
            w.flush()?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl Write for OutputBuffer {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        // Real flushing happens in flush_to().
        Ok(())
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// A writer that counts calls and can be told to fail.
    #[derive(Default)]
    struct Sink {
        bytes: Vec<u8>,
        writes: usize,
        fail: bool,
    }

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.writes += 1;
            self.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn new_is_empty() {
        let frame = OutputBuffer::default();
        assert!(frame.is_empty());
        assert_eq!(frame.len(), 0);
    }

    #[test]
    fn write_trait_appends() {
        let mut buf = OutputBuffer::new();
        write!(buf, "row {}", 7).unwrap();
        assert_eq!(buf.as_bytes(), b"row 7");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn flush_to_writes_once_and_clears() {
        let mut buf = OutputBuffer::new();
        buf.write_all(b"\x1b[2J").unwrap();
        buf.write_all(b"~\r\n~").unwrap();

        let mut sink = Sink::default();
        buf.flush_to(&mut sink).unwrap();

        assert_eq!(sink.bytes, b"\x1b[2J~\r\n~");
        assert_eq!(sink.writes, 1);
        assert!(buf.is_empty());
    }

    #[test]
    fn flush_empty_writes_nothing() {
        let mut buf = OutputBuffer::new();
        let mut sink = Sink::default();
        buf.flush_to(&mut sink).unwrap();
        assert_eq!(sink.writes, 0);
    }

    #[test]
    fn failed_flush_keeps_contents() {
        let mut buf = OutputBuffer::new();
        buf.write_all(b"frame").unwrap();
        let mut sink = Sink {
            fail: true,
            ..Sink::default()
        };
        assert!(buf.flush_to(&mut sink).is_err());
        assert_eq!(buf.as_bytes(), b"frame");
    }

    #[test]
    fn clear_reuses_allocation() {
        let mut frame = OutputBuffer::new();
        frame.write_all(&[b'~'; 100]).unwrap();
        let before = frame.buf.capacity();
        frame.clear();
        assert!(frame.is_empty());
        assert_eq!(frame.buf.capacity(), before);
    }
}
