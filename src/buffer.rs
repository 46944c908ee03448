//! Append-only growable byte buffer with a rewindable write cursor.
//!
//! Serialization writes into a [`GrowBuffer`] so byte offsets are always the
//! real offsets of emitted bytes. Rewinding the cursor lets a writer patch a
//! field (typically a stream `/Length`) once its value is known.

use crate::error::{Error, Result};

/// Growable byte sequence with a write cursor.
///
/// Invariant: `position() <= len()`.
#[derive(Debug, Clone, Default)]
pub struct GrowBuffer {
    data: Vec<u8>,
    pos: usize,
    growth_events: usize,
}

impl GrowBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
            growth_events: 0,
        }
    }

    /// Write `p` at the cursor and advance it.
    ///
    /// Bytes before the current end are overwritten in place; anything past
    /// the end extends the buffer.
    pub fn write(&mut self, p: &[u8]) {
        let end = self.pos + p.len();
        if end > self.data.capacity() {
            self.grow(end);
        }

        let overlap = self.data.len().saturating_sub(self.pos).min(p.len());
        self.data[self.pos..self.pos + overlap].copy_from_slice(&p[..overlap]);
        self.data.extend_from_slice(&p[overlap..]);
        self.pos = end;
    }

    /// Write a string at the cursor.
    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Overwrite bytes at `at` without moving the cursor.
    pub fn patch_at(&mut self, at: usize, p: &[u8]) -> Result<()> {
        let saved = self.pos;
        self.set_position(at)?;
        self.write(p);
        self.pos = saved;
        Ok(())
    }

    fn grow(&mut self, needed: usize) {
        let new_capacity = (self.data.capacity() * 2).max(needed);
        self.data.reserve_exact(new_capacity - self.data.len());
        self.growth_events += 1;
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Full written contents, independent of the cursor.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Current cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Fails if `pos` lies beyond the written length.
    pub fn set_position(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::OutOfRange {
                index: pos,
                len: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Allocated capacity.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// How many times the backing storage was reallocated.
    pub fn growth_events(&self) -> usize {
        self.growth_events
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl std::io::Write for GrowBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        GrowBuffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_append_advances_cursor() {
        let mut buf = GrowBuffer::new();
        buf.write(b"hello");
        buf.write(b" world");
        assert_eq!(buf.bytes(), b"hello world");
        assert_eq!(buf.position(), 11);
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn test_rewind_and_overwrite() {
        let mut buf = GrowBuffer::new();
        buf.write(b"/Length     \nstream");
        buf.set_position(8).unwrap();
        buf.write(b"42");
        assert_eq!(buf.bytes(), b"/Length 42  \nstream");
        assert_eq!(buf.position(), 10);
        assert_eq!(buf.len(), 19);
    }

    #[test]
    fn test_overwrite_past_end_extends() {
        let mut buf = GrowBuffer::new();
        buf.write(b"abc");
        buf.set_position(2).unwrap();
        buf.write(b"XYZ");
        assert_eq!(buf.bytes(), b"abXYZ");
    }

    #[test]
    fn test_set_position_beyond_end_fails() {
        let mut buf = GrowBuffer::new();
        buf.write(b"abc");
        assert!(buf.set_position(4).is_err());
        assert!(buf.set_position(3).is_ok());
    }

    #[test]
    fn test_patch_at_keeps_cursor() {
        let mut buf = GrowBuffer::new();
        buf.write(b"0000 tail");
        buf.patch_at(0, b"12").unwrap();
        assert_eq!(buf.bytes(), b"1200 tail");
        assert_eq!(buf.position(), 9);
    }

    #[test]
    fn test_growth_doubles() {
        let mut buf = GrowBuffer::with_capacity(4);
        for _ in 0..1024 {
            buf.write(b"x");
        }
        assert_eq!(buf.len(), 1024);
        // 4 -> 8 -> ... -> 1024 is eight doublings
        assert!(buf.growth_events() <= 9, "growth events: {}", buf.growth_events());
    }

    #[test]
    fn test_large_write_jumps_to_needed() {
        let mut buf = GrowBuffer::with_capacity(2);
        buf.write(&[7u8; 100]);
        assert!(buf.capacity() >= 100);
        assert_eq!(buf.growth_events(), 1);
    }

    #[test]
    fn test_io_write_impl() {
        let mut buf = GrowBuffer::new();
        write!(buf, "{} 0 obj\n", 3).unwrap();
        assert_eq!(buf.bytes(), b"3 0 obj\n");
    }
}
