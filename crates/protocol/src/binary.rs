//! Binary reading and writing utilities for the wire protocol.
//!
//! All values are little-endian. Every read is bounds-checked: running off
//! the end of a frame yields [`ProtocolError::UnexpectedEof`], never a panic.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::ProtocolError;

/// A reader for parsing binary protocol messages.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
}

impl BinaryReader {
    /// Create a new reader from raw bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { buf: data.into() }
    }

    /// Returns remaining bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    fn need(&self, n: usize) -> Result<(), ProtocolError> {
        if self.buf.remaining() >= n {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedEof)
        }
    }

    #[inline]
    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    #[inline]
    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    #[inline]
    pub fn get_i16(&mut self) -> Result<i16, ProtocolError> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    #[inline]
    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    #[inline]
    pub fn get_i32(&mut self) -> Result<i32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    #[inline]
    pub fn get_f32(&mut self) -> Result<f32, ProtocolError> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    #[inline]
    pub fn get_f64(&mut self) -> Result<f64, ProtocolError> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Read a NUL-terminated UTF-8 string.
    ///
    /// A string that reaches the end of the frame without its terminator is
    /// a protocol fault. Invalid UTF-8 is replaced lossily.
    pub fn get_string_utf8(&mut self) -> Result<String, ProtocolError> {
        // Most optional strings on the wire are empty.
        if self.buf.first() == Some(&0) {
            self.buf.advance(1);
            return Ok(String::new());
        }

        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::MissingTerminator)?;
        let raw = self.buf.split_to(end);
        self.buf.advance(1);
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// A writer for building binary protocol messages.
#[derive(Debug, Default)]
pub struct BinaryWriter {
    buf: BytesMut,
}

impl BinaryWriter {
    /// Create a new writer with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a new writer with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    #[inline]
    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    #[inline]
    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    #[inline]
    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    #[inline]
    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    #[inline]
    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_f64_le(v);
    }

    /// Write a NUL-terminated UTF-8 string.
    ///
    /// Interior NULs would end the string early on the reading side, so the
    /// string is cut at the first one.
    pub fn put_string_utf8(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        self.buf.put_slice(&bytes[..end]);
        self.buf.put_u8(0);
    }

    /// Write raw bytes.
    pub fn put_slice(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Consume the writer and return the built buffer.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }

    /// Get current buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_u32() {
        let mut w = BinaryWriter::new();
        w.put_u32(0xDEADBEEF);
        let data = w.finish();
        let mut r = BinaryReader::new(data);
        assert_eq!(r.get_u32().unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn test_string_utf8() {
        let mut w = BinaryWriter::new();
        w.put_string_utf8("hello");
        w.put_string_utf8("");
        w.put_u8(7);
        let data = w.finish();
        let mut r = BinaryReader::new(data);
        assert_eq!(r.get_string_utf8().unwrap(), "hello");
        assert_eq!(r.get_string_utf8().unwrap(), "");
        assert_eq!(r.get_u8().unwrap(), 7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncated_reads_fail() {
        let mut r = BinaryReader::new(vec![1u8, 2, 3]);
        assert!(matches!(r.get_u32(), Err(ProtocolError::UnexpectedEof)));
        // A failed read consumes nothing.
        assert_eq!(r.get_u16().unwrap(), 0x0201);
        assert!(matches!(r.get_f64(), Err(ProtocolError::UnexpectedEof)));
    }

    #[test]
    fn test_unterminated_string() {
        let mut r = BinaryReader::new(b"abc".to_vec());
        assert!(matches!(
            r.get_string_utf8(),
            Err(ProtocolError::MissingTerminator)
        ));
        assert!(matches!(
            BinaryReader::new(Vec::new()).get_string_utf8(),
            Err(ProtocolError::MissingTerminator)
        ));
    }

    #[test]
    fn test_interior_nul_is_cut() {
        let mut w = BinaryWriter::new();
        w.put_string_utf8("ab\0cd");
        assert_eq!(w.as_slice(), b"ab\0");
    }
}
