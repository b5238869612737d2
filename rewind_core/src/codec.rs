// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Little-endian byte framing shared by every on-disk structure.
//!
//! [`ByteWriter`] appends fixed-width little-endian values and
//! length-prefixed blobs to a `Vec<u8>`. [`ByteReader`] is its bounds-checked
//! mirror: every read reports [`DecodeError::Truncated`] instead of panicking,
//! and [`read_len`](ByteReader::read_len) refuses a length prefix above a
//! caller-supplied ceiling before anything is allocated.

use alloc::string::String;
use alloc::vec::Vec;

/// A failure to decode bytes that came from outside the process.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The stream ended before a value was complete.
    #[error("truncated stream: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the value required.
        needed: usize,
        /// Bytes left in the stream.
        remaining: usize,
    },
    /// A length prefix exceeded its sanity ceiling.
    #[error("{what} length {len} exceeds limit {max}")]
    LengthTooLarge {
        /// Which field carried the length.
        what: &'static str,
        /// The decoded length.
        len: u64,
        /// The ceiling it was checked against.
        max: u64,
    },
    /// A tag byte did not name any known variant.
    #[error("invalid {what} tag {value}")]
    InvalidTag {
        /// Which enumeration was being decoded.
        what: &'static str,
        /// The offending value.
        value: u32,
    },
    /// A string field was not valid UTF-8.
    #[error("{what} is not valid UTF-8")]
    InvalidUtf8 {
        /// Which field was being decoded.
        what: &'static str,
    },
    /// A payload key was referenced but not present in the cache.
    #[error("payload {key:#x} is not cached")]
    MissingPayload {
        /// The missing key.
        key: u64,
    },
}

// ---------------------------------------------------------------------------
// ByteWriter
// ---------------------------------------------------------------------------

/// Appends little-endian values to a growable buffer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns a view of the written bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Writes one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Writes a bool as one byte (0 or 1).
    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    /// Writes a little-endian `u16`.
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `i32`.
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `f32`.
    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes a little-endian `f64`.
    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Writes raw bytes with no prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a `u32` length prefix followed by the bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is longer than `u32::MAX`.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_len(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Writes a `u32` length or count prefix.
    ///
    /// # Panics
    ///
    /// Panics if `len` does not fit in a `u32`.
    pub fn write_len(&mut self, len: usize) {
        let len = u32::try_from(len).unwrap_or_else(|_| panic!("length {len} exceeds u32"));
        self.write_u32(len);
    }

    /// Overwrites a previously written little-endian `u32` at `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos + 4` is past the end of the buffer.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// ByteReader
// ---------------------------------------------------------------------------

/// Bounds-checked little-endian reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Returns the current read position.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns whether every byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }

    /// Reads `n` raw bytes.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.read_raw(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a bool; any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `f32`.
    pub fn read_f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian `f64`.
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Reads a `u32` length or count prefix and checks it against `max`.
    ///
    /// The check happens before the caller allocates anything for it.
    pub fn read_len(&mut self, max: usize, what: &'static str) -> Result<usize, DecodeError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(DecodeError::LengthTooLarge {
                what,
                len: len as u64,
                max: max as u64,
            });
        }
        Ok(len)
    }

    /// Reads a length-prefixed blob no longer than `max`.
    pub fn read_bytes(&mut self, max: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_len(max, what)?;
        self.read_raw(len)
    }

    /// Reads a length-prefixed UTF-8 string no longer than `max` bytes.
    pub fn read_string(&mut self, max: usize, what: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_bytes(max, what)?;
        core::str::from_utf8(bytes)
            .map(String::from)
            .map_err(|_| DecodeError::InvalidUtf8 { what })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_values_are_little_endian() {
        let mut w = ByteWriter::new();
        w.write_u32(0x0102_0304);
        w.write_u16(0x0506);
        assert_eq!(w.as_bytes(), &[4, 3, 2, 1, 6, 5]);
    }

    #[test]
    fn reader_mirrors_writer() {
        let mut w = ByteWriter::new();
        w.write_u8(7);
        w.write_bool(true);
        w.write_i32(-5);
        w.write_u64(u64::MAX - 1);
        w.write_f32(0.25);
        w.write_f64(-1.5);
        w.write_str("surface");
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(r.read_u8(), Ok(7));
        assert_eq!(r.read_bool(), Ok(true));
        assert_eq!(r.read_i32(), Ok(-5));
        assert_eq!(r.read_u64(), Ok(u64::MAX - 1));
        assert_eq!(r.read_f32(), Ok(0.25));
        assert_eq!(r.read_f64(), Ok(-1.5));
        assert_eq!(r.read_string(64, "name").as_deref(), Ok("surface"));
        assert!(r.is_exhausted(), "all bytes consumed");
    }

    #[test]
    fn truncated_read_reports_shortfall() {
        let mut r = ByteReader::new(&[1, 2]);
        assert_eq!(
            r.read_u32(),
            Err(DecodeError::Truncated {
                needed: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn overlong_length_is_rejected_before_reading() {
        let mut w = ByteWriter::new();
        w.write_u32(1_000_000);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            r.read_bytes(16, "blob"),
            Err(DecodeError::LengthTooLarge {
                what: "blob",
                len: 1_000_000,
                max: 16
            })
        );
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let mut w = ByteWriter::new();
        w.write_bytes(&[0xFF, 0xFE]);
        let bytes = w.into_bytes();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(
            r.read_string(16, "name"),
            Err(DecodeError::InvalidUtf8 { what: "name" })
        );
    }

    #[test]
    fn patch_u32_overwrites_in_place() {
        let mut w = ByteWriter::new();
        w.write_u32(0);
        w.write_u8(9);
        w.patch_u32(0, 3);
        assert_eq!(w.as_bytes(), &[3, 0, 0, 0, 9]);
    }
}
