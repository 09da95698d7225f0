//! Low-level binary reading utilities shared by the ZIP and 7z listing code.
//!
//! Both formats keep their directory metadata in a single contiguous region
//! (the ZIP central directory, the 7z next header), so parsing works on an
//! in-memory buffer rather than on a stream.

use crate::{Error, Result};

/// A bounds-checked little-endian cursor over a byte slice.
///
/// Every read that would run past the end of the buffer fails with
/// [`Error::CorruptHeader`] carrying the absolute offset of the failed read.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base_offset: u64,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base_offset(data, 0)
    }

    /// Creates a reader whose error offsets are reported relative to
    /// `base_offset` (the file position of `data[0]`).
    pub fn with_base_offset(data: &'a [u8], base_offset: u64) -> Self {
        Self {
            data,
            pos: 0,
            base_offset,
        }
    }

    /// Current position within the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Absolute offset of the current position.
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    /// Reads exactly `count` bytes.
    pub fn bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(Error::corrupt_header(
                self.offset(),
                format!(
                    "unexpected end of data: need {} bytes, {} left",
                    count,
                    self.remaining()
                ),
            ));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Skips `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.bytes(count).map(|_| ())
    }

    /// Reads a fixed-size array.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    /// Reads a single byte.
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    /// Reads an unsigned 16-bit little-endian integer.
    pub fn u16_le(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Reads an unsigned 32-bit little-endian integer.
    pub fn u32_le(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Reads an unsigned 64-bit little-endian integer.
    pub fn u64_le(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    /// Reads a 7z variable-length encoded u64.
    ///
    /// The number of leading one bits in the first byte gives the number of
    /// extra little-endian bytes; the remaining low bits of the first byte
    /// are the most significant part of the value.
    ///
    /// - `0xxxxxxx`: value 0-127
    /// - `10xxxxxx` + 1 byte: value 0-16383
    /// - `11111111` + 8 bytes: full u64
    pub fn variable_u64(&mut self) -> Result<u64> {
        let first = self.u8()? as u64;
        let mut mask = 0x80u64;
        let mut value = 0u64;

        for i in 0..8 {
            if first & mask == 0 {
                return Ok(value | ((first & (mask - 1)) << (8 * i)));
            }
            value |= (self.u8()? as u64) << (8 * i);
            mask >>= 1;
        }

        Ok(value)
    }

    /// Reads a variable-length count and checks it against `limit`.
    pub fn count(&mut self, limit: usize, what: &str) -> Result<usize> {
        let value = self.variable_u64()?;
        if value > limit as u64 {
            return Err(Error::ResourceLimitExceeded(format!(
                "too many {}: {}",
                what, value
            )));
        }
        Ok(value as usize)
    }

    /// Reads a packed bit vector of `count` booleans, most significant bit first.
    pub fn bool_vector(&mut self, count: usize) -> Result<Vec<bool>> {
        let bytes = self.bytes(count.div_ceil(8))?;
        Ok((0..count)
            .map(|i| (bytes[i / 8] >> (7 - (i % 8))) & 1 != 0)
            .collect())
    }

    /// Reads an "all defined" marker byte followed, if zero, by a bit vector.
    pub fn all_or_bits(&mut self, count: usize) -> Result<Vec<bool>> {
        if self.u8()? != 0 {
            Ok(vec![true; count])
        } else {
            self.bool_vector(count)
        }
    }
}
