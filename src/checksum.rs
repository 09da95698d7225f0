//! CRC-32 computation.
//!
//! Both trailer formats checksum with the IEEE 802.3 polynomial (the same
//! CRC used by zlib, ZIP, and 7z), so a single accumulator serves both
//! codecs.
//!
//! # Example
//!
//! ```rust
//! use torrentsig::checksum::{Crc32, crc32};
//!
//! let mut crc = Crc32::new();
//! crc.update(b"Hello, ");
//! crc.update(b"World!");
//! assert_eq!(crc.finalize(), 0xEC4AC3D0);
//!
//! assert_eq!(crc32(b"Hello, World!"), 0xEC4AC3D0);
//! ```

use std::io::{self, Read, Write};

use crate::READ_BUFFER_SIZE;

/// Computes the CRC-32 of a byte slice in one call.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Incremental CRC-32 calculator.
#[derive(Clone)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.hasher.clone().finalize())
            .finish()
    }
}

impl Crc32 {
    /// Creates a new calculator.
    pub fn new() -> Self {
        Self {
            hasher: crc32fast::Hasher::new(),
        }
    }

    /// Updates the checksum with additional data.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Returns the checksum of everything seen so far.
    ///
    /// The calculator stays usable; further updates continue the same stream.
    pub fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Resets the checksum to its initial state.
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// Computes the checksum by draining a reader.
    pub fn compute_reader<R: Read>(reader: &mut R) -> io::Result<u32> {
        let mut hasher = Self::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hasher.finalize())
    }
}

/// A sink that checksums everything written to it and discards the bytes.
///
/// Used to CRC a synthesized byte stream without materializing it.
///
/// ```rust
/// use torrentsig::checksum::Crc32Sink;
/// use std::io::Write;
///
/// let mut sink = Crc32Sink::new();
/// sink.write_all(b"Hello, World!").unwrap();
/// assert_eq!(sink.crc(), 0xEC4AC3D0);
/// assert_eq!(sink.bytes_written(), 13);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Crc32Sink {
    crc: Crc32,
    bytes_written: u64,
}

impl Crc32Sink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the CRC-32 of all bytes written so far.
    pub fn crc(&self) -> u32 {
        self.crc.finalize()
    }

    /// Returns the number of bytes written.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Write for Crc32Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.crc.update(buf);
        self.bytes_written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
