//! Canonical central directory records.
//!
//! The records built here are what a TorrentZip writer emits for each
//! member, not necessarily the bytes on disk: version fields, flags,
//! method, and modification time are fixed, and the comment length is
//! always zero.

use std::io::Write;

use crate::{Error, Result};

use super::central_dir::ZIP64_EXTRA_ID;
use super::{ZIP64_LIMIT, ZIP64_VOLUME_LIMIT, ZipMember};

/// Record prefix for entries without zip64 fields (version needed 2.0).
///
/// Signature, version made by 0, version needed 20, flags 2, method 8,
/// DOS time `0xBC00`, DOS date `0x2198`.
pub const STANDARD_PREFIX: [u8; 16] = [
    0x50, 0x4B, 0x01, 0x02, 0x00, 0x00, 0x14, 0x00, 0x02, 0x00, 0x08, 0x00, 0x00, 0xBC, 0x98, 0x21,
];

/// Record prefix for zip64 entries (version needed 4.5).
pub const ZIP64_PREFIX: [u8; 16] = [
    0x50, 0x4B, 0x01, 0x02, 0x00, 0x00, 0x2D, 0x00, 0x02, 0x00, 0x08, 0x00, 0x00, 0xBC, 0x98, 0x21,
];

/// Builds synthesized central directory records for a member sequence.
///
/// The builder carries the zip64 layout decision from one record to the
/// next: it starts in zip64 mode when the archive exceeds 4 GiB, and once a
/// member needs zip64 fields every later record uses the zip64 prefix too.
#[derive(Debug, Clone)]
pub struct DirectoryRecordBuilder {
    zip64: bool,
}

impl DirectoryRecordBuilder {
    /// Creates a builder for an archive of the given size class.
    pub fn new(archive_is_over_4gib: bool) -> Self {
        Self {
            zip64: archive_is_over_4gib,
        }
    }

    /// Returns true if the next record will use the zip64 prefix even
    /// without overflowing fields.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Writes the record for `member`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFormat`] if the member name is longer than a
    /// 16-bit length field can describe.
    pub fn write_record<W: Write>(&mut self, member: &ZipMember, out: &mut W) -> Result<()> {
        let name = &member.entry.raw_path;
        let name_len = u16::try_from(name.len()).map_err(|_| {
            Error::InvalidFormat(format!(
                "member name is {} bytes, longer than a ZIP record allows",
                name.len()
            ))
        })?;

        let mut size = member.entry.size;
        let mut compressed_size = member.compressed_size;
        let mut header_offset = member.header_offset;
        let mut volume = member.volume;

        let mut payload = Vec::new();
        if size > ZIP64_LIMIT {
            payload.extend_from_slice(&size.to_le_bytes());
            size = ZIP64_LIMIT;
        }
        if compressed_size > ZIP64_LIMIT {
            payload.extend_from_slice(&compressed_size.to_le_bytes());
            compressed_size = ZIP64_LIMIT;
        }
        if header_offset > ZIP64_LIMIT {
            payload.extend_from_slice(&header_offset.to_le_bytes());
            header_offset = ZIP64_LIMIT;
        }
        if volume > ZIP64_VOLUME_LIMIT {
            payload.extend_from_slice(&volume.to_le_bytes());
            volume = ZIP64_VOLUME_LIMIT;
        }

        if !payload.is_empty() {
            self.zip64 = true;
        }
        let extra_len = if payload.is_empty() {
            0
        } else {
            4 + payload.len() as u16
        };

        out.write_all(if self.zip64 {
            &ZIP64_PREFIX
        } else {
            &STANDARD_PREFIX
        })?;
        out.write_all(&member.crc32.to_le_bytes())?;
        out.write_all(&(compressed_size as u32).to_le_bytes())?;
        out.write_all(&(size as u32).to_le_bytes())?;
        out.write_all(&name_len.to_le_bytes())?;
        out.write_all(&extra_len.to_le_bytes())?;
        out.write_all(&0u16.to_le_bytes())?;
        out.write_all(&(volume as u16).to_le_bytes())?;
        out.write_all(&member.internal_attr.to_le_bytes())?;
        out.write_all(&member.external_attr.to_le_bytes())?;
        out.write_all(&(header_offset as u32).to_le_bytes())?;
        out.write_all(name)?;
        if !payload.is_empty() {
            out.write_all(&ZIP64_EXTRA_ID.to_le_bytes())?;
            out.write_all(&(payload.len() as u16).to_le_bytes())?;
            out.write_all(&payload)?;
        }
        Ok(())
    }

    /// Returns the record for `member` as a byte vector.
    pub fn record(&mut self, member: &ZipMember) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(46 + member.entry.raw_path.len());
        self.write_record(member, &mut out)?;
        Ok(out)
    }
}
