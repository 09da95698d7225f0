//! TorrentZip-style ZIP signatures.
//!
//! A TorrentZip archive ends with a 22-byte trailer, `TORRENTZIPPED-`
//! followed by eight uppercase hex digits. The digits are the CRC-32 of a
//! central directory synthesized from member metadata the way a
//! canonicalizing writer would emit it, so two archives with the same
//! logical contents carry the same trailer.
//!
//! # Module Organization
//!
//! - [`central_dir`] - locates the end-of-central-directory record and walks
//!   the central directory in on-disk order
//! - [`record`] - builds the canonical synthesized directory records
//! - [`signature`] - computes, reads, writes, and verifies the trailer

pub mod central_dir;
pub mod record;
pub mod signature;

pub use central_dir::read_members;
pub use record::DirectoryRecordBuilder;
pub use signature::ZipSignature;

use crate::listing::{ArchiveEntry, ArchiveListing};

/// Largest value that fits a 32-bit central-directory slot.
pub const ZIP64_LIMIT: u64 = 0xFFFF_FFFF;

/// Largest value that fits the 16-bit disk-number slot.
pub const ZIP64_VOLUME_LIMIT: u32 = 0xFFFF;

/// One member as recorded in the central directory.
///
/// Sizes and offsets hold their true 64-bit values; zip64 sentinels are
/// resolved when the directory is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipMember {
    /// Path, size, and kind.
    pub entry: ArchiveEntry,
    /// Compressed size in bytes.
    pub compressed_size: u64,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Offset of the local file header.
    pub header_offset: u64,
    /// Disk number on which the member starts.
    pub volume: u32,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Member comment.
    pub comment: Vec<u8>,
}

impl ZipMember {
    /// Creates a member with zeroed ZIP-specific fields.
    pub fn new(entry: ArchiveEntry) -> Self {
        Self {
            entry,
            compressed_size: 0,
            crc32: 0,
            header_offset: 0,
            volume: 0,
            internal_attr: 0,
            external_attr: 0,
            comment: Vec::new(),
        }
    }

    /// Returns true if any field overflows its fixed-size directory slot.
    pub fn needs_zip64(&self) -> bool {
        self.entry.size > ZIP64_LIMIT
            || self.compressed_size > ZIP64_LIMIT
            || self.header_offset > ZIP64_LIMIT
            || self.volume > ZIP64_VOLUME_LIMIT
    }
}

/// Builds the ordered listing of a member list.
pub fn listing(members: &[ZipMember]) -> ArchiveListing {
    members.iter().map(|m| m.entry.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::EntryKind;

    #[test]
    fn test_needs_zip64_thresholds() {
        let mut member = ZipMember::new(ArchiveEntry::new("a.bin", ZIP64_LIMIT, EntryKind::File));
        assert!(!member.needs_zip64());

        member.entry.size = ZIP64_LIMIT + 1;
        assert!(member.needs_zip64());

        member.entry.size = 0;
        member.volume = ZIP64_VOLUME_LIMIT + 1;
        assert!(member.needs_zip64());
    }
}
