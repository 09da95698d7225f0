//! Central directory reading.
//!
//! Only what the signature needs is read: the end-of-central-directory
//! record (classic or zip64) and the directory entries themselves. Local
//! headers and member data are never touched.

use std::io::{Read, Seek, SeekFrom};

use crate::format::reader::ByteReader;
use crate::listing::{ArchiveEntry, EntryKind};
use crate::{Error, Result};

use super::{ZIP64_LIMIT, ZIP64_VOLUME_LIMIT, ZipMember};

/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4B50;
/// Central directory file header signature (`PK\x01\x02`).
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4B50;
/// Zip64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4B50;
/// Zip64 end of central directory record signature (`PK\x06\x06`).
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4B50;

/// Fixed size of the end of central directory record.
pub const EOCD_SIZE: u64 = 22;
/// Offset of the comment-length field within the EOCD record.
pub const EOCD_COMMENT_LEN_OFFSET: u64 = 20;
/// Size of the zip64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: u64 = 20;
/// Fixed size of a central directory file header, before variable fields.
pub const CENTRAL_HEADER_SIZE: usize = 46;
/// Header ID of the zip64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

const ZIP64_EOCD_SIZE: usize = 56;

/// Location and contents of the end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// File offset of the EOCD record.
    pub position: u64,
    /// Number of entries in the central directory.
    pub total_entries: u64,
    /// Size of the central directory in bytes.
    pub directory_size: u64,
    /// File offset of the first central directory header.
    pub directory_offset: u64,
    /// Length of the archive comment.
    pub comment_len: u16,
    /// True if the values came from a zip64 record.
    pub zip64: bool,
}

impl EndOfCentralDirectory {
    /// Returns true if the record plus its comment ends exactly at `file_len`.
    pub fn ends_at(&self, file_len: u64) -> bool {
        self.position + EOCD_SIZE + self.comment_len as u64 == file_len
    }
}

/// Locates the end of central directory record.
///
/// The scan walks backwards over the last 64 KiB + 22 bytes and takes the
/// last `PK\x05\x06` whose comment fits inside the file. Bytes after the
/// comment are tolerated, which is what an appended trailer looks like on
/// an archive whose comment length was never updated.
pub fn find_end_of_central_directory<R: Read + Seek>(
    reader: &mut R,
) -> Result<EndOfCentralDirectory> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < EOCD_SIZE {
        return Err(Error::InvalidFormat(format!(
            "file too small to be a ZIP archive: {} bytes",
            file_len
        )));
    }

    let window_len = file_len.min(EOCD_SIZE + u16::MAX as u64 + EOCD_SIZE);
    let window_start = file_len - window_len;
    reader.seek(SeekFrom::Start(window_start))?;
    let mut window = vec![0u8; window_len as usize];
    reader.read_exact(&mut window)?;

    let signature = EOCD_SIGNATURE.to_le_bytes();
    let mut candidate = window.len() - EOCD_SIZE as usize;
    loop {
        if window[candidate..candidate + 4] == signature {
            let comment_len =
                u16::from_le_bytes([window[candidate + 20], window[candidate + 21]]) as usize;
            if candidate + EOCD_SIZE as usize + comment_len <= window.len() {
                let position = window_start + candidate as u64;
                return parse_eocd(reader, &window[candidate..], position);
            }
        }
        if candidate == 0 {
            break;
        }
        candidate -= 1;
    }

    Err(Error::InvalidFormat(
        "end of central directory record not found".into(),
    ))
}

fn parse_eocd<R: Read + Seek>(
    reader: &mut R,
    record: &[u8],
    position: u64,
) -> Result<EndOfCentralDirectory> {
    let mut r = ByteReader::with_base_offset(record, position);
    r.skip(4)?;
    let _disk_number = r.u16_le()?;
    let _directory_disk = r.u16_le()?;
    let _entries_on_disk = r.u16_le()?;
    let total_entries = r.u16_le()?;
    let directory_size = r.u32_le()?;
    let directory_offset = r.u32_le()?;
    let comment_len = r.u16_le()?;

    let mut eocd = EndOfCentralDirectory {
        position,
        total_entries: total_entries as u64,
        directory_size: directory_size as u64,
        directory_offset: directory_offset as u64,
        comment_len,
        zip64: false,
    };

    if position >= ZIP64_LOCATOR_SIZE {
        if let Some(zip64_offset) = read_zip64_locator(reader, position - ZIP64_LOCATOR_SIZE)? {
            apply_zip64_record(reader, zip64_offset, &mut eocd)?;
        }
    }

    log::debug!(
        "EOCD at {}: {} entries, directory at {} ({} bytes){}",
        eocd.position,
        eocd.total_entries,
        eocd.directory_offset,
        eocd.directory_size,
        if eocd.zip64 { ", zip64" } else { "" }
    );
    Ok(eocd)
}

fn read_zip64_locator<R: Read + Seek>(reader: &mut R, position: u64) -> Result<Option<u64>> {
    let mut buf = [0u8; ZIP64_LOCATOR_SIZE as usize];
    reader.seek(SeekFrom::Start(position))?;
    reader.read_exact(&mut buf)?;

    let mut r = ByteReader::with_base_offset(&buf, position);
    if r.u32_le()? != ZIP64_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let _disk = r.u32_le()?;
    Ok(Some(r.u64_le()?))
}

fn apply_zip64_record<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    eocd: &mut EndOfCentralDirectory,
) -> Result<()> {
    let out_of_bounds = offset
        .checked_add(ZIP64_EOCD_SIZE as u64)
        .is_none_or(|end| end > eocd.position);
    if out_of_bounds {
        return Err(Error::corrupt_header(
            offset,
            "zip64 end of central directory record out of bounds",
        ));
    }

    let mut buf = [0u8; ZIP64_EOCD_SIZE];
    reader.seek(SeekFrom::Start(offset))?;
    reader.read_exact(&mut buf)?;

    let mut r = ByteReader::with_base_offset(&buf, offset);
    if r.u32_le()? != ZIP64_EOCD_SIGNATURE {
        return Err(Error::corrupt_header(
            offset,
            "bad zip64 end of central directory signature",
        ));
    }
    let _record_size = r.u64_le()?;
    let _version_made_by = r.u16_le()?;
    let _version_needed = r.u16_le()?;
    let _disk_number = r.u32_le()?;
    let _directory_disk = r.u32_le()?;
    let _entries_on_disk = r.u64_le()?;
    eocd.total_entries = r.u64_le()?;
    eocd.directory_size = r.u64_le()?;
    eocd.directory_offset = r.u64_le()?;
    eocd.zip64 = true;
    Ok(())
}

/// Reads every central directory entry in on-disk order.
pub fn read_members<R: Read + Seek>(reader: &mut R) -> Result<Vec<ZipMember>> {
    let eocd = find_end_of_central_directory(reader)?;
    read_members_at(reader, &eocd)
}

/// Reads the central directory described by `eocd`.
pub fn read_members_at<R: Read + Seek>(
    reader: &mut R,
    eocd: &EndOfCentralDirectory,
) -> Result<Vec<ZipMember>> {
    let fits = eocd
        .directory_offset
        .checked_add(eocd.directory_size)
        .is_some_and(|end| end <= eocd.position);
    if !fits {
        return Err(Error::corrupt_header(
            eocd.position,
            format!(
                "central directory ({} bytes at {}) overlaps its end record",
                eocd.directory_size, eocd.directory_offset
            ),
        ));
    }

    let max_entries = eocd.directory_size / CENTRAL_HEADER_SIZE as u64;
    if eocd.total_entries > max_entries {
        return Err(Error::corrupt_header(
            eocd.position,
            format!(
                "{} entries cannot fit in a {}-byte central directory",
                eocd.total_entries, eocd.directory_size
            ),
        ));
    }

    let mut directory = vec![0u8; eocd.directory_size as usize];
    reader.seek(SeekFrom::Start(eocd.directory_offset))?;
    reader.read_exact(&mut directory)?;

    let mut r = ByteReader::with_base_offset(&directory, eocd.directory_offset);
    let mut members = Vec::with_capacity(eocd.total_entries as usize);
    for _ in 0..eocd.total_entries {
        members.push(read_central_header(&mut r)?);
    }
    Ok(members)
}

/// Parses one central directory file header.
pub fn read_central_header(r: &mut ByteReader<'_>) -> Result<ZipMember> {
    let start = r.offset();
    if r.u32_le()? != CENTRAL_HEADER_SIGNATURE {
        return Err(Error::corrupt_header(
            start,
            "bad central directory header signature",
        ));
    }

    let _version_made_by = r.u16_le()?;
    let _version_needed = r.u16_le()?;
    let _flags = r.u16_le()?;
    let _method = r.u16_le()?;
    let _mod_time = r.u16_le()?;
    let _mod_date = r.u16_le()?;
    let crc32 = r.u32_le()?;
    let compressed_size = r.u32_le()?;
    let size = r.u32_le()?;
    let name_len = r.u16_le()? as usize;
    let extra_len = r.u16_le()? as usize;
    let comment_len = r.u16_le()? as usize;
    let volume = r.u16_le()?;
    let internal_attr = r.u16_le()?;
    let external_attr = r.u32_le()?;
    let header_offset = r.u32_le()?;

    let raw_path = r.bytes(name_len)?.to_vec();
    let extra_offset = r.offset();
    let extra = r.bytes(extra_len)?;
    let comment = r.bytes(comment_len)?.to_vec();

    let path = match String::from_utf8(raw_path.clone()) {
        Ok(path) => path,
        Err(_) => String::from_utf8_lossy(&raw_path).into_owned(),
    };
    let kind = if path.ends_with('/') {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    let mut member = ZipMember {
        entry: ArchiveEntry {
            path,
            raw_path,
            size: size as u64,
            kind,
        },
        compressed_size: compressed_size as u64,
        crc32,
        header_offset: header_offset as u64,
        volume: volume as u32,
        internal_attr,
        external_attr,
        comment,
    };
    apply_zip64_extra(&mut member, extra, extra_offset)?;
    Ok(member)
}

/// Replaces sentinel values with the true values from a zip64 extra field.
///
/// The zip64 payload only carries the fields whose fixed slot holds a
/// sentinel, in the order size, compressed size, header offset, disk.
fn apply_zip64_extra(member: &mut ZipMember, extra: &[u8], extra_offset: u64) -> Result<()> {
    let mut r = ByteReader::with_base_offset(extra, extra_offset);
    while r.remaining() >= 4 {
        let id = r.u16_le()?;
        let len = r.u16_le()? as usize;
        let payload_offset = r.offset();
        let payload = r.bytes(len)?;
        if id != ZIP64_EXTRA_ID {
            continue;
        }

        let mut p = ByteReader::with_base_offset(payload, payload_offset);
        if member.entry.size == ZIP64_LIMIT {
            member.entry.size = p.u64_le()?;
        }
        if member.compressed_size == ZIP64_LIMIT {
            member.compressed_size = p.u64_le()?;
        }
        if member.header_offset == ZIP64_LIMIT {
            member.header_offset = p.u64_le()?;
        }
        if member.volume == ZIP64_VOLUME_LIMIT {
            member.volume = p.u32_le()?;
        }
    }
    Ok(())
}
