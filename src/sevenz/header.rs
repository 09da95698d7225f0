//! 7z header parsing, reduced to what a member listing needs.
//!
//! The start header points at the next header, which is either a plain
//! header or an encoded one describing where the real header is packed.
//! From the main header only the streams info (for member sizes) and the
//! files info (for names and kinds) are interpreted.

use std::io::{Read, Seek, SeekFrom};

use crate::format::reader::ByteReader;
use crate::format::{SEVENZ_SIGNATURE, SIGNATURE_HEADER_SIZE, VERSION_MAJOR, attributes, property_id};
use crate::listing::{ArchiveEntry, ArchiveListing, EntryKind};
use crate::{Error, Result};

use super::decode;

/// Maximum nesting of encoded headers.
const MAX_HEADER_DEPTH: u32 = 4;

/// Maximum coders in a single folder.
const MAX_CODERS: usize = 16;

/// Limits applied while parsing headers.
///
/// Headers are attacker-controlled; counts and sizes read from them are
/// checked against these limits before anything is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of files, folders, or streams in one list.
    pub max_entries: usize,
    /// Maximum size of a header, packed or unpacked.
    pub max_header_bytes: u64,
}

impl Default for ResourceLimits {
    /// One million entries and 64 MiB of header.
    fn default() -> Self {
        Self {
            max_entries: 1_000_000,
            max_header_bytes: 64 << 20,
        }
    }
}

impl ResourceLimits {
    /// Creates the default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates limits that never trigger.
    pub fn unlimited() -> Self {
        Self {
            max_entries: usize::MAX,
            max_header_bytes: u64::MAX,
        }
    }

    /// Sets the maximum number of entries.
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Sets the maximum header size.
    pub fn max_header_bytes(mut self, max: u64) -> Self {
        self.max_header_bytes = max;
        self
    }

    pub(crate) fn check_header_size(&self, size: u64, what: &str) -> Result<()> {
        if size > self.max_header_bytes {
            return Err(Error::ResourceLimitExceeded(format!(
                "{} of {} bytes exceeds the {}-byte limit",
                what, size, self.max_header_bytes
            )));
        }
        Ok(())
    }
}

/// The fixed 32-byte header at the start of every 7z archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartHeader {
    /// Format major version.
    pub version_major: u8,
    /// Format minor version.
    pub version_minor: u8,
    /// Offset of the next header, relative to the end of the start header.
    pub next_header_offset: u64,
    /// Size of the next header.
    pub next_header_size: u64,
    /// CRC of the next header.
    pub next_header_crc: u32,
}

impl StartHeader {
    /// Parses and CRC-checks the start header.
    pub fn parse(data: &[u8; SIGNATURE_HEADER_SIZE as usize]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        if r.array::<6>()? != SEVENZ_SIGNATURE {
            return Err(Error::InvalidFormat("invalid 7z signature".into()));
        }

        let version_major = r.u8()?;
        let version_minor = r.u8()?;
        if version_major > VERSION_MAJOR {
            return Err(Error::UnsupportedFeature {
                feature: "unsupported archive version",
            });
        }

        let start_header_crc = r.u32_le()?;
        let calculated = crate::checksum::crc32(&data[12..]);
        if calculated != start_header_crc {
            return Err(Error::corrupt_header(
                8,
                format!(
                    "start header CRC mismatch: expected {:#010x}, got {:#010x}",
                    start_header_crc, calculated
                ),
            ));
        }

        Ok(Self {
            version_major,
            version_minor,
            next_header_offset: r.u64_le()?,
            next_header_size: r.u64_le()?,
            next_header_crc: r.u32_le()?,
        })
    }

    /// File position of the next header, if it does not overflow.
    pub fn next_header_position(&self) -> Option<u64> {
        SIGNATURE_HEADER_SIZE.checked_add(self.next_header_offset)
    }
}

/// One coder of a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coder {
    /// Method ID bytes, most significant first.
    pub method_id: Vec<u8>,
    /// Number of input streams.
    pub num_in_streams: u64,
    /// Number of output streams.
    pub num_out_streams: u64,
    /// Coder properties.
    pub properties: Vec<u8>,
}

impl Coder {
    /// The method ID as an integer, for comparison with [`crate::format::method_id`].
    pub fn method(&self) -> u64 {
        self.method_id
            .iter()
            .take(8)
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

/// A folder: a coder graph turning packed streams into one unpacked stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Folder {
    /// Coders in declaration order.
    pub coders: Vec<Coder>,
    /// `(in_index, out_index)` bindings between coders.
    pub bind_pairs: Vec<(u64, u64)>,
    /// Unpacked size of every coder output stream.
    pub unpack_sizes: Vec<u64>,
    /// CRC of the folder output, if recorded.
    pub unpack_crc: Option<u32>,
}

impl Folder {
    fn total_out_streams(&self) -> u64 {
        self.coders.iter().map(|c| c.num_out_streams).sum()
    }

    /// Size of the folder's final output: the one output stream no bind
    /// pair consumes.
    pub fn unpack_size(&self) -> Option<u64> {
        (0..self.unpack_sizes.len() as u64)
            .rev()
            .find(|out| !self.bind_pairs.iter().any(|(_, bound)| bound == out))
            .and_then(|out| self.unpack_sizes.get(out as usize).copied())
    }
}

/// Streams info: pack positions, folders, and per-member substream sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamsInfo {
    /// Start of the first packed stream, relative to the end of the start header.
    pub pack_pos: u64,
    /// Size of each packed stream.
    pub pack_sizes: Vec<u64>,
    /// Folder definitions.
    pub folders: Vec<Folder>,
    /// Number of members stored in each folder.
    pub substream_counts: Vec<u64>,
    /// Unpacked size of each member with data, in folder order.
    pub substream_sizes: Vec<u64>,
}

impl StreamsInfo {
    fn fill_default_substreams(&mut self) {
        if self.substream_counts.len() != self.folders.len() {
            self.substream_counts = vec![1; self.folders.len()];
        }
        if self.substream_sizes.is_empty() {
            for (folder, &count) in self.folders.iter().zip(&self.substream_counts) {
                if count == 1 {
                    self.substream_sizes.push(folder.unpack_size().unwrap_or(0));
                }
            }
        }
    }
}

/// Parser for header structures, carrying the active limits.
#[derive(Debug, Clone)]
pub struct HeaderParser {
    limits: ResourceLimits,
}

impl HeaderParser {
    /// Creates a parser with the given limits.
    pub fn new(limits: ResourceLimits) -> Self {
        Self { limits }
    }

    /// Parses a streams-info block up to and including its end marker.
    pub fn parse_streams_info(&self, r: &mut ByteReader<'_>) -> Result<StreamsInfo> {
        let mut info = StreamsInfo::default();
        loop {
            let offset = r.offset();
            match r.u8()? {
                property_id::END => break,
                property_id::PACK_INFO => self.parse_pack_info(r, &mut info)?,
                property_id::UNPACK_INFO => self.parse_unpack_info(r, &mut info)?,
                property_id::SUBSTREAMS_INFO => self.parse_substreams_info(r, &mut info)?,
                other => {
                    return Err(Error::corrupt_header(
                        offset,
                        format!("unexpected property ID in streams info: {:#x}", other),
                    ));
                }
            }
        }
        info.fill_default_substreams();
        Ok(info)
    }

    fn parse_pack_info(&self, r: &mut ByteReader<'_>, info: &mut StreamsInfo) -> Result<()> {
        info.pack_pos = r.variable_u64()?;
        let num_streams = r.count(self.limits.max_entries, "pack streams")?;
        info.pack_sizes = vec![0; num_streams];

        loop {
            let offset = r.offset();
            match r.u8()? {
                property_id::END => break,
                property_id::SIZE => {
                    for size in info.pack_sizes.iter_mut() {
                        *size = r.variable_u64()?;
                    }
                }
                property_id::CRC => {
                    let defined = r.all_or_bits(num_streams)?;
                    for _ in defined.iter().filter(|d| **d) {
                        r.u32_le()?;
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        offset,
                        format!("unexpected property ID in pack info: {:#x}", other),
                    ));
                }
            }
        }
        Ok(())
    }

    fn parse_folder(&self, r: &mut ByteReader<'_>) -> Result<Folder> {
        let num_coders = r.count(MAX_CODERS, "coders in folder")?;
        let mut folder = Folder::default();
        let mut total_in = 0u64;

        for _ in 0..num_coders {
            let flags = r.u8()?;
            let method_id = r.bytes((flags & 0x0F) as usize)?.to_vec();
            let (num_in_streams, num_out_streams) = if flags & 0x10 != 0 {
                (
                    r.count(MAX_CODERS, "coder streams")? as u64,
                    r.count(MAX_CODERS, "coder streams")? as u64,
                )
            } else {
                (1, 1)
            };
            let properties = if flags & 0x20 != 0 {
                let len = r.variable_u64()?;
                self.limits.check_header_size(len, "coder properties")?;
                r.bytes(len as usize)?.to_vec()
            } else {
                Vec::new()
            };
            if flags & 0x80 != 0 {
                return Err(Error::UnsupportedFeature {
                    feature: "alternative coder methods",
                });
            }

            total_in += num_in_streams;
            folder.coders.push(Coder {
                method_id,
                num_in_streams,
                num_out_streams,
                properties,
            });
        }

        let total_out = folder.total_out_streams();
        for _ in 0..total_out.saturating_sub(1) {
            let offset = r.offset();
            let in_index = r.variable_u64()?;
            let out_index = r.variable_u64()?;
            if in_index >= total_in || out_index >= total_out {
                return Err(Error::corrupt_header(offset, "bind pair index out of range"));
            }
            folder.bind_pairs.push((in_index, out_index));
        }

        let num_packed = total_in.saturating_sub(total_out.saturating_sub(1));
        if num_packed > 1 {
            for _ in 0..num_packed {
                r.variable_u64()?;
            }
        }
        Ok(folder)
    }

    fn parse_unpack_info(&self, r: &mut ByteReader<'_>, info: &mut StreamsInfo) -> Result<()> {
        loop {
            let offset = r.offset();
            match r.u8()? {
                property_id::END => break,
                property_id::FOLDER => {
                    let num_folders = r.count(self.limits.max_entries, "folders")?;
                    if r.u8()? != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external folder definitions",
                        });
                    }
                    info.folders = (0..num_folders)
                        .map(|_| self.parse_folder(r))
                        .collect::<Result<_>>()?;
                }
                property_id::CODERS_UNPACK_SIZE => {
                    for folder in info.folders.iter_mut() {
                        folder.unpack_sizes = (0..folder.total_out_streams())
                            .map(|_| r.variable_u64())
                            .collect::<Result<_>>()?;
                    }
                }
                property_id::CRC => {
                    let defined = r.all_or_bits(info.folders.len())?;
                    for (folder, has_crc) in info.folders.iter_mut().zip(defined) {
                        if has_crc {
                            folder.unpack_crc = Some(r.u32_le()?);
                        }
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        offset,
                        format!("unexpected property ID in unpack info: {:#x}", other),
                    ));
                }
            }
        }
        Ok(())
    }

    fn parse_substreams_info(&self, r: &mut ByteReader<'_>, info: &mut StreamsInfo) -> Result<()> {
        let mut counts = vec![1u64; info.folders.len()];
        let mut sizes_read = false;

        loop {
            let offset = r.offset();
            match r.u8()? {
                property_id::END => break,
                property_id::NUM_UNPACK_STREAM => {
                    let mut total = 0u64;
                    for count in counts.iter_mut() {
                        *count = r.variable_u64()?;
                        total = total.saturating_add(*count);
                    }
                    if total > self.limits.max_entries as u64 {
                        return Err(Error::ResourceLimitExceeded(format!(
                            "too many substreams: {}",
                            total
                        )));
                    }
                }
                property_id::SIZE => {
                    info.substream_sizes.clear();
                    for (folder, &count) in info.folders.iter().zip(&counts) {
                        if count == 0 {
                            continue;
                        }
                        let mut remaining = folder.unpack_size().unwrap_or(0);
                        for _ in 1..count {
                            let size = r.variable_u64()?;
                            info.substream_sizes.push(size);
                            remaining = remaining.saturating_sub(size);
                        }
                        info.substream_sizes.push(remaining);
                    }
                    sizes_read = true;
                }
                property_id::CRC => {
                    let needing_crc: u64 = info
                        .folders
                        .iter()
                        .zip(&counts)
                        .filter(|(folder, count)| **count != 1 || folder.unpack_crc.is_none())
                        .map(|(_, count)| *count)
                        .sum();
                    let defined = r.all_or_bits(needing_crc as usize)?;
                    for _ in defined.iter().filter(|d| **d) {
                        r.u32_le()?;
                    }
                }
                other => {
                    return Err(Error::corrupt_header(
                        offset,
                        format!("unexpected property ID in substreams info: {:#x}", other),
                    ));
                }
            }
        }

        if !sizes_read {
            info.substream_sizes = info
                .folders
                .iter()
                .zip(&counts)
                .filter(|(_, count)| **count == 1)
                .map(|(folder, _)| folder.unpack_size().unwrap_or(0))
                .collect();
        }
        info.substream_counts = counts;
        Ok(())
    }

    /// Parses a main header (after its `HEADER` marker) into a listing.
    pub fn parse_main_header(&self, r: &mut ByteReader<'_>) -> Result<ArchiveListing> {
        let mut streams = StreamsInfo::default();
        let mut listing = None;

        loop {
            let offset = r.offset();
            match r.u8()? {
                property_id::END => break,
                property_id::ARCHIVE_PROPERTIES => skip_archive_properties(r)?,
                property_id::ADDITIONAL_STREAMS_INFO => {
                    return Err(Error::UnsupportedFeature {
                        feature: "additional streams",
                    });
                }
                property_id::MAIN_STREAMS_INFO => streams = self.parse_streams_info(r)?,
                property_id::FILES_INFO => listing = Some(self.parse_files_info(r, &streams)?),
                other => {
                    return Err(Error::corrupt_header(
                        offset,
                        format!("unexpected property ID in header: {:#x}", other),
                    ));
                }
            }
        }
        Ok(listing.unwrap_or_default())
    }

    fn parse_files_info(&self, r: &mut ByteReader<'_>, streams: &StreamsInfo) -> Result<ArchiveListing> {
        let num_files = r.count(self.limits.max_entries, "files")?;
        let mut names = vec![String::new(); num_files];
        let mut empty_stream = vec![false; num_files];
        let mut empty_file = Vec::new();
        let mut anti = Vec::new();
        let mut attrs: Vec<Option<u32>> = vec![None; num_files];

        loop {
            let prop = r.u8()?;
            if prop == property_id::END {
                break;
            }
            let size = r.variable_u64()?;
            if size > r.remaining() as u64 {
                return Err(Error::corrupt_header(
                    r.offset(),
                    format!("file property {:#x} of {} bytes runs past the header", prop, size),
                ));
            }
            let base = r.offset();
            let mut p = ByteReader::with_base_offset(r.bytes(size as usize)?, base);
            let num_empty = empty_stream.iter().filter(|e| **e).count();

            match prop {
                property_id::NAME => {
                    if p.u8()? != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external file names",
                        });
                    }
                    for name in names.iter_mut() {
                        *name = read_utf16le_name(&mut p)?;
                    }
                }
                property_id::EMPTY_STREAM => empty_stream = p.bool_vector(num_files)?,
                property_id::EMPTY_FILE => empty_file = p.bool_vector(num_empty)?,
                property_id::ANTI => anti = p.bool_vector(num_empty)?,
                property_id::WIN_ATTRIBUTES => {
                    let defined = p.all_or_bits(num_files)?;
                    if p.u8()? != 0 {
                        return Err(Error::UnsupportedFeature {
                            feature: "external attributes",
                        });
                    }
                    for (attr, has_attr) in attrs.iter_mut().zip(defined) {
                        if has_attr {
                            *attr = Some(p.u32_le()?);
                        }
                    }
                }
                _ => log::trace!("skipping file property {:#x} ({} bytes)", prop, size),
            }
        }

        let mut listing = ArchiveListing::new();
        let mut sizes = streams.substream_sizes.iter().copied();
        let mut empty_index = 0usize;

        for (i, name) in names.into_iter().enumerate() {
            let (size, is_empty_file, is_anti) = if empty_stream[i] {
                let flags = (
                    0,
                    empty_file.get(empty_index).copied().unwrap_or(false),
                    anti.get(empty_index).copied().unwrap_or(false),
                );
                empty_index += 1;
                flags
            } else {
                let size = sizes.next().ok_or_else(|| {
                    Error::InvalidFormat(format!("no stream size for member {}", name))
                })?;
                (size, false, false)
            };

            if is_anti {
                log::warn!("Anti-item in archive, skipping: {}", name);
                listing.push_skipped(name);
                continue;
            }

            match classify(attrs[i], empty_stream[i], is_empty_file) {
                Some(kind) => listing.push(ArchiveEntry::new(name, size, kind)),
                None => {
                    log::warn!("Unknown filetype in archive, skipping: {}", name);
                    listing.push_skipped(name);
                }
            }
        }
        Ok(listing)
    }
}

/// Decides the kind of a member; `None` for special files.
fn classify(attr: Option<u32>, empty_stream: bool, empty_file: bool) -> Option<EntryKind> {
    const S_IFMT: u32 = 0o170000;
    const S_IFDIR: u32 = 0o040000;
    const S_IFREG: u32 = 0o100000;

    if let Some(attr) = attr.filter(|a| a & attributes::UNIX_EXTENSION != 0) {
        match (attr >> 16) & S_IFMT {
            S_IFDIR => return Some(EntryKind::Directory),
            S_IFREG => return Some(EntryKind::File),
            0 => {}
            _ => return None,
        }
    }

    let dir_attr = attr.is_some_and(|a| a & attributes::DIRECTORY != 0);
    if dir_attr || (empty_stream && !empty_file) {
        Some(EntryKind::Directory)
    } else {
        Some(EntryKind::File)
    }
}

fn skip_archive_properties(r: &mut ByteReader<'_>) -> Result<()> {
    loop {
        if r.u8()? == property_id::END {
            return Ok(());
        }
        let size = r.variable_u64()?;
        if size > r.remaining() as u64 {
            return Err(Error::corrupt_header(r.offset(), "archive property runs past the header"));
        }
        r.skip(size as usize)?;
    }
}

fn read_utf16le_name(r: &mut ByteReader<'_>) -> Result<String> {
    let mut units = Vec::new();
    loop {
        let unit = r.u16_le()?;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    String::from_utf16(&units)
        .map_err(|_| Error::corrupt_header(r.offset(), "file name is not valid UTF-16"))
}

/// Reads the start header and the main header, returning the member listing.
pub fn read_listing<R: Read + Seek>(reader: &mut R, limits: &ResourceLimits) -> Result<ArchiveListing> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < SIGNATURE_HEADER_SIZE {
        return Err(Error::InvalidFormat(format!(
            "file too small to be a 7z archive: {} bytes",
            file_len
        )));
    }

    let mut start = [0u8; SIGNATURE_HEADER_SIZE as usize];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut start)?;
    let start_header = StartHeader::parse(&start)?;

    if start_header.next_header_size == 0 {
        return Ok(ArchiveListing::new());
    }
    limits.check_header_size(start_header.next_header_size, "next header")?;

    let position = start_header
        .next_header_position()
        .filter(|pos| {
            pos.checked_add(start_header.next_header_size)
                .is_some_and(|end| end <= file_len)
        })
        .ok_or_else(|| {
            Error::corrupt_header(
                SIGNATURE_HEADER_SIZE,
                format!(
                    "next header ({} bytes at offset {}) lies outside the file",
                    start_header.next_header_size, start_header.next_header_offset
                ),
            )
        })?;

    let mut header = vec![0u8; start_header.next_header_size as usize];
    reader.seek(SeekFrom::Start(position))?;
    reader.read_exact(&mut header)?;

    let crc = crate::checksum::crc32(&header);
    if crc != start_header.next_header_crc {
        return Err(Error::corrupt_header(
            position,
            format!(
                "next header CRC mismatch: expected {:#010x}, got {:#010x}",
                start_header.next_header_crc, crc
            ),
        ));
    }

    let parser = HeaderParser::new(*limits);
    let mut base = position;
    for _ in 0..MAX_HEADER_DEPTH {
        let mut r = ByteReader::with_base_offset(&header, base);
        match r.u8()? {
            property_id::HEADER => return parser.parse_main_header(&mut r),
            property_id::ENCODED_HEADER => {
                let streams = parser.parse_streams_info(&mut r)?;
                let decoded = decode::decode_header(reader, &streams, limits)?;
                log::debug!(
                    "decoded {}-byte header from {} packed bytes",
                    decoded.len(),
                    streams.pack_sizes.iter().sum::<u64>()
                );
                base = SIGNATURE_HEADER_SIZE + streams.pack_pos;
                header = decoded;
            }
            other => {
                return Err(Error::corrupt_header(
                    base,
                    format!("expected header marker, got {:#x}", other),
                ));
            }
        }
    }

    Err(Error::ResourceLimitExceeded(
        "maximum encoded header depth exceeded".into(),
    ))
}
