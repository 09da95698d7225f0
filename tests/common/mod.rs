//! Shared test utilities for integration tests.
//!
//! Archives are built byte by byte here: ZIP images with stored members and
//! 7z images with COPY-packed data and a plain or encoded header. Nothing
//! else in the test suite writes archive structure.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;
use torrentsig::{Error, ExternalRenameTool, RenameMapping};

/// One member of a fixture archive.
#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    /// A regular file with contents.
    File(&'a str, &'a [u8]),
    /// A directory.
    Dir(&'a str),
}

impl<'a> Member<'a> {
    fn name(&self) -> &'a str {
        match *self {
            Member::File(name, _) | Member::Dir(name) => name,
        }
    }

    fn data(&self) -> &'a [u8] {
        match *self {
            Member::File(_, data) => data,
            Member::Dir(_) => &[],
        }
    }
}

/// Two stored text files: `a.txt` (10 bytes) and `b.txt` (20 bytes).
pub const TWO_TEXT_FILES: &[Member<'static>] = &[
    Member::File("a.txt", b"0123456789"),
    Member::File("b.txt", b"abcdefghijabcdefghij"),
];

// =============================================================================
// ZIP
// =============================================================================

/// Options for [`zip_bytes_with`].
#[derive(Debug, Clone, Default)]
pub struct ZipOptions<'a> {
    /// Archive comment stored in the end record.
    pub comment: &'a [u8],
    /// Junk bytes inserted before the first local header.
    pub prefix: &'a [u8],
}

/// Builds a ZIP archive with stored members.
pub fn zip_bytes(members: &[Member<'_>]) -> Vec<u8> {
    zip_bytes_with(members, &ZipOptions::default())
}

/// Builds a ZIP archive with stored members and the given options.
pub fn zip_bytes_with(members: &[Member<'_>], options: &ZipOptions<'_>) -> Vec<u8> {
    let mut out = options.prefix.to_vec();
    let mut central = Vec::new();

    for member in members {
        let name = member.name().as_bytes();
        let data = member.data();
        let crc = crc32fast::hash(data);
        let offset = out.len() as u32;

        // local file header
        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes()); // time
        out.extend_from_slice(&0x21u16.to_le_bytes()); // date
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(data);

        let external_attr: u32 = match member {
            Member::Dir(_) => 0x10,
            Member::File(..) => 0x20,
        };

        central.extend_from_slice(&0x02014b50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes()); // made by
        central.extend_from_slice(&20u16.to_le_bytes()); // needed
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0x21u16.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes()); // extra
        central.extend_from_slice(&0u16.to_le_bytes()); // comment
        central.extend_from_slice(&0u16.to_le_bytes()); // disk
        central.extend_from_slice(&0u16.to_le_bytes()); // internal
        central.extend_from_slice(&external_attr.to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let central_offset = out.len() as u32;
    out.extend_from_slice(&central);

    out.extend_from_slice(&0x06054b50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(members.len() as u16).to_le_bytes());
    out.extend_from_slice(&(members.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&(options.comment.len() as u16).to_le_bytes());
    out.extend_from_slice(options.comment);
    out
}

/// The canonical directory record for a member of a small archive,
/// spelled out independently of the library's record builder.
pub fn canonical_record(name: &str, data: &[u8], header_offset: u32, external_attr: u32) -> Vec<u8> {
    let mut out = vec![
        0x50, 0x4B, 0x01, 0x02, 0x00, 0x00, 0x14, 0x00, 0x02, 0x00, 0x08, 0x00, 0x00, 0xBC, 0x98,
        0x21,
    ];
    out.extend_from_slice(&crc32fast::hash(data).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // extra
    out.extend_from_slice(&0u16.to_le_bytes()); // comment
    out.extend_from_slice(&0u16.to_le_bytes()); // disk
    out.extend_from_slice(&0u16.to_le_bytes()); // internal
    out.extend_from_slice(&external_attr.to_le_bytes());
    out.extend_from_slice(&header_offset.to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out
}

// =============================================================================
// 7z
// =============================================================================

/// How the 7z header is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncoding {
    /// Plain header.
    Plain,
    /// Encoded header packed with COPY.
    Copy,
    /// Encoded header packed with LZMA2.
    #[cfg(feature = "lzma")]
    Lzma2,
}

/// Appends a 7z variable-length number.
pub fn write_number(out: &mut Vec<u8>, value: u64) {
    let mut first = 0u8;
    let mut mask = 0x80u8;
    let mut len = 0;
    while len < 8 {
        if value < (1u64 << (7 * (len + 1))) {
            first |= (value >> (8 * len)) as u8;
            break;
        }
        first |= mask;
        mask >>= 1;
        len += 1;
    }
    out.push(first);
    for i in 0..len {
        out.push((value >> (8 * i)) as u8);
    }
}

fn bit_vector(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, _) in bits.iter().enumerate().filter(|(_, b)| **b) {
        out[i / 8] |= 0x80 >> (i % 8);
    }
    out
}

fn write_property(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    write_number(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

/// Builds the plain main header for `members` whose non-empty data is
/// packed, in order, into one COPY folder.
pub fn sevenz_plain_header(members: &[Member<'_>]) -> Vec<u8> {
    let sizes: Vec<u64> = members
        .iter()
        .filter(|m| !m.data().is_empty())
        .map(|m| m.data().len() as u64)
        .collect();
    let total: u64 = sizes.iter().sum();

    let mut h = vec![0x01];
    if !sizes.is_empty() {
        h.push(0x04);
        // pack info
        h.push(0x06);
        write_number(&mut h, 0);
        write_number(&mut h, 1);
        h.push(0x09);
        write_number(&mut h, total);
        h.push(0x00);
        // unpack info: one folder, one COPY coder
        h.extend_from_slice(&[0x07, 0x0B, 0x01, 0x00, 0x01, 0x01, 0x00, 0x0C]);
        write_number(&mut h, total);
        h.push(0x00);
        // substreams
        h.extend_from_slice(&[0x08, 0x0D]);
        write_number(&mut h, sizes.len() as u64);
        if sizes.len() > 1 {
            h.push(0x09);
            for size in &sizes[..sizes.len() - 1] {
                write_number(&mut h, *size);
            }
        }
        h.push(0x00);
        h.push(0x00);
    }

    h.push(0x05);
    write_number(&mut h, members.len() as u64);

    let empty_stream: Vec<bool> = members.iter().map(|m| m.data().is_empty()).collect();
    if empty_stream.iter().any(|e| *e) {
        write_property(&mut h, 0x0E, &bit_vector(&empty_stream));
        let empty_file: Vec<bool> = members
            .iter()
            .filter(|m| m.data().is_empty())
            .map(|m| matches!(m, Member::File(..)))
            .collect();
        if empty_file.iter().any(|e| *e) {
            write_property(&mut h, 0x0F, &bit_vector(&empty_file));
        }
    }

    let mut names = vec![0u8];
    for member in members {
        for unit in member.name().encode_utf16() {
            names.extend_from_slice(&unit.to_le_bytes());
        }
        names.extend_from_slice(&[0, 0]);
    }
    write_property(&mut h, 0x11, &names);

    h.push(0x00);
    h.push(0x00);
    h
}

fn start_header(next_offset: u64, header: &[u8]) -> Vec<u8> {
    let mut out = vec![0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
    let mut tail = Vec::with_capacity(20);
    tail.extend_from_slice(&next_offset.to_le_bytes());
    tail.extend_from_slice(&(header.len() as u64).to_le_bytes());
    tail.extend_from_slice(&crc32fast::hash(header).to_le_bytes());
    out.extend_from_slice(&crc32fast::hash(&tail).to_le_bytes());
    out.extend_from_slice(&tail);
    out
}

#[cfg(feature = "lzma")]
fn lzma2_compress(data: &[u8]) -> Vec<u8> {
    use lzma_rust2::{Lzma2Options, Lzma2Writer};
    use std::io::Write;

    let mut compressed = Vec::new();
    let mut options = Lzma2Options::with_preset(5);
    options.lzma_options.dict_size = 1 << 20;
    let mut encoder = Lzma2Writer::new(&mut compressed, options);
    encoder.write_all(data).expect("compress header");
    encoder.finish().expect("finish header");
    compressed
}

/// Builds an unsigned 7z archive.
pub fn sevenz_bytes(members: &[Member<'_>]) -> Vec<u8> {
    sevenz_bytes_with(members, HeaderEncoding::Plain)
}

/// Builds an unsigned 7z archive with the given header encoding.
pub fn sevenz_bytes_with(members: &[Member<'_>], encoding: HeaderEncoding) -> Vec<u8> {
    let packed: Vec<u8> = members.iter().flat_map(|m| m.data().iter().copied()).collect();
    let plain = sevenz_plain_header(members);

    let (packed_header, coder): (Vec<u8>, Vec<u8>) = match encoding {
        HeaderEncoding::Plain => {
            let mut out = start_header(packed.len() as u64, &plain);
            out.extend_from_slice(&packed);
            out.extend_from_slice(&plain);
            return out;
        }
        HeaderEncoding::Copy => (plain.clone(), vec![0x01, 0x00]),
        #[cfg(feature = "lzma")]
        HeaderEncoding::Lzma2 => (lzma2_compress(&plain), vec![0x21, 0x21, 0x01, 16]),
    };

    let mut encoded = vec![0x17, 0x06];
    write_number(&mut encoded, packed.len() as u64);
    write_number(&mut encoded, 1);
    encoded.push(0x09);
    write_number(&mut encoded, packed_header.len() as u64);
    encoded.push(0x00);
    encoded.extend_from_slice(&[0x07, 0x0B, 0x01, 0x00, 0x01]);
    encoded.extend_from_slice(&coder);
    encoded.push(0x0C);
    write_number(&mut encoded, plain.len() as u64);
    encoded.extend_from_slice(&[0x0A, 0x01]);
    encoded.extend_from_slice(&crc32fast::hash(&plain).to_le_bytes());
    encoded.push(0x00);
    encoded.push(0x00);

    let mut out = start_header((packed.len() + packed_header.len()) as u64, &encoded);
    out.extend_from_slice(&packed);
    out.extend_from_slice(&packed_header);
    out.extend_from_slice(&encoded);
    out
}

/// The torrent7z trailer for an unsigned image, spelled out independently
/// of the library.
pub fn torrent7z_trailer(unsigned: &[u8], bitmask: u8) -> [u8; 38] {
    const MAGIC: [u8; 16] = [
        0xA9, 0xA9, 0x9F, 0xD1, 0x57, 0x08, 0xA9, 0xD7, 0xEA, 0x29, 0x64, 0xB2, 0x36, 0x1B, 0x83,
        0x28,
    ];
    let window = unsigned.len().min(128);

    let mut block = Vec::with_capacity(34);
    block.extend_from_slice(&MAGIC);
    block.push(bitmask);
    block.extend_from_slice(b"torrent7z_0.9beta");

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&unsigned[..window]);
    hasher.update(&unsigned[unsigned.len() - window..]);
    hasher.update(&(unsigned.len() as u64).to_le_bytes());
    hasher.update(&[0xFF; 4]);
    hasher.update(&block);

    let mut out = [0u8; 38];
    out[..4].copy_from_slice(&hasher.finalize().to_le_bytes());
    out[4..].copy_from_slice(&block);
    out
}

// =============================================================================
// Files
// =============================================================================

/// Writes `bytes` to `name` inside a fresh temporary directory.
pub fn write_temp(name: &str, bytes: &[u8]) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    (dir, path)
}

/// Reads a whole file.
pub fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("read fixture")
}

/// Flips one bit of the byte `from_end` positions before EOF.
pub fn flip_bit_from_end(path: &Path, from_end: usize) {
    let mut bytes = read(path);
    let index = bytes.len() - from_end;
    bytes[index] ^= 0x01;
    std::fs::write(path, bytes).expect("rewrite fixture");
}

// =============================================================================
// Rename tool
// =============================================================================

/// An owned fixture member for tools that rebuild archives.
#[derive(Debug, Clone)]
pub struct OwnedMember {
    pub name: String,
    pub data: Vec<u8>,
    pub dir: bool,
}

impl OwnedMember {
    pub fn from_members(members: &[Member<'_>]) -> Vec<Self> {
        members
            .iter()
            .map(|m| Self {
                name: m.name().to_string(),
                data: m.data().to_vec(),
                dir: matches!(m, Member::Dir(_)),
            })
            .collect()
    }

    fn as_member(&self) -> Member<'_> {
        if self.dir {
            Member::Dir(&self.name)
        } else {
            Member::File(&self.name, &self.data)
        }
    }
}

/// One recorded call of [`FakeTool::rename`].
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub mapping: String,
    /// Whether the source ended with a torrent7z trailer during the call.
    pub source_had_7z_trailer: bool,
}

/// Stand-in for `7za rn` that rebuilds the fixture with renamed members.
#[derive(Debug, Clone)]
pub struct FakeTool {
    members: Vec<OwnedMember>,
    sevenz: bool,
    available: bool,
    fail: bool,
    calls: Rc<RefCell<Vec<ToolCall>>>,
}

impl FakeTool {
    /// A tool that rebuilds `members` as a ZIP archive.
    pub fn zip(members: &[Member<'_>]) -> Self {
        Self::new(members, false)
    }

    /// A tool that rebuilds `members` as a 7z archive.
    pub fn sevenz(members: &[Member<'_>]) -> Self {
        Self::new(members, true)
    }

    fn new(members: &[Member<'_>], sevenz: bool) -> Self {
        Self {
            members: OwnedMember::from_members(members),
            sevenz,
            available: true,
            fail: false,
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Makes the probe fail.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Makes every rename exit with status 2.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Shared handle to the recorded calls.
    pub fn calls(&self) -> Rc<RefCell<Vec<ToolCall>>> {
        Rc::clone(&self.calls)
    }
}

impl ExternalRenameTool for FakeTool {
    fn name(&self) -> &str {
        "fake-7za"
    }

    fn probe(&self) -> torrentsig::Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::ExternalToolUnavailable {
                tool: self.name().to_string(),
                reason: "not installed".to_string(),
            })
        }
    }

    fn rename(&self, source: &Path, mapping: &RenameMapping, dest: &Path) -> torrentsig::Result<()> {
        self.calls.borrow_mut().push(ToolCall {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
            mapping: mapping.to_string(),
            source_had_7z_trailer: torrentsig::sevenz::signature::is_present(source)?,
        });

        if self.fail {
            return Err(Error::ExternalToolFailure {
                tool: self.name().to_string(),
                status: Some(2),
                output: "ERROR: simulated failure".to_string(),
            });
        }

        let renamed: Vec<OwnedMember> = self
            .members
            .iter()
            .map(|m| OwnedMember {
                name: mapping.get(&m.name).unwrap_or(m.name.as_str()).to_string(),
                ..m.clone()
            })
            .collect();
        let members: Vec<Member<'_>> = renamed.iter().map(OwnedMember::as_member).collect();
        let bytes = if self.sevenz {
            sevenz_bytes(&members)
        } else {
            zip_bytes(&members)
        };
        std::fs::write(dest, bytes)?;
        Ok(())
    }
}
