//! The 22-byte `TORRENTZIPPED-XXXXXXXX` trailer.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::checksum::Crc32Sink;
use crate::engine::SignOutcome;
use crate::{Error, Result};

use super::central_dir::{EOCD_COMMENT_LEN_OFFSET, find_end_of_central_directory, read_members_at};
use super::record::DirectoryRecordBuilder;
use super::{ZIP64_LIMIT, ZipMember};

/// ASCII prefix of every TorrentZip trailer.
pub const SIGNATURE_PREFIX: &[u8; 14] = b"TORRENTZIPPED-";

/// Total trailer length: prefix plus eight hex digits.
pub const SIGNATURE_LEN: usize = 22;

/// A TorrentZip trailer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZipSignature([u8; SIGNATURE_LEN]);

impl ZipSignature {
    /// Formats the trailer for a directory CRC.
    pub fn from_crc(crc: u32) -> Self {
        let mut bytes = [0u8; SIGNATURE_LEN];
        bytes[..14].copy_from_slice(SIGNATURE_PREFIX);
        bytes[14..].copy_from_slice(format!("{:08X}", crc).as_bytes());
        Self(bytes)
    }

    /// Interprets 22 trailing bytes, returning `None` unless they start with
    /// the `TORRENTZIPPED-` prefix.
    ///
    /// The hex digits are not checked; a trailer with garbage digits is
    /// present but can never be valid.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SIGNATURE_LEN] = bytes.try_into().ok()?;
        bytes.starts_with(SIGNATURE_PREFIX).then_some(Self(bytes))
    }

    /// The raw trailer bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// The CRC encoded in the hex digits, if they parse.
    pub fn crc(&self) -> Option<u32> {
        let digits = std::str::from_utf8(&self.0[14..]).ok()?;
        u32::from_str_radix(digits, 16).ok()
    }
}

impl fmt::Display for ZipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for ZipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZipSignature({})", self)
    }
}

/// Computes the trailer for a member list in on-disk order.
///
/// The result depends only on the member metadata and the size class of
/// the archive.
pub fn compute_signature(members: &[ZipMember], archive_is_over_4gib: bool) -> Result<ZipSignature> {
    let mut builder = DirectoryRecordBuilder::new(archive_is_over_4gib);
    let mut sink = Crc32Sink::new();
    for member in members {
        builder.write_record(member, &mut sink)?;
    }
    Ok(ZipSignature::from_crc(sink.crc()))
}

fn read_trailer(file: &mut File) -> Result<Option<ZipSignature>> {
    let len = file.metadata()?.len();
    if len < SIGNATURE_LEN as u64 {
        return Ok(None);
    }
    let mut buf = [0u8; SIGNATURE_LEN];
    file.seek(SeekFrom::Start(len - SIGNATURE_LEN as u64))?;
    file.read_exact(&mut buf)?;
    Ok(ZipSignature::from_bytes(&buf))
}

/// Reads the trailer stored in the last 22 bytes of the file, if any.
pub fn read_existing_signature(path: impl AsRef<Path>) -> Result<Option<ZipSignature>> {
    let mut file = File::open(path.as_ref())?;
    read_trailer(&mut file)
}

/// Returns true if the file ends with a `TORRENTZIPPED-` trailer.
pub fn is_present(path: impl AsRef<Path>) -> Result<bool> {
    Ok(read_existing_signature(path)?.is_some())
}

fn signature_for_file(file: &mut File, file_len: u64) -> Result<ZipSignature> {
    let eocd = find_end_of_central_directory(file)?;
    let members = read_members_at(file, &eocd)?;
    compute_signature(&members, file_len > ZIP64_LIMIT)
}

/// Computes the trailer the file should carry, from a fresh read of its
/// central directory.
pub fn expected_signature(path: impl AsRef<Path>) -> Result<ZipSignature> {
    let mut file = File::open(path.as_ref())?;
    let len = file.metadata()?.len();
    signature_for_file(&mut file, len)
}

/// Returns true if a trailer is present and matches the recomputed one.
pub fn is_valid(path: impl AsRef<Path>) -> Result<bool> {
    match verify(path) {
        Ok(()) => Ok(true),
        Err(e) if e.is_signature_error() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Checks the trailer, reporting why it is not valid.
///
/// # Errors
///
/// Returns [`Error::SignatureAbsent`] if there is no trailer and
/// [`Error::SignatureMismatch`] if it differs from the recomputed one.
pub fn verify(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let stored = read_trailer(&mut file)?.ok_or_else(|| Error::SignatureAbsent {
        path: path.to_path_buf(),
    })?;
    let len = file.metadata()?.len();
    let computed = signature_for_file(&mut file, len)?;

    if stored == computed {
        Ok(())
    } else {
        Err(Error::SignatureMismatch {
            path: path.to_path_buf(),
            stored: stored.to_string(),
            computed: computed.to_string(),
        })
    }
}

/// Writes the correct trailer.
///
/// A valid trailer is left alone. An invalid one is overwritten in place.
/// A missing one is appended; if the end of central directory record
/// directly precedes the end of the file with an empty comment, its
/// comment length is set to 22 so the trailer becomes the archive comment.
pub fn sign(path: impl AsRef<Path>) -> Result<SignOutcome> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();

    match read_trailer(&mut file)? {
        Some(stored) => {
            let computed = signature_for_file(&mut file, len)?;
            if stored == computed {
                log::debug!("{}: existing signature is valid, skipping", path.display());
                return Ok(SignOutcome::AlreadyValid);
            }
            log::warn!(
                "{}: signature mismatch (stored {}, computed {}), re-signing",
                path.display(),
                stored,
                computed
            );
            file.seek(SeekFrom::Start(len - SIGNATURE_LEN as u64))?;
            file.write_all(computed.as_bytes())?;
            file.flush()?;
            log::info!("{}: wrote {}", path.display(), computed);
            Ok(SignOutcome::Replaced)
        }
        None => {
            let eocd = find_end_of_central_directory(&mut file)?;
            let members = read_members_at(&mut file, &eocd)?;
            let signed_len = len + SIGNATURE_LEN as u64;
            let computed = compute_signature(&members, signed_len > ZIP64_LIMIT)?;

            if eocd.comment_len == 0 && eocd.ends_at(len) {
                file.seek(SeekFrom::Start(eocd.position + EOCD_COMMENT_LEN_OFFSET))?;
                file.write_all(&(SIGNATURE_LEN as u16).to_le_bytes())?;
            }
            file.seek(SeekFrom::End(0))?;
            file.write_all(computed.as_bytes())?;
            file.flush()?;
            log::info!("{}: no signature present, appended {}", path.display(), computed);
            Ok(SignOutcome::Added)
        }
    }
}
