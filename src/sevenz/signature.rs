//! The 38-byte torrent7z trailer.
//!
//! ```text
//! +--------+------------------+---------+---------------------+
//! | CRC32  | magic (16 bytes) | bitmask | "torrent7z_0.9beta" |
//! | LE u32 |                  | 1 byte  | 17 bytes            |
//! +--------+------------------+---------+---------------------+
//! ```
//!
//! The CRC covers the first 128 bytes of the archive, the 128 bytes before
//! the trailer, the archive length as a little-endian u64, four `0xFF`
//! bytes, and the 34-byte block that follows the CRC.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::checksum::Crc32;
use crate::engine::SignOutcome;
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::{Error, Result};

/// Fixed magic at the start of the signature block.
pub const MAGIC: [u8; 16] = [
    0xA9, 0x9F, 0xD1, 0x57, 0x08, 0xA9, 0xD7, 0xEA, 0x29, 0x64, 0xB2, 0x36, 0x1B, 0x83, 0x52, 0x33,
];

/// ASCII tag closing every trailer.
pub const TAG: &[u8; 17] = b"torrent7z_0.9beta";

/// Total trailer length.
pub const SIGNATURE_LEN: usize = 38;

/// Bytes hashed from each end of the archive.
pub const WINDOW_LEN: usize = 128;

const BLOCK_LEN: usize = SIGNATURE_LEN - 4;

/// Options encoded in the trailer bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignFlags {
    /// Member names are stored as Unicode.
    pub unicode: bool,
    /// Member names were stripped.
    pub strip_filenames: bool,
}

impl Default for SignFlags {
    fn default() -> Self {
        Self {
            unicode: true,
            strip_filenames: false,
        }
    }
}

impl SignFlags {
    /// The bitmask byte for an archive with the given single-file status.
    pub fn bitmask(&self, single_file: bool) -> u8 {
        let mut mask = 0;
        if self.unicode {
            mask |= 1;
        }
        if single_file {
            mask |= 2;
        }
        if self.strip_filenames {
            mask |= 4;
        }
        mask
    }
}

/// A torrent7z trailer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SevenZipSignature([u8; SIGNATURE_LEN]);

impl SevenZipSignature {
    /// Interprets 38 trailing bytes, returning `None` unless they end with
    /// the torrent7z tag.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; SIGNATURE_LEN] = bytes.try_into().ok()?;
        bytes.ends_with(TAG).then_some(Self(bytes))
    }

    /// The raw trailer bytes.
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// The stored CRC.
    pub fn crc(&self) -> u32 {
        u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The bitmask byte.
    pub fn bitmask(&self) -> u8 {
        self.0[4 + MAGIC.len()]
    }
}

impl fmt::Debug for SevenZipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SevenZipSignature")
            .field("crc", &format_args!("{:08X}", self.crc()))
            .field("bitmask", &self.bitmask())
            .finish()
    }
}

impl fmt::Display for SevenZipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}/{}", self.crc(), self.bitmask())
    }
}

/// Computes the trailer from the archive's head and tail bytes.
///
/// `first` and `last` are normally 128 bytes each; shorter slices are
/// hashed as given. `filesize` is the archive length without a trailer.
pub fn compute_signature(
    first: &[u8],
    last: &[u8],
    filesize: u64,
    single_file: bool,
    flags: SignFlags,
) -> SevenZipSignature {
    let mut block = [0u8; BLOCK_LEN];
    block[..MAGIC.len()].copy_from_slice(&MAGIC);
    block[MAGIC.len()] = flags.bitmask(single_file);
    block[MAGIC.len() + 1..].copy_from_slice(TAG);

    let mut crc = Crc32::new();
    crc.update(first);
    crc.update(last);
    crc.update(&filesize.to_le_bytes());
    crc.update(&[0xFF; 4]);
    crc.update(&block);

    let mut bytes = [0u8; SIGNATURE_LEN];
    bytes[..4].copy_from_slice(&crc.finalize().to_le_bytes());
    bytes[4..].copy_from_slice(&block);
    SevenZipSignature(bytes)
}

fn read_trailer(file: &mut File, len: u64) -> Result<Option<SevenZipSignature>> {
    if len < SIGNATURE_LEN as u64 {
        return Ok(None);
    }
    let mut buf = [0u8; SIGNATURE_LEN];
    file.seek(SeekFrom::Start(len - SIGNATURE_LEN as u64))?;
    file.read_exact(&mut buf)?;
    Ok(SevenZipSignature::from_bytes(&buf))
}

/// Reads the head window and the window ending at `body_len`.
fn read_windows(file: &mut File, body_len: u64) -> Result<(Vec<u8>, Vec<u8>)> {
    if body_len < SIGNATURE_HEADER_SIZE {
        return Err(Error::InvalidFormat(format!(
            "file too small to be a 7z archive: {} bytes",
            body_len
        )));
    }

    let head_len = body_len.min(WINDOW_LEN as u64) as usize;
    let mut first = vec![0u8; head_len];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut first)?;

    let tail_start = body_len.saturating_sub(WINDOW_LEN as u64);
    let mut last = vec![0u8; (body_len - tail_start) as usize];
    file.seek(SeekFrom::Start(tail_start))?;
    file.read_exact(&mut last)?;

    Ok((first, last))
}

fn signature_for_body(
    file: &mut File,
    body_len: u64,
    single_file: bool,
    flags: SignFlags,
) -> Result<SevenZipSignature> {
    let (first, last) = read_windows(file, body_len)?;
    Ok(compute_signature(&first, &last, body_len, single_file, flags))
}

/// Reads the trailer stored in the last 38 bytes of the file, if any.
pub fn read_existing_signature(path: impl AsRef<Path>) -> Result<Option<SevenZipSignature>> {
    let mut file = File::open(path.as_ref())?;
    let len = file.metadata()?.len();
    read_trailer(&mut file, len)
}

/// Returns true if the file ends with a torrent7z trailer.
pub fn is_present(path: impl AsRef<Path>) -> Result<bool> {
    Ok(read_existing_signature(path)?.is_some())
}

/// Checks the trailer, reporting why it is not valid.
///
/// # Errors
///
/// Returns [`Error::SignatureAbsent`] if there is no trailer and
/// [`Error::SignatureMismatch`] if it differs from the recomputed one.
pub fn verify(path: impl AsRef<Path>, single_file: bool, flags: SignFlags) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let stored = read_trailer(&mut file, len)?.ok_or_else(|| Error::SignatureAbsent {
        path: path.to_path_buf(),
    })?;

    let computed = signature_for_body(&mut file, len - SIGNATURE_LEN as u64, single_file, flags)?;
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

/// Returns true if a trailer is present and matches the recomputed one.
pub fn is_valid(path: impl AsRef<Path>, single_file: bool, flags: SignFlags) -> Result<bool> {
    match verify(path, single_file, flags) {
        Ok(()) => Ok(true),
        Err(e) if e.is_signature_error() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Removes the trailer by truncating the file by exactly 38 bytes.
///
/// # Errors
///
/// Returns [`Error::SignatureAbsent`] without touching the file if no
/// trailer is present.
pub fn strip(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    if read_trailer(&mut file, len)?.is_none() {
        return Err(Error::SignatureAbsent {
            path: path.to_path_buf(),
        });
    }

    file.set_len(len - SIGNATURE_LEN as u64)?;
    log::info!("{}: stripped signature", path.display());
    Ok(())
}

/// Appends a fresh trailer, replacing any existing one, then re-verifies.
///
/// An existing trailer is always stripped and rewritten; the outcome
/// reports whether it was missing, stale, or already correct.
///
/// # Errors
///
/// Returns [`Error::SelfCheckFailed`] if the freshly written trailer does
/// not verify.
pub fn sign(path: impl AsRef<Path>, single_file: bool, flags: SignFlags) -> Result<SignOutcome> {
    let path = path.as_ref();
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let file_len = file.metadata()?.len();

    let previous = read_trailer(&mut file, file_len)?;
    let len = match previous {
        Some(_) => file_len - SIGNATURE_LEN as u64,
        None => file_len,
    };
    // computed before truncating, so a failure leaves the old trailer in place
    let signature = signature_for_body(&mut file, len, single_file, flags)?;
    if previous.is_some() {
        log::warn!(
            "{}: archive already has a signature, stripping it before signing",
            path.display()
        );
        file.set_len(len)?;
    }

    let outcome = match previous {
        Some(previous) if previous == signature => SignOutcome::AlreadyValid,
        Some(_) => SignOutcome::Replaced,
        None => SignOutcome::Added,
    };
    file.seek(SeekFrom::Start(len))?;
    file.write_all(signature.as_bytes())?;
    file.flush()?;
    drop(file);
    log::info!("{}: wrote signature {}", path.display(), signature);

    match verify(path, single_file, flags) {
        Ok(()) => Ok(outcome),
        Err(e) if e.is_signature_error() => Err(Error::SelfCheckFailed {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmask() {
        let flags = SignFlags::default();
        assert_eq!(flags.bitmask(false), 1);
        assert_eq!(flags.bitmask(true), 3);

        let all = SignFlags {
            unicode: true,
            strip_filenames: true,
        };
        assert_eq!(all.bitmask(true), 7);

        let none = SignFlags {
            unicode: false,
            strip_filenames: false,
        };
        assert_eq!(none.bitmask(false), 0);
    }

    #[test]
    fn test_signature_layout() {
        let first = [0x11u8; 128];
        let last = [0x22u8; 128];
        let sig = compute_signature(&first, &last, 1000, true, SignFlags::default());
        let bytes = sig.as_bytes();

        assert_eq!(&bytes[4..20], &MAGIC);
        assert_eq!(bytes[20], 3);
        assert_eq!(&bytes[21..], TAG);

        let mut expected = Vec::new();
        expected.extend_from_slice(&first);
        expected.extend_from_slice(&last);
        expected.extend_from_slice(&1000u64.to_le_bytes());
        expected.extend_from_slice(&[0xFF; 4]);
        expected.extend_from_slice(&bytes[4..]);
        assert_eq!(sig.crc(), crate::checksum::crc32(&expected));
    }

    #[test]
    fn test_compute_is_deterministic() {
        let a = compute_signature(b"head", b"tail", 8, false, SignFlags::default());
        let b = compute_signature(b"head", b"tail", 8, false, SignFlags::default());
        assert_eq!(a, b);

        let other_size = compute_signature(b"head", b"tail", 9, false, SignFlags::default());
        assert_ne!(a, other_size);
    }

    #[test]
    fn test_sign_failure_keeps_old_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.7z");
        let body = [0x37u8; 10];
        let trailer = compute_signature(&body, &body, 10, false, SignFlags::default());
        let mut data = body.to_vec();
        data.extend_from_slice(trailer.as_bytes());
        std::fs::write(&path, &data).unwrap();

        let err = sign(&path, false, SignFlags::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[test]
    fn test_from_bytes_requires_tag() {
        let sig = compute_signature(b"x", b"y", 1, false, SignFlags::default());
        assert_eq!(SevenZipSignature::from_bytes(sig.as_bytes()), Some(sig));

        let mut broken = *sig.as_bytes();
        broken[37] = b'X';
        assert_eq!(SevenZipSignature::from_bytes(&broken), None);
        assert_eq!(SevenZipSignature::from_bytes(&broken[1..]), None);
    }
}
