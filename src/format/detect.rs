//! Archive format detection.
//!
//! The file extension decides first, as archive catalogs name their files
//! consistently; magic bytes are consulted only when the extension is
//! missing or unfamiliar.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{Error, Result};

/// Archive family handled by a signature codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// ZIP archive signed with a 22-byte `TORRENTZIPPED-` trailer.
    Zip,
    /// 7z archive signed with a 38-byte torrent7z trailer.
    SevenZip,
}

impl ArchiveFormat {
    /// Returns the typical file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::SevenZip => "7z",
        }
    }

    /// Returns a human-readable name for this format.
    pub fn name(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "TorrentZip",
            ArchiveFormat::SevenZip => "torrent7z",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Known leading signatures.
const SIGNATURES: &[(&[u8], ArchiveFormat)] = &[
    // 7z: '7' 'z' 0xBC 0xAF 0x27 0x1C
    (&super::SEVENZ_SIGNATURE, ArchiveFormat::SevenZip),
    // ZIP: 'P' 'K' 0x03 0x04 (local file header)
    (&[0x50, 0x4B, 0x03, 0x04], ArchiveFormat::Zip),
    // ZIP: 'P' 'K' 0x05 0x06 (empty archive)
    (&[0x50, 0x4B, 0x05, 0x06], ArchiveFormat::Zip),
];

/// Detects the format from a file extension (case-insensitive).
///
/// ```rust
/// use torrentsig::format::detect::{ArchiveFormat, detect_format_from_extension};
///
/// assert_eq!(detect_format_from_extension("7z"), Some(ArchiveFormat::SevenZip));
/// assert_eq!(detect_format_from_extension("ZIP"), Some(ArchiveFormat::Zip));
/// assert_eq!(detect_format_from_extension("rar"), None);
/// ```
pub fn detect_format_from_extension(extension: &str) -> Option<ArchiveFormat> {
    match extension.to_ascii_lowercase().as_str() {
        "7z" => Some(ArchiveFormat::SevenZip),
        "zip" => Some(ArchiveFormat::Zip),
        _ => None,
    }
}

/// Detects the format from the leading magic bytes of a reader.
///
/// The reader position is restored afterwards.
pub fn detect_format_from_magic<R: Read + Seek>(reader: &mut R) -> Result<Option<ArchiveFormat>> {
    let start_pos = reader.stream_position()?;

    let mut header = [0u8; 8];
    let mut filled = 0;
    while filled < header.len() {
        let n = reader.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    reader.seek(SeekFrom::Start(start_pos))?;

    Ok(SIGNATURES
        .iter()
        .find(|(signature, _)| header[..filled].starts_with(signature))
        .map(|(_, format)| *format))
}

/// Detects the format of the archive at `path`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] when neither the extension nor the
/// content identifies a ZIP or 7z archive, and [`Error::Io`] when the file
/// has to be sniffed but cannot be read.
pub fn detect_path(path: &Path) -> Result<ArchiveFormat> {
    if let Some(format) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(detect_format_from_extension)
    {
        return Ok(format);
    }

    let mut file = File::open(path)?;
    detect_format_from_magic(&mut file)?.ok_or_else(|| Error::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_detect_7z_signature() {
        let data = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
        let format = detect_format_from_magic(&mut Cursor::new(&data)).unwrap();
        assert_eq!(format, Some(ArchiveFormat::SevenZip));
    }

    #[test]
    fn test_detect_zip_signatures() {
        let local = [0x50, 0x4B, 0x03, 0x04, 0x14, 0x00];
        let empty = [0x50, 0x4B, 0x05, 0x06, 0x00, 0x00];
        assert_eq!(
            detect_format_from_magic(&mut Cursor::new(&local)).unwrap(),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            detect_format_from_magic(&mut Cursor::new(&empty)).unwrap(),
            Some(ArchiveFormat::Zip)
        );
    }

    #[test]
    fn test_detect_unknown_and_short() {
        let rar = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00, 0x00];
        assert_eq!(detect_format_from_magic(&mut Cursor::new(&rar)).unwrap(), None);
        assert_eq!(detect_format_from_magic(&mut Cursor::new(b"PK")).unwrap(), None);
        assert_eq!(detect_format_from_magic(&mut Cursor::new(b"")).unwrap(), None);
    }

    #[test]
    fn test_reader_position_restored() {
        let data = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00, 0x04];
        let mut cursor = Cursor::new(&data);
        cursor.seek(SeekFrom::Start(2)).unwrap();
        detect_format_from_magic(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_extension_wins_over_content() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mislabeled.zip");
        std::fs::write(&path, super::super::SEVENZ_SIGNATURE).unwrap();
        assert_eq!(detect_path(&path).unwrap(), ArchiveFormat::Zip);
    }

    #[test]
    fn test_content_fallback_and_unsupported() {
        let dir = tempfile::TempDir::new().unwrap();

        let sniffed = dir.path().join("no_extension");
        std::fs::write(&sniffed, [0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0]).unwrap();
        assert_eq!(detect_path(&sniffed).unwrap(), ArchiveFormat::Zip);

        let unknown = dir.path().join("notes.txt");
        std::fs::write(&unknown, b"plain text").unwrap();
        assert!(matches!(
            detect_path(&unknown),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_format_display() {
        assert_eq!(ArchiveFormat::Zip.to_string(), "TorrentZip");
        assert_eq!(ArchiveFormat::SevenZip.extension(), "7z");
    }
}
