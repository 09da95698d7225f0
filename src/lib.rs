//! # torrentsig
//!
//! Verify and regenerate the trailer signatures of TorrentZip and torrent7z
//! archives.
//!
//! Both schemes make archives reproducible: two archives built from the
//! same members end in the same signature, so catalogs can compare whole
//! files instead of re-reading every member. This crate reads the member
//! list, recomputes the signature, and checks or rewrites the trailer. It
//! never compresses or decompresses member data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use torrentsig::{ArchiveSignatureEngine, Result};
//!
//! fn main() -> Result<()> {
//!     let engine = ArchiveSignatureEngine::new();
//!     let archive = engine.open("roms/game.zip")?;
//!
//!     for entry in archive.contents().entries() {
//!         println!("{}: {} bytes", entry.path, entry.size);
//!     }
//!
//!     if archive.is_valid()? {
//!         println!("signature OK");
//!     } else {
//!         println!("signing: {}", archive.sign()?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Signature Schemes
//!
//! | Format | Trailer | Covers |
//! |--------|---------|--------|
//! | ZIP | 22 bytes, `TORRENTZIPPED-` + 8 hex digits | a canonical central directory synthesized from the member list |
//! | 7z | 38 bytes, CRC + magic + bitmask + `torrent7z_0.9beta` | the first and last 128 bytes and the archive length |
//!
//! ## Renaming Members
//!
//! Renames are delegated to an external tool (`7za rn` by default) and are
//! refused up front when they would leave members out of sorted order; an
//! archive in any other order cannot match an independent build.
//!
//! ```rust,no_run
//! use torrentsig::{ArchiveSignatureEngine, EngineOptions, Error, RenameMapping};
//!
//! let engine = ArchiveSignatureEngine::with_options(EngineOptions::new().tool("7z"));
//! let archive = engine.open("disk.7z")?;
//! let mapping: RenameMapping = "disk1.img=disk1a.img".parse()?;
//!
//! match engine.rename(archive.as_ref(), &mapping, "disk-fixed.7z") {
//!     Ok(outcome) => println!("renamed, new archive signature {}", outcome),
//!     Err(e @ Error::OrderViolation { .. }) => eprintln!("{}", e),
//!     Err(e) => return Err(e),
//! }
//! # Ok::<(), Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA/LZMA2-encoded 7z headers |
//! | `cli` | No | The `torrentsig` command-line tool |
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

/// Default buffer size for read operations (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod checksum;
pub mod engine;
pub mod error;
pub mod format;
pub mod listing;
pub mod rename;
pub mod sevenz;
pub mod zip;

pub use engine::{
    ArchiveSignatureEngine, EngineOptions, SevenZipArchive, SignOutcome, TorrentArchive, ZipArchive,
};
pub use error::{Error, Result};
pub use format::ArchiveFormat;
pub use listing::{ArchiveEntry, ArchiveListing, EntryKind};
pub use rename::{ExternalRenameTool, RenameMapping, SevenZaTool, validate_rename_order};
pub use sevenz::{ResourceLimits, SevenZipSignature, SignFlags};
pub use zip::{ZipMember, ZipSignature};
