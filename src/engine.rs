//! The uniform entry point over both signature schemes.
//!
//! [`ArchiveSignatureEngine::open`] picks a codec for a path and returns it
//! behind the [`TorrentArchive`] trait. Renames go through the engine, which
//! owns the external tool and sequences validation, the tool run, and the
//! re-signing of both archives.
//!
//! # Example
//!
//! ```rust,no_run
//! use torrentsig::{ArchiveSignatureEngine, RenameMapping};
//!
//! let engine = ArchiveSignatureEngine::new();
//! let archive = engine.open("roms/game.7z")?;
//! for entry in archive.contents().entries() {
//!     println!("{} {}", entry.kind.as_str(), entry.path);
//! }
//!
//! if !archive.is_valid()? {
//!     archive.sign()?;
//! }
//!
//! let mapping: RenameMapping = "game.bin=game (v1.1).bin".parse()?;
//! engine.rename(archive.as_ref(), &mapping, "roms/game (v1.1).7z")?;
//! # Ok::<(), torrentsig::Error>(())
//! ```

use std::cell::OnceCell;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::format::ArchiveFormat;
use crate::format::detect::detect_path;
use crate::listing::ArchiveListing;
use crate::rename::{self, ExternalRenameTool, RenameMapping, SevenZaTool};
use crate::sevenz::{self, ResourceLimits, SignFlags};
use crate::zip;
use crate::{Error, Result};

/// What a `sign` call did to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignOutcome {
    /// The stored signature was already correct.
    AlreadyValid,
    /// No signature was present; one was appended.
    Added,
    /// A stale signature was overwritten.
    Replaced,
}

impl SignOutcome {
    /// Short lowercase label.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutcome::AlreadyValid => "already-valid",
            SignOutcome::Added => "added",
            SignOutcome::Replaced => "replaced",
        }
    }
}

impl fmt::Display for SignOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine configuration.
///
/// ```rust
/// use torrentsig::{EngineOptions, ResourceLimits};
///
/// let options = EngineOptions::new()
///     .tool("/opt/p7zip/bin/7za")
///     .limits(ResourceLimits::new().max_entries(10_000));
/// assert!(options.unicode);
/// ```
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Program run to rename members.
    pub tool: OsString,
    /// Sets the unicode bit of 7z signatures.
    pub unicode: bool,
    /// Sets the strip-filenames bit of 7z signatures.
    pub strip_filenames: bool,
    /// Limits applied while reading 7z headers.
    pub limits: ResourceLimits,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tool: SevenZaTool::DEFAULT_PROGRAM.into(),
            unicode: true,
            strip_filenames: false,
            limits: ResourceLimits::default(),
        }
    }
}

impl EngineOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rename tool program.
    pub fn tool(mut self, program: impl Into<OsString>) -> Self {
        self.tool = program.into();
        self
    }

    /// Sets the 7z unicode bit.
    pub fn unicode(mut self, unicode: bool) -> Self {
        self.unicode = unicode;
        self
    }

    /// Sets the 7z strip-filenames bit.
    pub fn strip_filenames(mut self, strip_filenames: bool) -> Self {
        self.strip_filenames = strip_filenames;
        self
    }

    /// Sets the 7z header limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    fn sign_flags(&self) -> SignFlags {
        SignFlags {
            unicode: self.unicode,
            strip_filenames: self.strip_filenames,
        }
    }
}

/// One opened archive and its signature operations.
///
/// The listing is read once by [`ArchiveSignatureEngine::open`]; every
/// other call opens the file afresh and closes it before returning.
pub trait TorrentArchive: fmt::Debug {
    /// Path the archive was opened from.
    fn path(&self) -> &Path;

    /// Which signature scheme applies.
    fn format(&self) -> ArchiveFormat;

    /// Members in on-disk order.
    fn contents(&self) -> &ArchiveListing;

    /// Returns true if a trailer is present, valid or not.
    fn is_signed(&self) -> Result<bool>;

    /// Returns true if a trailer is present and correct.
    fn is_valid(&self) -> Result<bool>;

    /// Like [`is_valid`][Self::is_valid], with the reason on failure.
    fn verify(&self) -> Result<()>;

    /// Writes the correct trailer.
    fn sign(&self) -> Result<SignOutcome>;

    /// Removes the trailer.
    fn strip(&self) -> Result<()>;
}

/// A TorrentZip archive.
#[derive(Debug)]
pub struct ZipArchive {
    path: PathBuf,
    listing: ArchiveListing,
}

impl ZipArchive {
    /// Reads the central directory of `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let members = zip::read_members(&mut file)?;
        log::debug!("{}: {} central directory entries", path.display(), members.len());
        Ok(Self {
            path: path.to_path_buf(),
            listing: zip::listing(&members),
        })
    }
}

impl TorrentArchive for ZipArchive {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn contents(&self) -> &ArchiveListing {
        &self.listing
    }

    fn is_signed(&self) -> Result<bool> {
        zip::signature::is_present(&self.path)
    }

    fn is_valid(&self) -> Result<bool> {
        zip::signature::is_valid(&self.path)
    }

    fn verify(&self) -> Result<()> {
        zip::signature::verify(&self.path)
    }

    fn sign(&self) -> Result<SignOutcome> {
        zip::signature::sign(&self.path)
    }

    fn strip(&self) -> Result<()> {
        Err(Error::UnsupportedFeature {
            feature: "stripping a TorrentZip signature",
        })
    }
}

/// A torrent7z archive.
#[derive(Debug)]
pub struct SevenZipArchive {
    path: PathBuf,
    listing: ArchiveListing,
    flags: SignFlags,
}

impl SevenZipArchive {
    /// Reads the header of `path`.
    pub fn open(path: impl AsRef<Path>, flags: SignFlags, limits: &ResourceLimits) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let listing = sevenz::read_listing(&mut file, limits)?;
        log::debug!(
            "{}: {} directories, {} files",
            path.display(),
            listing.dir_count(),
            listing.file_count()
        );
        Ok(Self {
            path: path.to_path_buf(),
            listing,
            flags,
        })
    }

    fn single_file(&self) -> bool {
        self.listing.is_single_file()
    }
}

impl TorrentArchive for SevenZipArchive {
    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn contents(&self) -> &ArchiveListing {
        &self.listing
    }

    fn is_signed(&self) -> Result<bool> {
        sevenz::signature::is_present(&self.path)
    }

    fn is_valid(&self) -> Result<bool> {
        sevenz::signature::is_valid(&self.path, self.single_file(), self.flags)
    }

    fn verify(&self) -> Result<()> {
        sevenz::signature::verify(&self.path, self.single_file(), self.flags)
    }

    fn sign(&self) -> Result<SignOutcome> {
        sevenz::signature::sign(&self.path, self.single_file(), self.flags)
    }

    fn strip(&self) -> Result<()> {
        sevenz::signature::strip(&self.path)
    }
}

/// Re-signs a stripped 7z source when dropped.
///
/// [`finish`][Self::finish] reports the result; a guard dropped without it
/// (early return or panic) still re-signs and logs failures.
struct SourceRestore<'a> {
    archive: &'a dyn TorrentArchive,
    armed: bool,
}

impl<'a> SourceRestore<'a> {
    fn new(archive: &'a dyn TorrentArchive) -> Self {
        Self {
            archive,
            armed: true,
        }
    }

    fn restore(&self) -> Result<SignOutcome> {
        log::info!("{}: re-signing source archive", self.archive.path().display());
        self.archive.sign()
    }

    fn finish(mut self) -> Result<()> {
        self.armed = false;
        self.restore().map(|_| ())
    }
}

impl Drop for SourceRestore<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.restore() {
                log::error!(
                    "{}: failed to restore signature: {}",
                    self.archive.path().display(),
                    e
                );
            }
        }
    }
}

/// Opens archives and renames their members.
pub struct ArchiveSignatureEngine {
    options: EngineOptions,
    tool: Box<dyn ExternalRenameTool>,
    // Per-instance; a failed probe keeps `(tool, reason)`.
    tool_probe: OnceCell<std::result::Result<(), (String, String)>>,
}

impl fmt::Debug for ArchiveSignatureEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSignatureEngine")
            .field("options", &self.options)
            .field("tool", &self.tool.name())
            .finish()
    }
}

impl Default for ArchiveSignatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSignatureEngine {
    /// Creates an engine with default options.
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Creates an engine that renames with [`SevenZaTool`] running
    /// `options.tool`.
    pub fn with_options(options: EngineOptions) -> Self {
        let tool = Box::new(SevenZaTool::new(options.tool.clone()));
        Self {
            options,
            tool,
            tool_probe: OnceCell::new(),
        }
    }

    /// Replaces the rename tool.
    pub fn with_tool(mut self, tool: impl ExternalRenameTool + 'static) -> Self {
        self.tool = Box::new(tool);
        self.tool_probe = OnceCell::new();
        self
    }

    /// The engine configuration.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Opens `path` with the codec for its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedFormat`] for anything but ZIP and 7z, or
    /// the listing error if the archive structure cannot be read.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Box<dyn TorrentArchive>> {
        let path = path.as_ref();
        match detect_path(path)? {
            ArchiveFormat::Zip => Ok(Box::new(ZipArchive::open(path)?)),
            ArchiveFormat::SevenZip => Ok(Box::new(SevenZipArchive::open(
                path,
                self.options.sign_flags(),
                &self.options.limits,
            )?)),
        }
    }

    fn probe_tool(&self) -> Result<()> {
        let probe = self.tool_probe.get_or_init(|| match self.tool.probe() {
            Ok(()) => Ok(()),
            Err(Error::ExternalToolUnavailable { tool, reason }) => Err((tool, reason)),
            Err(e) => Err((self.tool.name().to_string(), e.to_string())),
        });
        probe.clone().map_err(|(tool, reason)| Error::ExternalToolUnavailable { tool, reason })
    }

    /// Writes `new_path` as a copy of `archive` with members renamed, then
    /// signs it.
    ///
    /// Nothing is touched unless the mapping keeps members sorted, the
    /// destination is free, and the tool is usable. A 7z source must be
    /// signed: its trailer is stripped for the tool and written back
    /// afterwards, also when the tool fails.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownMember`] or [`Error::OrderViolation`] for a bad mapping
    /// - [`Error::DestinationExists`] if `new_path` exists
    /// - [`Error::ExternalToolUnavailable`] if the tool probe fails
    /// - [`Error::SignatureAbsent`] for an unsigned 7z source
    /// - [`Error::ExternalToolFailure`] if the tool exits unsuccessfully
    pub fn rename(
        &self,
        archive: &dyn TorrentArchive,
        mapping: &RenameMapping,
        new_path: impl AsRef<Path>,
    ) -> Result<SignOutcome> {
        let new_path = new_path.as_ref();
        rename::validate_rename_order(&archive.contents().paths(), mapping)?;

        if new_path.exists() {
            return Err(Error::DestinationExists {
                path: new_path.to_path_buf(),
            });
        }
        self.probe_tool()?;

        let restore = if archive.format() == ArchiveFormat::SevenZip {
            archive.strip()?;
            Some(SourceRestore::new(archive))
        } else {
            None
        };

        let result = self
            .tool
            .rename(archive.path(), mapping, new_path)
            .and_then(|()| self.open(new_path)?.sign());

        match restore {
            Some(restore) => match (result, restore.finish()) {
                (Ok(outcome), Ok(())) => Ok(outcome),
                (Err(e), restored) => {
                    if let Err(restore_err) = restored {
                        log::error!(
                            "{}: failed to restore signature: {}",
                            archive.path().display(),
                            restore_err
                        );
                    }
                    Err(e)
                }
                (Ok(_), Err(restore_err)) => Err(restore_err),
            },
            None => result,
        }
    }

    /// Renames every member whose path contains `old` by substituting `new`.
    ///
    /// Returns the mapping that was applied with the outcome of signing the
    /// copy, or `Ok(None)` without touching anything when no path matches.
    pub fn rename_replace(
        &self,
        archive: &dyn TorrentArchive,
        old: &str,
        new: &str,
        new_path: impl AsRef<Path>,
    ) -> Result<Option<(RenameMapping, SignOutcome)>> {
        let mapping = rename::replace_mapping(&archive.contents().paths(), old, new)?;
        if mapping.is_empty() {
            log::info!("{}: no member path contains '{}'", archive.path().display(), old);
            return Ok(None);
        }
        let outcome = self.rename(archive, &mapping, new_path)?;
        Ok(Some((mapping, outcome)))
    }
}
