//! Error types for archive signature operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when listing, verifying, signing, or renaming archives,
//! along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Negative
//! answers to yes/no questions (`is_signed`, `is_valid`) are plain `bool`s;
//! the typed variants below are reserved for outcomes the caller must act on.
//!
//! ```rust,no_run
//! use torrentsig::{ArchiveSignatureEngine, Error};
//!
//! fn verify(path: &str) -> torrentsig::Result<()> {
//!     let engine = ArchiveSignatureEngine::new();
//!     let archive = engine.open(path)?;
//!     match archive.verify() {
//!         Ok(()) => println!("{}: OK", path),
//!         Err(Error::SignatureAbsent { .. }) => println!("{}: not signed", path),
//!         Err(e @ Error::SignatureMismatch { .. }) => println!("{}: {}", path, e),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```

use std::io;
use std::path::PathBuf;

/// Helper struct for formatting OrderViolation error messages.
struct OrderDisplay<'a> {
    current: &'a [String],
    proposed: &'a [String],
}

impl std::fmt::Display for OrderDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "renaming would break the required member order (members must stay sorted)"
        )?;
        write!(f, "\ncurrent order:")?;
        for path in self.current {
            write!(f, "\n  {}", path)?;
        }
        write!(f, "\nrejected order:")?;
        for path in self.proposed {
            write!(f, "\n  {}", path)?;
        }
        Ok(())
    }
}

/// Helper struct for formatting ExternalToolFailure error messages.
struct ToolFailureDisplay<'a> {
    tool: &'a str,
    status: Option<i32>,
    output: &'a str,
}

impl std::fmt::Display for ToolFailureDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} exited with status {}", self.tool, code)?,
            None => write!(f, "{} was terminated by a signal", self.tool)?,
        }
        let output = self.output.trim();
        if !output.is_empty() {
            write!(f, ":\n{}", output)?;
        }
        Ok(())
    }
}

/// The main error type for archive signature operations.
///
/// # Error Categories
///
/// | Category | Variants |
/// |----------|----------|
/// | I/O | [`Io`][Self::Io] |
/// | Format | [`UnsupportedFormat`][Self::UnsupportedFormat], [`InvalidFormat`][Self::InvalidFormat], [`CorruptHeader`][Self::CorruptHeader] |
/// | Compatibility | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature] |
/// | Signature | [`SignatureAbsent`][Self::SignatureAbsent], [`SignatureMismatch`][Self::SignatureMismatch], [`SelfCheckFailed`][Self::SelfCheckFailed] |
/// | Rename | [`UnknownMember`][Self::UnknownMember], [`DuplicateMember`][Self::DuplicateMember], [`OrderViolation`][Self::OrderViolation], [`DestinationExists`][Self::DestinationExists] |
/// | External tool | [`ExternalToolUnavailable`][Self::ExternalToolUnavailable], [`ExternalToolFailure`][Self::ExternalToolFailure] |
/// | Resources | [`ResourceLimitExceeded`][Self::ResourceLimitExceeded] |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading, writing, or truncating a file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file is neither a ZIP nor a 7z archive.
    ///
    /// Detection looks at the file extension first and falls back to the
    /// leading magic bytes.
    #[error("Unsupported archive format: {}", path.display())]
    UnsupportedFormat {
        /// The offending file.
        path: PathBuf,
    },

    /// The archive structure could not be understood.
    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    /// A 7z header is corrupt or truncated.
    #[error("Corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// A 7z encoded header uses a coder this build cannot decode.
    ///
    /// Enable the `lzma` feature for LZMA and LZMA2 encoded headers.
    #[error("Unsupported method: {method_id:#x}")]
    UnsupportedMethod {
        /// The method ID that is not supported.
        method_id: u64,
    },

    /// The archive uses a structural feature that is not handled.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// A verify or strip operation was requested on an unsigned archive.
    #[error("No signature present in {}", path.display())]
    SignatureAbsent {
        /// The archive that lacks a trailer.
        path: PathBuf,
    },

    /// The stored trailer differs from the recomputed one.
    ///
    /// The archive is left unmodified; call `sign` to rewrite the trailer.
    #[error("Signature mismatch in {}: stored {stored}, computed {computed}", path.display())]
    SignatureMismatch {
        /// The archive that failed verification.
        path: PathBuf,
        /// The trailer currently in the file.
        stored: String,
        /// The trailer computed from the current contents.
        computed: String,
    },

    /// A freshly written signature failed its own re-validation.
    ///
    /// Unlike [`SignatureMismatch`][Self::SignatureMismatch], this points at
    /// a defect in the codec or a concurrent writer, not at the archive.
    #[error("Signature written to {} did not verify", path.display())]
    SelfCheckFailed {
        /// The archive that was just signed.
        path: PathBuf,
    },

    /// A rename refers to a member that is not in the archive.
    #[error("Member not found in archive: {path}")]
    UnknownMember {
        /// The missing member path (exact match is required).
        path: String,
    },

    /// A rename mapping names the same source member twice.
    #[error("Member renamed more than once: {path}")]
    DuplicateMember {
        /// The repeated member path.
        path: String,
    },

    /// Applying the rename would leave the members out of sorted order.
    #[error("{}", OrderDisplay { current, proposed })]
    OrderViolation {
        /// Member order before the rename.
        current: Vec<String>,
        /// The rejected member order after the rename.
        proposed: Vec<String>,
    },

    /// The rename destination already exists.
    #[error("Target archive already exists: {}", path.display())]
    DestinationExists {
        /// The occupied destination path.
        path: PathBuf,
    },

    /// The external rename tool is missing or too old.
    #[error("External rename tool '{tool}' is unavailable: {reason}")]
    ExternalToolUnavailable {
        /// Program name or path of the tool.
        tool: String,
        /// Why the tool was rejected.
        reason: String,
    },

    /// The external rename tool ran and reported failure.
    #[error("{}", ToolFailureDisplay { tool, status: *status, output })]
    ExternalToolFailure {
        /// Program name or path of the tool.
        tool: String,
        /// Exit status, if the process exited normally.
        status: Option<i32>,
        /// Captured stdout and stderr.
        output: String,
    },

    /// A configured resource limit was exceeded while parsing a header.
    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),
}

impl Error {
    /// Returns true if this error concerns the trailer signature itself.
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            Self::SignatureAbsent { .. }
                | Self::SignatureMismatch { .. }
                | Self::SelfCheckFailed { .. }
        )
    }

    /// Returns true if a rename was refused before anything was modified.
    pub fn is_rename_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownMember { .. }
                | Self::DuplicateMember { .. }
                | Self::OrderViolation { .. }
                | Self::DestinationExists { .. }
        )
    }

    /// Returns true if the archive structure is damaged or unreadable.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::InvalidFormat(_) | Self::CorruptHeader { .. })
    }

    /// Returns true if the error comes from the external rename tool.
    pub fn is_external_tool_error(&self) -> bool {
        matches!(
            self,
            Self::ExternalToolUnavailable { .. } | Self::ExternalToolFailure { .. }
        )
    }

    /// Creates a CorruptHeader error.
    pub fn corrupt_header(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for archive signature operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_corrupt_header() {
        let err = Error::corrupt_header(0x20, "bad property");
        assert_eq!(err.to_string(), "Corrupt header at offset 0x20: bad property");
        assert!(err.is_corruption());
    }

    #[test]
    fn test_signature_mismatch_message() {
        let err = Error::SignatureMismatch {
            path: PathBuf::from("a.zip"),
            stored: "TORRENTZIPPED-00000000".into(),
            computed: "TORRENTZIPPED-1234ABCD".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.zip"));
        assert!(msg.contains("TORRENTZIPPED-00000000"));
        assert!(msg.contains("TORRENTZIPPED-1234ABCD"));
        assert!(err.is_signature_error());
        assert!(!err.is_rename_rejection());
    }

    #[test]
    fn test_order_violation_lists_both_orders() {
        let err = Error::OrderViolation {
            current: vec!["a.txt".into(), "b.txt".into()],
            proposed: vec!["a.txt".into(), "A.txt".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("current order:\n  a.txt\n  b.txt"));
        assert!(msg.contains("rejected order:\n  a.txt\n  A.txt"));
        assert!(err.is_rename_rejection());
    }

    #[test]
    fn test_tool_failure_message() {
        let err = Error::ExternalToolFailure {
            tool: "7za".into(),
            status: Some(2),
            output: "  fatal error\n".into(),
        };
        assert_eq!(err.to_string(), "7za exited with status 2:\nfatal error");
        assert!(err.is_external_tool_error());

        let err = Error::ExternalToolFailure {
            tool: "7za".into(),
            status: None,
            output: String::new(),
        };
        assert_eq!(err.to_string(), "7za was terminated by a signal");
    }

    #[test]
    fn test_self_check_is_distinct_from_mismatch() {
        let err = Error::SelfCheckFailed {
            path: PathBuf::from("x.7z"),
        };
        assert!(err.is_signature_error());
        assert!(!matches!(err, Error::SignatureMismatch { .. }));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
