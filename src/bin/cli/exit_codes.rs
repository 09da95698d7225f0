//! Exit codes for the CLI tool.

use torrentsig::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// `is-signed` or `is-valid` answered no
pub const NEGATIVE: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Archive format error
pub const BAD_ARCHIVE: i32 = 3;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// Signature missing, wrong, or failed its self-check
pub const SIGNATURE: i32 = 6;
/// Rename refused before anything was written
pub const RENAME_REJECTED: i32 = 7;
/// External rename tool missing or failed
pub const EXTERNAL_TOOL: i32 = 8;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Negative,
    FatalError,
    BadArchive,
    IoError,
    Signature,
    RenameRejected,
    ExternalTool,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Negative => NEGATIVE,
            Self::FatalError => FATAL_ERROR,
            Self::BadArchive => BAD_ARCHIVE,
            Self::IoError => IO_ERROR,
            Self::Signature => SIGNATURE,
            Self::RenameRejected => RENAME_REJECTED,
            Self::ExternalTool => EXTERNAL_TOOL,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts a torrentsig error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(_) => ExitCode::IoError,
        Error::UnsupportedFormat { .. } => ExitCode::BadArchive,
        Error::UnsupportedMethod { .. } => ExitCode::BadArchive,
        Error::UnsupportedFeature { .. } => ExitCode::BadArchive,
        Error::ResourceLimitExceeded(_) => ExitCode::FatalError,
        e if e.is_corruption() => ExitCode::BadArchive,
        e if e.is_signature_error() => ExitCode::Signature,
        e if e.is_rename_rejection() => ExitCode::RenameRejected,
        e if e.is_external_tool_error() => ExitCode::ExternalTool,
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}
