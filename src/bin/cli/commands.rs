//! Command implementations for the CLI tool.

use std::path::Path;

use torrentsig::{ArchiveSignatureEngine, Error, RenameMapping, TorrentArchive};

use crate::OutputFormat;
use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::output::create_formatter;

/// Shared state for every command.
pub struct Context<'a> {
    pub engine: &'a ArchiveSignatureEngine,
    pub format: OutputFormat,
}

fn fail(path: &Path, e: &Error) -> ExitCode {
    eprintln!("Error: {}: {}", path.display(), e);
    error_to_exit_code(e)
}

fn open_archive(ctx: &Context<'_>, path: &Path) -> Result<Box<dyn TorrentArchive>, ExitCode> {
    ctx.engine.open(path).map_err(|e| fail(path, &e))
}

/// get-contents command implementation
pub fn get_contents(ctx: &Context<'_>, archive_path: &Path) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let formatter = create_formatter(ctx.format);
    print!("{}", formatter.format_contents(archive.as_ref()));
    ExitCode::Success
}

/// is-signed command implementation
pub fn is_signed(ctx: &Context<'_>, archive_path: &Path) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match archive.is_signed() {
        Ok(signed) => {
            let formatter = create_formatter(ctx.format);
            print!("{}", formatter.format_check(archive_path, "signed", signed, None));
            if signed {
                ExitCode::Success
            } else {
                ExitCode::Negative
            }
        }
        Err(e) => fail(archive_path, &e),
    }
}

/// is-valid command implementation
pub fn is_valid(ctx: &Context<'_>, archive_path: &Path) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let formatter = create_formatter(ctx.format);
    match archive.verify() {
        Ok(()) => {
            print!("{}", formatter.format_check(archive_path, "valid", true, None));
            ExitCode::Success
        }
        Err(e) if e.is_signature_error() => {
            let reason = e.to_string();
            print!(
                "{}",
                formatter.format_check(archive_path, "valid", false, Some(&reason))
            );
            ExitCode::Negative
        }
        Err(e) => fail(archive_path, &e),
    }
}

/// sign command implementation
pub fn sign(ctx: &Context<'_>, archive_path: &Path) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match archive.sign() {
        Ok(outcome) => {
            let formatter = create_formatter(ctx.format);
            print!("{}", formatter.format_sign(archive_path, outcome));
            ExitCode::Success
        }
        Err(e) => fail(archive_path, &e),
    }
}

/// strip command implementation
pub fn strip(ctx: &Context<'_>, archive_path: &Path) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match archive.strip() {
        Ok(()) => {
            let formatter = create_formatter(ctx.format);
            print!("{}", formatter.format_strip(archive_path));
            ExitCode::Success
        }
        Err(e) => fail(archive_path, &e),
    }
}

/// rename command implementation
pub fn rename(
    ctx: &Context<'_>,
    archive_path: &Path,
    mapping: &RenameMapping,
    new_archive: &Path,
) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match ctx.engine.rename(archive.as_ref(), mapping, new_archive) {
        Ok(outcome) => {
            let formatter = create_formatter(ctx.format);
            print!(
                "{}",
                formatter.format_rename(archive_path, new_archive, mapping, Some(outcome))
            );
            ExitCode::Success
        }
        Err(e) => fail(archive_path, &e),
    }
}

/// rename-replace command implementation
pub fn rename_replace(
    ctx: &Context<'_>,
    archive_path: &Path,
    old: &str,
    new: &str,
    new_archive: &Path,
) -> ExitCode {
    let archive = match open_archive(ctx, archive_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let formatter = create_formatter(ctx.format);
    match ctx
        .engine
        .rename_replace(archive.as_ref(), old, new, new_archive)
    {
        Ok(Some((mapping, outcome))) => {
            print!(
                "{}",
                formatter.format_rename(archive_path, new_archive, &mapping, Some(outcome))
            );
            ExitCode::Success
        }
        Ok(None) => {
            print!(
                "{}",
                formatter.format_rename(archive_path, new_archive, &RenameMapping::new(), None)
            );
            ExitCode::Negative
        }
        Err(e) => fail(archive_path, &e),
    }
}
