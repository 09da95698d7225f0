//! The external process that physically renames archive members.
//!
//! Rewriting member names needs a full archive writer, which this crate
//! deliberately does not carry. The engine delegates the rewrite to a tool
//! behind [`ExternalRenameTool`]; [`SevenZaTool`] drives the `7za` binary.

use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Output};

use crate::{Error, Result};

use super::RenameMapping;

/// Text printed by `7za` builds that support the `rn` command.
const RENAME_CAPABILITY: &str = "Rename files in archive";

/// A tool that writes a copy of an archive with some members renamed.
pub trait ExternalRenameTool {
    /// Short name used in error messages.
    fn name(&self) -> &str;

    /// Checks that the tool exists and supports renaming.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalToolUnavailable`] if it does not.
    fn probe(&self) -> Result<()>;

    /// Writes `dest` as a copy of `source` with `mapping` applied.
    ///
    /// `source` must be left untouched. Any failure after the tool started
    /// is reported as [`Error::ExternalToolFailure`].
    fn rename(&self, source: &Path, mapping: &RenameMapping, dest: &Path) -> Result<()>;
}

/// Runs the 7-Zip command-line binary.
#[derive(Debug, Clone)]
pub struct SevenZaTool {
    program: OsString,
}

impl SevenZaTool {
    /// Program name used when none is configured.
    pub const DEFAULT_PROGRAM: &'static str = "7za";

    /// Uses `program`, which may be a bare name resolved via `PATH`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The configured program.
    pub fn program(&self) -> &std::ffi::OsStr {
        &self.program
    }

    fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Builds the `rn` invocation arguments.
    fn rename_args(source: &Path, mapping: &RenameMapping, dest: &Path) -> Vec<OsString> {
        let mut update = OsString::from("-u!");
        update.push(dest.as_os_str());

        let mut args: Vec<OsString> = vec![
            "rn".into(),
            source.as_os_str().to_owned(),
            "-u-".into(),
            update,
        ];
        for (old, new) in mapping.iter() {
            args.push(old.into());
            args.push(new.into());
        }
        args
    }
}

impl Default for SevenZaTool {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM)
    }
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

impl ExternalRenameTool for SevenZaTool {
    fn name(&self) -> &str {
        self.program.to_str().unwrap_or(Self::DEFAULT_PROGRAM)
    }

    fn probe(&self) -> Result<()> {
        log::debug!("Probing {} for rename support", self.display_name());
        let output = Command::new(&self.program)
            .output()
            .map_err(|e| Error::ExternalToolUnavailable {
                tool: self.display_name(),
                reason: e.to_string(),
            })?;

        // 7za prints its usage with a non-zero status when run without args.
        if combined_output(&output).contains(RENAME_CAPABILITY) {
            Ok(())
        } else {
            Err(Error::ExternalToolUnavailable {
                tool: self.display_name(),
                reason: "installed version does not support renaming (7-Zip 9.30 or newer required)"
                    .into(),
            })
        }
    }

    fn rename(&self, source: &Path, mapping: &RenameMapping, dest: &Path) -> Result<()> {
        let args = Self::rename_args(source, mapping, dest);
        log::info!(
            "Running {} {}",
            self.display_name(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let output = Command::new(&self.program).args(&args).output().map_err(|e| {
            Error::ExternalToolFailure {
                tool: self.display_name(),
                status: None,
                output: e.to_string(),
            }
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::ExternalToolFailure {
                tool: self.display_name(),
                status: output.status.code(),
                output: combined_output(&output),
            })
        }
    }
}
