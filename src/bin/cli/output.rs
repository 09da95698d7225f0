//! Output formatting for CLI operations.

use serde_json::json;
use std::path::Path;
use torrentsig::{RenameMapping, SignOutcome, TorrentArchive};

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the member listing
    fn format_contents(&self, archive: &dyn TorrentArchive) -> String;

    /// Formats a yes/no check such as "signed" or "valid"
    fn format_check(&self, path: &Path, check: &str, answer: bool, reason: Option<&str>) -> String;

    /// Formats the result of signing
    fn format_sign(&self, path: &Path, outcome: SignOutcome) -> String;

    /// Formats the result of stripping
    fn format_strip(&self, path: &Path) -> String;

    /// Formats the result of a rename; `None` means nothing matched
    fn format_rename(
        &self,
        source: &Path,
        dest: &Path,
        mapping: &RenameMapping,
        outcome: Option<SignOutcome>,
    ) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_contents(&self, archive: &dyn TorrentArchive) -> String {
        let listing = archive.contents();
        let mut output = String::new();

        output.push_str(&format!("{:>12} {:>4} {}\n", "Size", "Type", "Name"));
        output.push_str(&"-".repeat(70));
        output.push('\n');

        for entry in listing.entries() {
            let size_str = if entry.is_directory() {
                String::new()
            } else {
                humanize_bytes(entry.size)
            };
            output.push_str(&format!(
                "{:>12} {:>4} {}\n",
                size_str,
                entry.kind.as_str(),
                entry.path
            ));
        }

        output.push_str(&"-".repeat(70));
        output.push('\n');
        output.push_str(&format!(
            "{} files, {} directories, {} total ({})\n",
            listing.file_count(),
            listing.dir_count(),
            humanize_bytes(listing.total_size()),
            archive.format()
        ));
        for skipped in listing.skipped() {
            output.push_str(&format!("Skipped (unknown filetype): {}\n", skipped));
        }

        output
    }

    fn format_check(&self, path: &Path, check: &str, answer: bool, reason: Option<&str>) -> String {
        let verdict = if answer {
            check.to_string()
        } else {
            format!("not {}", check)
        };
        match reason {
            Some(reason) => format!("{}: {} ({})\n", path.display(), verdict, reason),
            None => format!("{}: {}\n", path.display(), verdict),
        }
    }

    fn format_sign(&self, path: &Path, outcome: SignOutcome) -> String {
        format!("{}: {}\n", path.display(), sign_message(outcome))
    }

    fn format_strip(&self, path: &Path) -> String {
        format!("{}: signature removed\n", path.display())
    }

    fn format_rename(
        &self,
        source: &Path,
        dest: &Path,
        mapping: &RenameMapping,
        outcome: Option<SignOutcome>,
    ) -> String {
        let Some(outcome) = outcome else {
            return format!("{}: no member matched, nothing renamed\n", source.display());
        };

        let mut output = String::new();
        for (old, new) in mapping.iter() {
            output.push_str(&format!("  {} -> {}\n", old, new));
        }
        output.push_str(&format!(
            "Wrote {} ({} renamed, {})\n",
            dest.display(),
            mapping.len(),
            sign_message(outcome)
        ));
        output
    }
}

fn sign_message(outcome: SignOutcome) -> &'static str {
    match outcome {
        SignOutcome::AlreadyValid => "signature already valid",
        SignOutcome::Added => "signature added",
        SignOutcome::Replaced => "signature replaced",
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_contents(&self, archive: &dyn TorrentArchive) -> String {
        let listing = archive.contents();
        let entries: Vec<_> = listing
            .entries()
            .iter()
            .map(|e| {
                json!({
                    "path": e.path,
                    "size": e.size,
                    "type": e.kind.as_str(),
                })
            })
            .collect();

        let obj = json!({
            "archive": archive.path().display().to_string(),
            "format": archive.format().extension(),
            "entries": entries,
            "dir_count": listing.dir_count(),
            "file_count": listing.file_count(),
            "skipped": listing.skipped(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string()) + "\n"
    }

    fn format_check(&self, path: &Path, check: &str, answer: bool, reason: Option<&str>) -> String {
        let obj = json!({
            "archive": path.display().to_string(),
            "check": check,
            "answer": answer,
            "reason": reason,
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string()) + "\n"
    }

    fn format_sign(&self, path: &Path, outcome: SignOutcome) -> String {
        let obj = json!({
            "archive": path.display().to_string(),
            "outcome": outcome.as_str(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string()) + "\n"
    }

    fn format_strip(&self, path: &Path) -> String {
        let obj = json!({
            "archive": path.display().to_string(),
            "stripped": true,
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string()) + "\n"
    }

    fn format_rename(
        &self,
        source: &Path,
        dest: &Path,
        mapping: &RenameMapping,
        outcome: Option<SignOutcome>,
    ) -> String {
        let obj = json!({
            "archive": source.display().to_string(),
            "new_archive": dest.display().to_string(),
            "renamed": mapping.iter().map(|(o, n)| json!({"old": o, "new": n})).collect::<Vec<_>>(),
            "outcome": outcome.map(|o| o.as_str()),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string()) + "\n"
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Converts bytes to a human-readable string
pub fn humanize_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.1} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
