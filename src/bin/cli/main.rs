//! CLI tool for torrentsig archive signatures.

mod commands;
mod exit_codes;
mod output;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use torrentsig::{ArchiveSignatureEngine, EngineOptions, RenameMapping};

use exit_codes::ExitCode;

/// Verify and regenerate TorrentZip and torrent7z signatures
#[derive(Parser)]
#[command(name = "torrentsig")]
#[command(author, version, about = "Verify and regenerate TorrentZip and torrent7z signatures", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Rename tool (7-Zip 9.30 or newer)
    #[arg(long, env = "TORRENTSIG_7ZA", default_value = "7za", global = true)]
    tool: PathBuf,

    /// Clear the unicode bit of 7z signatures
    #[arg(long, global = true)]
    no_unicode: bool,

    /// Set the strip-filenames bit of 7z signatures
    #[arg(long, global = true)]
    strip_filenames: bool,

    /// More log output (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List archive members in stored order (alias: l)
    #[command(alias = "l")]
    GetContents {
        /// Archive to list
        archive: PathBuf,
    },

    /// Check whether the archive carries a signature
    IsSigned {
        /// Archive to check
        archive: PathBuf,
    },

    /// Check whether the stored signature is correct (alias: t)
    #[command(alias = "t")]
    IsValid {
        /// Archive to check
        archive: PathBuf,
    },

    /// Write the correct signature
    Sign {
        /// Archive to sign
        archive: PathBuf,
    },

    /// Remove the signature (7z only)
    Strip {
        /// Archive to strip
        archive: PathBuf,
    },

    /// Copy the archive with members renamed, then sign the copy
    Rename {
        /// Source archive
        archive: PathBuf,

        /// Renames as old=new[,old=new...]
        #[arg(value_parser = parse_mapping)]
        mapping: RenameMapping,

        /// Archive to create
        new_archive: PathBuf,
    },

    /// Rename every member containing OLD by substituting NEW
    RenameReplace {
        /// Source archive
        archive: PathBuf,

        /// Text to replace
        old: String,

        /// Replacement text
        new: String,

        /// Archive to create
        new_archive: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

fn parse_mapping(s: &str) -> Result<RenameMapping, String> {
    s.parse().map_err(|e: torrentsig::Error| e.to_string())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                ExitCode::BadArgs
            } else {
                ExitCode::Success
            };
            let _ = e.print();
            std::process::exit(code.code());
        }
    };
    init_logging(cli.verbose);

    let engine = ArchiveSignatureEngine::with_options(
        EngineOptions::new()
            .tool(cli.tool.as_os_str())
            .unicode(!cli.no_unicode)
            .strip_filenames(cli.strip_filenames),
    );
    let ctx = commands::Context {
        engine: &engine,
        format: cli.format,
    };

    let exit_code = match cli.command {
        Commands::GetContents { archive } => commands::get_contents(&ctx, &archive),
        Commands::IsSigned { archive } => commands::is_signed(&ctx, &archive),
        Commands::IsValid { archive } => commands::is_valid(&ctx, &archive),
        Commands::Sign { archive } => commands::sign(&ctx, &archive),
        Commands::Strip { archive } => commands::strip(&ctx, &archive),
        Commands::Rename {
            archive,
            mapping,
            new_archive,
        } => commands::rename(&ctx, &archive, &mapping, &new_archive),
        Commands::RenameReplace {
            archive,
            old,
            new,
            new_archive,
        } => commands::rename_replace(&ctx, &archive, &old, &new, &new_archive),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
