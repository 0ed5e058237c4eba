//! Custodian CLI - Reference Resolution & Shielding Pipeline from the command line.
//!
//! Custodian builds a cross-file reference graph with tree-sitter, applies
//! constructor/inheritance/framework/config/wisdom shields, and reports the source
//! files and symbols that survive every shield as dead.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use custodian::Language;
use tracing_subscriber::EnvFilter;

mod cli;

/// Custodian: Reference Resolution & Shielding Pipeline.
#[derive(Parser)]
#[command(name = "custodian")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// The `--language` flag's values, short names matching the pipeline's three
/// supported languages.
#[derive(Clone, Copy, ValueEnum)]
enum LanguageArg {
    Py,
    Js,
    Ts,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::Py => Self::Python,
            LanguageArg::Js => Self::JavaScript,
            LanguageArg::Ts => Self::TypeScript,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Find dead symbols and orphan files in a project
    Analyze {
        /// Project root directory to analyze
        path: PathBuf,

        /// Which language's symbols to report dead/protected for
        #[arg(long, value_enum, default_value = "py")]
        language: LanguageArg,

        /// Treat public symbols as reachable entry points (for libraries/packages)
        #[arg(long)]
        library_mode: bool,

        /// Fall back to a project-wide grep for a symbol's name before calling it dead
        #[arg(long)]
        grep_shield: bool,

        /// Do not skip vendored directories (`node_modules`, `venv`, etc.) during discovery
        #[arg(long)]
        include_vendored: bool,

        /// Directory containing community/premium wisdom rule packs
        #[arg(long)]
        rules_dir: Option<PathBuf>,

        /// Output machine-readable JSON instead of a formatted report
        #[arg(long)]
        json: bool,
    },

    /// Show analysis cache statistics
    Stats {
        /// Project root directory whose cache to inspect
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Analyze {
            path,
            language,
            library_mode,
            grep_shield,
            include_vendored,
            rules_dir,
            json,
        } => cli::analyze::run(
            &path,
            language.into(),
            library_mode,
            grep_shield,
            include_vendored,
            rules_dir.as_deref(),
            json,
        ),
        Commands::Stats { path } => cli::stats::run(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  {}: {cause}", "caused by".dimmed());
                source = std::error::Error::source(cause);
            }
            ExitCode::FAILURE
        }
    }
}
