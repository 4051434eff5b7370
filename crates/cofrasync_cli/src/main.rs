//! cofrasync CLI
//!
//! Maintenance tools for a client's journal replica.
//!
//! # Commands
//!
//! - `inspect` - Show tables, record counts, cursors and pending tombstones
//! - `verify` - Walk the journal and check every frame
//! - `compact` - Rewrite the journal as a snapshot
//! - `dump-journal` - Print journal entries for debugging
//! - `resync` - Reset every cursor so the next sync starts over

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use commands::CliError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// cofrasync replica maintenance tools.
#[derive(Parser)]
#[command(name = "cofrasync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the replica directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tables, record counts, cursors and pending tombstones
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Walk the journal and check every frame
    Verify,

    /// Rewrite the journal as a snapshot of the current state
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Print journal entries for debugging
    DumpJournal {
        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Reset every cursor so the next sync re-pushes and re-pulls everything
    Resync,

    /// Show version information
    Version,
}

fn run(cli: Cli) -> Result<(), CliError> {
    let replica = |command: &'static str| cli.path.clone().ok_or(CliError::MissingPath(command));

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&replica("inspect")?, format),
        Commands::Verify => commands::verify::run(&replica("verify")?),
        Commands::Compact { dry_run } => commands::compact::run(&replica("compact")?, dry_run),
        Commands::DumpJournal { limit, format } => {
            commands::dump_journal::run(&replica("dump-journal")?, limit, format)
        }
        Commands::Resync => commands::resync::run(&replica("resync")?),
        Commands::Version => {
            println!("cofrasync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "journal format v{}",
                cofrasync_storage::JOURNAL_VERSION
            );
            println!("wire protocol v{}", cofrasync_protocol::PROTOCOL_VERSION);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
