//! FacetDB CLI
//!
//! Command-line tools for FacetDB database maintenance.
//!
//! # Commands
//!
//! - `inspect` - Display database statistics and collections
//! - `verify` - Verify journal integrity
//! - `dump-journal` - Dump journal records for debugging
//! - `export` - Print the documents of a collection as JSON

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// FacetDB command-line database tools.
#[derive(Parser)]
#[command(name = "facetdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display database statistics and collections
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify,

    /// Dump journal records for debugging
    DumpJournal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip records before this byte offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the documents of a collection as JSON
    Export {
        /// Collection to export
        #[arg(short, long)]
        collection: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Database path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Database path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::DumpJournal {
            limit,
            offset,
            format,
        } => {
            let path = cli.path.ok_or("Database path required for dump-journal")?;
            commands::dump_journal::run(&path, limit, offset, &format)?;
        }
        Commands::Export { collection } => {
            let path = cli.path.ok_or("Database path required for export")?;
            commands::export::run(&path, &collection)?;
        }
        Commands::Version => {
            println!("FacetDB CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("FacetDB Core v{}", facetdb_core::VERSION);
        }
    }

    Ok(())
}
