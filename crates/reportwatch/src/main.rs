//! Reportwatch - audit trail for tabular report files.
//!
//! This is the main entry point for the reportwatch CLI.

mod commands;

use clap::{Parser, Subcommand};
use commands::*;
use reportwatch_core::{Config, ReportService};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser)]
#[command(name = "reportwatch")]
#[command(author, version, about = "Watches tabular report files and keeps an audit trail of every cell change", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Reports directory to watch (overrides configuration)
    #[arg(long, global = true)]
    reports_dir: Option<PathBuf>,

    /// Audit data directory (overrides configuration)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Subcommand
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the reports directory and serve the HTTP API
    Serve {
        /// Address to bind to (defaults to the configured address)
        #[arg(short, long)]
        address: Option<SocketAddr>,
    },
    /// Watch the reports directory without the HTTP API
    Watch,
    /// List tabular files under the reports directory
    Files,
    /// Search every cell of every file (or only the given files)
    Search {
        /// Text to look for, case-insensitive
        query: String,
        /// Restrict the search to these files
        #[arg(short, long = "file")]
        files: Vec<String>,
    },
    /// Search one file
    Details {
        /// File name relative to the reports directory
        file: String,
        /// Text to look for, case-insensitive
        query: String,
    },
    /// Show the change history of one cell, newest first
    History {
        /// File name relative to the reports directory
        file: String,
        /// Zero-based data row index
        row: usize,
        /// Column name
        column: String,
    },
    /// Set one cell and record the change
    ///
    /// This edits the file directly, outside any running `serve` or `watch`
    /// process. A watcher on the same directory will also record the change,
    /// under the automated identity. While a server is running, edit through
    /// its `/edit` endpoint instead.
    Edit {
        /// File name relative to the reports directory
        file: String,
        /// Zero-based data row index
        row: usize,
        /// Column name
        column: String,
        /// New cell value
        value: String,
        /// Identity recorded as the author of the change
        #[arg(long = "by")]
        by: String,
    },
    /// Show configuration
    Config,
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;

    let (mut config, sources) = Config::load(Some(&cwd)).await?;
    if let Some(dir) = cli.reports_dir {
        config.reports_dir = Some(dir);
    }
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let foreground = matches!(cli.command, Commands::Serve { .. } | Commands::Watch);
    let log_file = init_logging(cli.verbose, foreground, config.log_level);
    if let Some(path) = &log_file {
        debug!(path = %path.display(), "Logging to file");
    }
    debug!(sources = sources.len(), "Configuration loaded");

    let service = || ReportService::from_config(&config, &cwd);

    match cli.command {
        Commands::Serve { address } => {
            let address = match address {
                Some(address) => address,
                None => config.address()?,
            };
            run_server(service(), address).await
        }
        Commands::Watch => run_watch(service()).await,
        Commands::Files => list_files(&service()).await,
        Commands::Search { query, files } => search(&service(), &query, &files).await,
        Commands::Details { file, query } => details(&service(), &file, &query).await,
        Commands::History { file, row, column } => history(&service(), &file, row, &column).await,
        Commands::Edit {
            file,
            row,
            column,
            value,
            by,
        } => edit(&service(), &file, row, &column, &value, &by).await,
        Commands::Config => show_config(&cwd).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Print version information.
fn print_version() {
    println!("reportwatch {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Watches tabular report files and keeps an audit trail of every cell change.");
}
