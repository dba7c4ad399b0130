//! # Review Harness CLI (`rh`)
//!
//! The `rh` binary is the primary interface for Review Harness. It provides
//! commands for preparing the output location, inspecting sources, running
//! the processing pipeline, and summarizing persisted output.
//!
//! ## Usage
//!
//! ```bash
//! rh --config ./config/rh.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rh init` | Create the output directory or SQLite schema |
//! | `rh sources` | List configured and discovered sources |
//! | `rh process <source>` | Process `all` sources or one by name |
//! | `rh stats` | Print persisted summaries per source |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use review_harness::config::{self, OutputKind};
use review_harness::progress::ProgressMode;
use review_harness::{migrate, process, sources, stats};

/// Review Harness CLI: normalize multi-site review dumps into canonical,
/// feature-enriched tables.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rh.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rh",
    about = "Review Harness: normalize multi-site review dumps into canonical, feature-enriched tables",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rh.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Prepare the output location.
    ///
    /// Creates the output directory for CSV output, or the SQLite database
    /// and its tables. Running it more than once is safe.
    Init,

    /// List configured and discovered sources.
    ///
    /// Shows which input file each source will read and whether it exists.
    Sources,

    /// Process one source or all of them.
    ///
    /// Loads each source's batch, normalizes and filters it, cleans text,
    /// derives features, and persists the result atomically.
    Process {
        /// `all`, or the name of a configured source.
        source: String,

        /// Run every stage except persistence and print the counts.
        #[arg(long)]
        dry_run: bool,

        /// Progress on stderr. Defaults to `human` when stderr is a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print persisted summaries per source.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => match cfg.output.kind {
            OutputKind::Csv => {
                std::fs::create_dir_all(&cfg.output.dir)?;
                println!("Output directory ready: {}", cfg.output.dir.display());
            }
            OutputKind::Sqlite => {
                migrate::run_migrations(&cfg.output.sqlite_path()).await?;
                println!("Database initialized successfully.");
            }
        },
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Process {
            source,
            dry_run,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            process::run_process(&cfg, &source, dry_run, progress).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
