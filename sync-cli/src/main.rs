//! # convo-sync
//!
//! CLI tool for exercising the convo-sync engine.
//!
//! ## Commands
//!
//! - `simulate`: Run a coordinator against scripted collaborators
//! - `inspect`: Show the sync bookkeeping stored in a state file
//!
//! ## Example
//!
//! ```bash
//! # Cold start, then lose connectivity after 4 events
//! convo-sync simulate --events 10 --offline-after 4 --store state.json
//!
//! # The next start resumes without a slow sync
//! convo-sync simulate --events 3 --store state.json
//!
//! # Look at what was persisted
//! convo-sync inspect --store state.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{inspect, simulate};

/// CLI tool for exercising the convo-sync engine.
#[derive(Parser, Debug)]
#[command(name = "convo-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a coordinator against scripted collaborators
    Simulate {
        /// TOML configuration file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// State file (overrides the configured store path)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Number of events the server delivers
        #[arg(long, default_value = "10")]
        events: usize,

        /// Report an event gap after this many events
        #[arg(long)]
        gap_after: Option<usize>,

        /// Drop connectivity after this many events
        #[arg(long)]
        offline_after: Option<usize>,

        /// Make this slow-sync step fail (e.g. `conversations`)
        #[arg(long)]
        fail_step: Option<String>,
    },

    /// Show the sync bookkeeping stored in a state file
    Inspect {
        /// State file to read
        #[arg(long)]
        store: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Simulate {
            config,
            store,
            events,
            gap_after,
            offline_after,
            fail_step,
        } => {
            let options = simulate::Options {
                config,
                store,
                events,
                gap_after,
                offline_after,
                fail_step,
            };
            simulate::run(options).await?;
        }
        Commands::Inspect { store } => {
            inspect::run(&store).await?;
        }
    }

    Ok(())
}

/// Install the log subscriber. Logs go to stderr so stdout stays a report.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
