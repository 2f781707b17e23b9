//! Feedsync CLI
//!
//! Command-line tools for exercising the feed sync engine.
//!
//! # Commands
//!
//! - `simulate` - Sync and poll a synthetic in-memory feed
//! - `cursor` - Render a cursor's query parameters

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Feedsync command-line tools.
#[derive(Parser)]
#[command(name = "feedsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync and poll a synthetic in-memory feed
    Simulate {
        /// Number of items the source starts with
        #[arg(short, long, default_value = "200")]
        items: usize,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "500")]
        interval_ms: u64,

        /// Number of poll intervals to run
        #[arg(short, long, default_value = "6")]
        ticks: u32,

        /// Items the source publishes per interval
        #[arg(short, long, default_value = "3")]
        burst: usize,

        /// Fail every Nth fetch (0 disables failures)
        #[arg(long, default_value = "0")]
        fail_every: u64,

        /// Use link-window pagination instead of derived ranges
        #[arg(long)]
        link: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Render a cursor's query parameters
    Cursor {
        /// Upper-bound id
        #[arg(long, conflicts_with_all = ["since_id", "min_id"])]
        max_id: Option<String>,

        /// Lower-bound "since" id
        #[arg(long, conflicts_with = "min_id")]
        since_id: Option<String>,

        /// Lower-bound "min" id
        #[arg(long)]
        min_id: Option<String>,

        /// Requested page size
        #[arg(short, long)]
        limit: Option<u32>,

        /// Smallest accepted limit
        #[arg(long, default_value = "1")]
        min: u32,

        /// Largest accepted limit
        #[arg(long, default_value = "80")]
        max: u32,

        /// Limit used when the requested one is out of range
        #[arg(long, default_value = "40")]
        default: u32,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Simulate {
            items,
            interval_ms,
            ticks,
            burst,
            fail_every,
            link,
            format,
        } => {
            let options = commands::simulate::SimulateOptions {
                items,
                interval_ms,
                ticks,
                burst,
                fail_every,
                link,
            };
            commands::simulate::run(&options, &format)?;
        }
        Commands::Cursor {
            max_id,
            since_id,
            min_id,
            limit,
            min,
            max,
            default,
            format,
        } => {
            let cursor = commands::cursor::build_cursor(max_id, since_id, min_id, limit);
            commands::cursor::run(&cursor, min, max, default, &format)?;
        }
        Commands::Version => {
            println!("feedsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
