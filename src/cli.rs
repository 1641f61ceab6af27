//! CLI argument parsing for invitrack

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for join notices and ledger listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "invitrack")]
#[command(version)]
#[command(about = "Invite attribution tracker for group-chat communities", long_about = None)]
pub struct Cli {
    /// Enable debug tracing output (to stderr)
    #[arg(long = "debug", global = true)]
    pub debug: bool,

    /// TOML configuration file
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Ledger file (overrides ledger_path from the config file)
    #[arg(short = 'l', long = "ledger", value_name = "PATH", global = true)]
    pub ledger: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process a platform event log and print a notice for every join
    Run(RunArgs),

    /// Inspect the persisted inviter ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Event log with one JSON event per line (reads stdin when omitted)
    #[arg(short = 'e', long = "events", value_name = "FILE")]
    pub events: Option<PathBuf>,

    /// Live invite fetch timeout in milliseconds
    #[arg(long = "fetch-timeout-ms", value_name = "MS")]
    pub fetch_timeout_ms: Option<u64>,

    /// Notice output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommand {
    /// List inviters by attributed joins, highest first
    Show {
        /// Only show the first N inviters
        #[arg(long = "top", value_name = "N")]
        top: Option<usize>,

        /// Listing format
        #[arg(long = "format", value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the attributed-join count of one inviter
    Get {
        /// Inviter tag (e.g. alice#0001)
        inviter: String,
    },
}
