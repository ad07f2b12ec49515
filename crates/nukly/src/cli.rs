//! Clap derive structures for the `nukly` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nukly -- keep Nuki locks and openers in sync with a home automation host
#[derive(Debug, Parser)]
#[command(
    name = "nukly",
    version,
    about = "Run the Nuki bridge platform and manage paired bridges",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, short = 'c', env = "NUKLY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// One identifier per line (scripting)
    Plain,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the platform and run until interrupted
    Run,

    /// List bridges reported by the discovery service
    Discover,

    /// Pair with a bridge; press its button first
    Pair(PairArgs),

    /// List stored bridges
    #[command(alias = "ls")]
    Bridges,

    /// Forget a stored bridge
    #[command(alias = "rm")]
    Unpair(UnpairArgs),
}

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Bridge identifier, as reported by discovery
    #[arg(long)]
    pub id: u64,

    /// Bridge IP address
    #[arg(long)]
    pub ip: String,

    /// Bridge HTTP API port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

#[derive(Debug, Args)]
pub struct UnpairArgs {
    /// Bridge identifier
    pub id: u64,
}
