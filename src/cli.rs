//! CLI argument parsing for the locking workflow.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "amp-lock",
    version,
    about = "Lock AMP appliances to pinned, reproducible Chef environments",
    after_help = "Examples:\n  amp-lock lock --appliance shop-2.1\n  amp-lock lock --all --allowlist latest.txt --publish\n  amp-lock solve --package nginx-1.4\n  amp-lock config > ~/.config/amp-lock/config.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Config file (defaults to <config dir>/amp-lock/config.json when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Lock(LockArgs),
    Solve(SolveArgs),
    Config,
}

/// Lock command inputs.
#[derive(Args, Debug)]
#[command(about = "Lock appliances and write pinned environments")]
pub struct LockArgs {
    /// Appliance reference (`name-version`); repeatable
    #[arg(long, value_name = "REF", required_unless_present = "all", conflicts_with = "all")]
    pub appliance: Vec<String>,

    /// Lock every appliance the inventory lists
    #[arg(long)]
    pub all: bool,

    /// Newline-delimited `name-version` allowlist of latest appliance versions
    #[arg(long, value_name = "PATH")]
    pub allowlist: Option<PathBuf>,

    /// Directory receiving `<environment>.json` documents
    #[arg(long, value_name = "DIR")]
    pub environments_dir: Option<PathBuf>,

    /// Publish locked packages and appliances back to the inventory
    #[arg(long)]
    pub publish: bool,

    /// Also write the run report to this path
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,
}

/// Solve command inputs.
#[derive(Args, Debug)]
#[command(about = "Resolve and classify one package's cookbooks without locking")]
pub struct SolveArgs {
    /// Package reference (`name` or `name-version`)
    #[arg(long, value_name = "REF")]
    pub package: String,
}
