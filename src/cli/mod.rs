//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// tablesync - one-way record sync between two table bases
#[derive(Parser, Debug)]
#[command(name = "tablesync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.tablesync/config.json)
    #[arg(long, global = true, env = "TABLESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run-state file (default: ~/.tablesync/state/<pair>.json)
    #[arg(long, global = true, env = "TABLESYNC_STATE")]
    pub state: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Plan and report without writing to the destination
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync every configured table into the destination
    Run(RunArgs),

    /// Sync one record and the records it links to
    Record {
        /// Source table of the record
        table: String,

        /// Source record ID
        record_id: String,

        /// Link hops to follow (default: policy.max_link_depth)
        #[arg(long)]
        depth: Option<usize>,
    },

    /// Tag existing destination records with their source record ID
    PopulateSourceIds {
        /// Field whose value identifies the same record on both sides
        #[arg(long, default_value = "Name")]
        match_field: String,
    },

    /// Inspect or reset the last-run boundary
    State {
        #[command(subcommand)]
        command: StateCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Arguments for `run`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Only sync records modified since the last successful run
    #[arg(long)]
    pub incremental: bool,

    /// Only sync these tables (repeatable); the boundary is not advanced
    #[arg(long = "table", value_name = "TABLE")]
    pub tables: Vec<String>,

    /// Read destination settings from this row of the source's Config table
    #[arg(long, value_name = "NAME")]
    pub config_record: Option<String>,

    /// Also write a markdown log of the run to this file
    #[arg(long, value_name = "FILE")]
    pub markdown: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum StateCommands {
    /// Show the stored boundary
    Show,
    /// Forget the boundary so the next run is a full sync
    Reset,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
