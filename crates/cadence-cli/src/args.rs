use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Terminal channel for the cadence work orchestration engine
///
/// Cadence keeps a backlog of goals and tasks, drafts and runs approvable
/// plans, and fires cron schedules against both. This binary is a local
/// channel: it routes the same text commands a chat adapter would.
#[derive(Parser)]
#[command(version, about, name = "cadence")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to
    /// $XDG_DATA_HOME/cadence/cadence.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Path to the TOML configuration file. Defaults to
    /// $XDG_CONFIG_HOME/cadence/config.toml when present
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Channel type used to resolve the conversation scope
    #[arg(long, global = true, default_value = "cli")]
    pub channel: String,

    /// Conversation key; only channels with isolation support use it
    #[arg(long, global = true)]
    pub conversation: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one command, e.g. `cadence exec goal Ship release`
    #[command(alias = "x")]
    Exec {
        /// The command words
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Start the scheduler and read commands from stdin until EOF or Ctrl-C
    Run,
    /// List goals and schedules across every conversation
    Overview,
}
