use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "syncq")]
#[command(about = "Offline action queue with prioritized, retrying sync")]
#[command(long_about = "syncq - offline action queue

Actions recorded while offline are persisted locally and replayed against
the remote API once it is reachable. Emergency alerts always go first;
failed actions back off exponentially and are dropped after the retry
budget is spent.

QUICK START:
  syncq add CHECK_IN --data '{\"spotId\": 7}'   Queue an action
  syncq list                                    Show queued actions
  syncq drain                                   Sync now

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Data directory (defaults to ~/.syncq)
    #[arg(long, env = "SYNCQ_HOME", global = true)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue status
    ///
    /// Prints how many actions are waiting, how many are in retry backoff,
    /// and when the oldest one was recorded.
    #[command(alias = "s")]
    Status,

    /// List queued actions in the order they will be sent
    #[command(alias = "ls")]
    List,

    /// Queue an action
    ///
    /// # Examples
    ///
    ///   syncq add EMERGENCY_ALERT --data '{"lat": 1.0, "lng": 2.0}'
    ///   syncq add submit-report --priority 0
    Add {
        /// Action type, e.g. CHECK_IN or send-message
        action_type: String,

        /// JSON payload
        #[arg(long, short)]
        data: Option<String>,

        /// Override the type's default priority (lower runs first)
        #[arg(long, short, allow_negative_numbers = true)]
        priority: Option<i32>,
    },

    /// Remove a queued action by ID
    #[command(alias = "rm")]
    Remove {
        /// Action ID
        id: String,
    },

    /// Remove every queued action
    Clear {
        /// Required to confirm
        #[arg(long, short)]
        force: bool,
    },

    /// Send queued actions to the remote now
    Drain {
        /// API base URL, overriding the configured one
        #[arg(long)]
        url: Option<String>,
    },

    /// Generate shell completions
    ///
    /// Example: syncq completions bash > ~/.bash_completion.d/syncq
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
