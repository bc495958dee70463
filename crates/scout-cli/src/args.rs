//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file name used across all CLI commands.
pub const DEFAULT_CONFIG_FILE: &str = "scout.toml";

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Scout - durable request cache and resumable event log")]
#[command(
    long_about = r#"Scout - durable request cache and resumable event log

USAGE:
  scout serve                          # Keep stores open until Ctrl+C
  scout stats [--json]                 # Cache and event store statistics
  scout replay <event_id>              # Events of a stream after an id
  scout cache get <ns> '<json>'        # Cached value for a call
  scout cache invalidate <ns> '<json>' # Drop a cached value
  scout cache clear                    # Drop every cached value
  scout config show|validate           # Inspect configuration

Settings are read from the config file, then SCOUT_* environment variables."#
)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (JSON, TOML or YAML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Override the storage directory
    #[arg(long, global = true, env = "SCOUT_STORAGE_PATH")]
    pub storage_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open both stores and keep them running until interrupted
    Serve,

    /// Show cache and event store statistics
    Stats {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print every event of a stream stored after the given event id
    #[command(verbatim_doc_comment)]
    Replay {
        /// Last event id seen by the client, e.g. session-1_00000000000000000004
        last_event_id: String,
    },

    /// Inspect or invalidate cached results
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Clone)]
pub enum CacheAction {
    /// Show the cached value for a call, if any
    Get {
        namespace: String,
        /// Call arguments as JSON
        args: String,
    },

    /// Drop the cached value for a call
    Invalidate {
        namespace: String,
        /// Call arguments as JSON
        args: String,
    },

    /// Drop every cached value from memory and disk
    Clear,
}

#[derive(Subcommand, Clone)]
pub enum ConfigAction {
    /// Display the effective configuration
    Show,

    /// Validate the configuration file and environment overrides
    Validate,
}
