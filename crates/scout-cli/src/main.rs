//! Scout command-line interface
//!
//! Operates the request cache and event log of a Scout storage directory.
//!
//! # Installation
//!
//! ```bash
//! cargo install --path crates/scout-cli
//! ```
//!
//! # Commands
//!
//! - `scout serve` keeps both stores open until SIGINT/SIGTERM, then flushes
//!   everything to disk
//! - `scout stats` prints cache and event store statistics
//! - `scout replay <event-id>` prints every event of a stream after an id
//! - `scout cache ...` inspects and invalidates cached results
//! - `scout config ...` shows and validates the layered configuration

mod args;
mod commands;
mod console;
mod logging;
mod router;
mod signal_handler;

use clap::Parser;
use scout_core::error::ScoutResult;

pub use args::{CacheAction, Cli, Commands, ConfigAction};

#[tokio::main]
async fn main() -> ScoutResult<()> {
    let cli = Cli::parse();
    router::route(cli).await
}
