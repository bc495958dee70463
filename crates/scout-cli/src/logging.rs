//! Tracing subscriber setup

use scout_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level; `-v` raises the default to
/// `debug`.
pub fn init(config: Option<&LoggingConfig>, verbose: bool) {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);
    let level = if verbose { "debug" } else { config.level.as_str() };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed (tests); keep it.
    let _ = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
