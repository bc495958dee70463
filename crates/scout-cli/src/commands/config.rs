//! Configuration management commands

use crate::args::Cli;
use crate::console::CliConsole;
use crate::router::resolve_config;
use scout_core::config::ScoutConfig;
use scout_core::error::{ScoutError, ScoutResult};

/// Show the effective configuration as TOML
pub async fn show(cli: &Cli) -> ScoutResult<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration");

    if cli.config.exists() {
        console.success(&format!("Loaded configuration from: {}", cli.config.display()));
    } else {
        console.warn(&format!(
            "Configuration file not found: {}",
            cli.config.display()
        ));
        console.info("Using defaults and environment overrides");
    }

    let config = resolve_config(cli)?;
    print_config(&config)
}

/// Validate the configuration file and environment overrides
pub async fn validate(cli: &Cli) -> ScoutResult<()> {
    let console = CliConsole::new(true);
    console.print_header("Configuration Validation");

    if !cli.config.exists() {
        return Err(ScoutError::config(format!(
            "Configuration file not found: {}",
            cli.config.display()
        )));
    }

    match resolve_config(cli) {
        Ok(config) => {
            console.success("Configuration is valid");
            console.print_separator();
            console.print_field("Storage path", config.storage_path.display());
            console.print_field("Default TTL", format!("{:?}", config.cache.default_ttl));
            console.print_field("Cache size", config.cache.max_size);
            console.print_field("Events per stream", config.events.max_events_per_stream);
            console.print_field("Events total", config.events.max_total_events);
            console.print_field("Encryption", config.encryption.enabled);
            Ok(())
        }
        Err(e) => {
            console.error(&format!("Configuration validation failed: {}", e));
            Err(e)
        }
    }
}

fn print_config(config: &ScoutConfig) -> ScoutResult<()> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| ScoutError::config(format!("Failed to render configuration: {}", e)))?;
    println!("{}", rendered);
    Ok(())
}
