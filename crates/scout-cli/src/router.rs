//! Command routing logic for CLI

use crate::args::{CacheAction, Cli, Commands, ConfigAction};
use crate::{commands, logging};
use scout_core::config::{ScoutConfig, load_config};
use scout_core::error::ScoutResult;

/// Route CLI commands to their respective handlers
pub async fn route(cli: Cli) -> ScoutResult<()> {
    // Configuration commands report load failures themselves
    if let Commands::Config { action } = &cli.command {
        logging::init(None, cli.verbose);
        return match action {
            ConfigAction::Show => commands::config::show(&cli).await,
            ConfigAction::Validate => commands::config::validate(&cli).await,
        };
    }

    let config = resolve_config(&cli)?;
    logging::init(Some(&config.logging), cli.verbose);

    match cli.command {
        Commands::Serve => commands::serve::run(config).await,
        Commands::Stats { json } => commands::stats::show(config, json).await,
        Commands::Replay { last_event_id } => commands::replay::run(config, &last_event_id).await,
        Commands::Cache { action } => route_cache(config, action).await,
        Commands::Config { .. } => Ok(()),
    }
}

async fn route_cache(config: ScoutConfig, action: CacheAction) -> ScoutResult<()> {
    match action {
        CacheAction::Get { namespace, args } => commands::cache::get(config, &namespace, &args).await,
        CacheAction::Invalidate { namespace, args } => {
            commands::cache::invalidate(config, &namespace, &args).await
        }
        CacheAction::Clear => commands::cache::clear(config).await,
    }
}

/// Load the layered configuration and apply command-line overrides
pub fn resolve_config(cli: &Cli) -> ScoutResult<ScoutConfig> {
    let mut config = load_config(Some(&cli.config))?;
    if let Some(storage_path) = &cli.storage_path {
        config.storage_path = storage_path.clone();
    }
    config.validate()?;
    Ok(config)
}
