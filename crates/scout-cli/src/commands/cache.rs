//! `scout cache`

use super::with_context;
use crate::console::CliConsole;
use scout_core::config::ScoutConfig;
use scout_core::error::{ScoutError, ScoutResult};
use serde_json::Value;

fn parse_args(raw: &str) -> ScoutResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| ScoutError::invalid_input_field(format!("arguments are not valid JSON: {}", e), "args"))
}

/// Print the cached value for a call
pub async fn get(config: ScoutConfig, namespace: &str, raw_args: &str) -> ScoutResult<()> {
    let args = parse_args(raw_args)?;
    let namespace = namespace.to_string();
    let value = with_context(config, |context| {
        let cache = context.cache();
        async move { Ok::<_, ScoutError>(cache.peek(&namespace, &args)) }
    })
    .await?;

    match value {
        Some(value) => {
            let rendered = serde_json::to_string_pretty(&value)
                .map_err(|e| ScoutError::json(e.to_string()))?;
            println!("{}", rendered);
        }
        None => CliConsole::new(true).warn("Not cached"),
    }
    Ok(())
}

/// Drop the cached value for a call
pub async fn invalidate(config: ScoutConfig, namespace: &str, raw_args: &str) -> ScoutResult<()> {
    let args = parse_args(raw_args)?;
    let namespace = namespace.to_string();
    let removed = with_context(config, |context| {
        let cache = context.cache();
        async move { cache.invalidate(&namespace, &args).await }
    })
    .await?;

    let console = CliConsole::new(true);
    if removed {
        console.success("Entry invalidated");
    } else {
        console.warn("No entry for these arguments");
    }
    Ok(())
}

/// Drop every cached value
pub async fn clear(config: ScoutConfig) -> ScoutResult<()> {
    with_context(config, |context| {
        let cache = context.cache();
        async move { cache.clear().await }
    })
    .await?;

    CliConsole::new(true).success("Cache cleared");
    Ok(())
}
