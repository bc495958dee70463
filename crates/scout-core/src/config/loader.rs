//! Layered configuration loading

use super::env_loader::apply_env_overrides;
use super::file_loader::load_from_file;
use super::model::ScoutConfig;
use crate::error::ScoutResult;
use std::path::Path;

/// Load configuration: defaults, then the file (if given and present), then
/// environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> ScoutResult<ScoutConfig> {
    let mut config = match path {
        Some(path) => load_from_file(path)?,
        None => ScoutConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;

    tracing::debug!(
        storage_path = %config.storage_path.display(),
        eager_loading = config.eager_loading,
        "configuration loaded"
    );

    Ok(config)
}
