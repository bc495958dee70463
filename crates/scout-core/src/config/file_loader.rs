//! File-based configuration loading
//!
//! The file format follows the extension. A relative `storage_path` is
//! resolved against the directory holding the file, and a leading `~`
//! expands to the home directory, so one config file can be shared by
//! processes started from different working directories.

use super::model::ScoutConfig;
use crate::error::{ScoutError, ScoutResult};
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> ScoutResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            other => Err(ScoutError::config_with_context(
                format!(
                    "Unsupported config file extension '{}': expected .toml, .yaml, .yml or .json",
                    other.unwrap_or("")
                ),
                format!("Loading configuration from '{}'", path.display()),
            )),
        }
    }

    fn parse(self, content: &str) -> Result<ScoutConfig, String> {
        match self {
            Self::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => write!(f, "TOML"),
            Self::Yaml => write!(f, "YAML"),
            Self::Json => write!(f, "JSON"),
        }
    }
}

/// Load configuration from a file.
///
/// Returns the default config if the file does not exist.
pub fn load_from_file(path: &Path) -> ScoutResult<ScoutConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(ScoutConfig::default());
    }

    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path).map_err(|e| {
        ScoutError::config_with_context(
            format!("Failed to read config file: {}", e),
            format!("Reading configuration from '{}'", path.display()),
        )
    })?;

    let mut config = format.parse(&content).map_err(|e| {
        ScoutError::config_with_context(
            format!("Failed to parse {} config: {}", format, e),
            format!("Deserializing {} configuration from '{}'", format, path.display()),
        )
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    config.storage_path = resolve_storage_path(&config.storage_path, base);
    Ok(config)
}

/// Expand `~` and anchor a relative path at `base`
fn resolve_storage_path(storage_path: &Path, base: &Path) -> PathBuf {
    let mut components = storage_path.components();
    if components.next() == Some(Component::Normal("~".as_ref())) {
        if let Some(home) = dirs::home_dir() {
            return home.join(components.as_path());
        }
    }

    if storage_path.is_relative() && !storage_path.as_os_str().is_empty() {
        base.join(storage_path)
    } else {
        storage_path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("scout.json");
        let config_json = r#"{
            "storage_path": "/srv/scout",
            "eager_loading": false,
            "cache": {
                "max_size": 25,
                "critical_namespaces": ["patent"]
            },
            "logging": { "level": "debug", "format": "json" }
        }"#;
        fs::write(&config_path, config_json).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.storage_path.to_str(), Some("/srv/scout"));
        assert!(!config.eager_loading);
        assert_eq!(config.cache.max_size, 25);
        assert_eq!(config.cache.critical_namespaces, vec!["patent".to_string()]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("scout.toml");
        let config_toml = r#"
storage_path = "/srv/scout"

[events]
max_events_per_stream = 10
event_ttl = "30m"
critical_stream_ids = ["admin"]
"#;
        fs::write(&config_path, config_toml).unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.events.max_events_per_stream, 10);
        assert_eq!(config.events.event_ttl, Duration::from_secs(1800));
        assert_eq!(config.events.critical_stream_ids, vec!["admin".to_string()]);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("scout.yml");
        fs::write(
            &config_path,
            "storage_path: /srv/scout\ncache:\n  default_ttl: 10s\n  purge_batch_size: 64\n",
        )
        .unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.cache.default_ttl, Duration::from_secs(10));
        assert_eq!(config.cache.purge_batch_size, 64);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let config = load_from_file(Path::new("/nonexistent/scout.json")).unwrap();
        assert_eq!(config.cache.max_size, 1000);
    }

    #[test]
    fn test_parse_error_names_format_and_location() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.json");
        fs::write(&config_path, "{\n  \"eager_loading\": nope\n}").unwrap();

        match load_from_file(&config_path).unwrap_err() {
            ScoutError::Config { message, context } => {
                assert!(message.starts_with("Failed to parse JSON config"), "{}", message);
                assert!(message.contains("line 2"), "{}", message);
                assert!(context.unwrap().contains("broken.json"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("scout.ini");
        fs::write(&config_path, "storage_path = /srv/scout").unwrap();

        match load_from_file(&config_path).unwrap_err() {
            ScoutError::Config { message, .. } => assert!(message.contains("'ini'"), "{}", message),
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_format_detection_ignores_case() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("Scout.TOML")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("scout.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(ConfigFormat::from_path(Path::new("scout")).is_err());
    }

    #[test]
    fn test_relative_storage_path_resolved_against_config_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("etc");
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join("scout.toml");
        fs::write(&config_path, "storage_path = \"data/scout\"\n").unwrap();

        let config = load_from_file(&config_path).unwrap();
        assert_eq!(config.storage_path, config_dir.join("data/scout"));
        assert_eq!(config.cache_dir(), config_dir.join("data/scout/cache"));
    }

    #[test]
    fn test_home_relative_storage_path_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(
            resolve_storage_path(Path::new("~/.scout"), Path::new("/etc")),
            home.join(".scout")
        );
        assert_eq!(
            resolve_storage_path(Path::new("/var/lib/scout"), Path::new("/etc")),
            PathBuf::from("/var/lib/scout")
        );
    }
}
