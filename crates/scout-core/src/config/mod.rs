//! Configuration management for Scout
//!
//! Configuration is layered: defaults, then an optional JSON/TOML/YAML file,
//! then `SCOUT_*` environment overrides. The result is validated before any
//! store is opened.

pub mod env_loader;
pub mod file_loader;
pub mod loader;
pub mod logging_config;
pub mod model;

pub use loader::load_config;
pub use logging_config::{LogFormat, LoggingConfig};
pub use model::{
    CacheConfig, EncryptionConfig, EventConfig, HumanDuration, SanitizationConfig, ScoutConfig,
};
