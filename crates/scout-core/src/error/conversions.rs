//! From trait implementations for ScoutError conversions

use super::types::ScoutError;

impl From<anyhow::Error> for ScoutError {
    fn from(error: anyhow::Error) -> Self {
        Self::other(format!("{:#}", error))
    }
}

impl From<std::io::Error> for ScoutError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for ScoutError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<toml::de::Error> for ScoutError {
    fn from(error: toml::de::Error) -> Self {
        Self::config(format!("Failed to parse TOML: {}", error))
    }
}

impl From<serde_yaml::Error> for ScoutError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("Failed to parse YAML: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for ScoutError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout {
            millis: 0,
            context: Some("deadline elapsed".to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ScoutError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_cancelled() {
            Self::other("background task was cancelled")
        } else {
            Self::other(format!("background task panicked: {}", error))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnifiedError;

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ScoutError = io.into();
        assert_eq!(err.error_code(), "SCOUT_IO");
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ScoutError = parse.into();
        assert_eq!(err.error_code(), "SCOUT_JSON");
    }

    #[test]
    fn test_anyhow_keeps_chain() {
        let err: ScoutError = anyhow::anyhow!("root cause").context("upstream call").into();
        assert!(err.message().contains("upstream call"));
        assert!(err.message().contains("root cause"));
    }
}
