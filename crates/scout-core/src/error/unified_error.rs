//! UnifiedError trait implementation for ScoutError

use super::types::{ScoutError, UnifiedError};

impl UnifiedError for ScoutError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "SCOUT_CONFIG",
            Self::Compute { .. } => "SCOUT_COMPUTE",
            Self::Persistence { .. } => "SCOUT_PERSISTENCE",
            Self::Decryption { .. } => "SCOUT_DECRYPTION",
            Self::Initialization { .. } => "SCOUT_INITIALIZATION",
            Self::Replay { .. } => "SCOUT_REPLAY",
            Self::Timeout { .. } => "SCOUT_TIMEOUT",
            Self::Io { .. } => "SCOUT_IO",
            Self::Json { .. } => "SCOUT_JSON",
            Self::InvalidInput { .. } => "SCOUT_INVALID_INPUT",
            Self::NotFound { .. } => "SCOUT_NOT_FOUND",
            Self::Other { .. } => "SCOUT_OTHER",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::Compute { message, .. } => message,
            Self::Persistence { message, .. } => message,
            Self::Decryption { message, .. } => message,
            Self::Initialization { message, .. } => message,
            Self::Replay { message, .. } => message,
            Self::Timeout { .. } => "Operation timed out",
            Self::Io { message, .. } => message,
            Self::Json { message, .. } => message,
            Self::InvalidInput { message, .. } => message,
            Self::NotFound { message, .. } => message,
            Self::Other { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::Compute { context, .. } => context.as_deref(),
            Self::Persistence { context, .. } => context.as_deref(),
            Self::Decryption { .. } => None,
            Self::Initialization { context, .. } => context.as_deref(),
            Self::Replay { .. } => None,
            Self::Timeout { context, .. } => context.as_deref(),
            Self::Io { context, .. } => context.as_deref(),
            Self::Json { context, .. } => context.as_deref(),
            Self::InvalidInput { context, .. } => context.as_deref(),
            Self::NotFound { context, .. } => context.as_deref(),
            Self::Other { context, .. } => context.as_deref(),
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Compute { .. } | Self::Timeout { .. } | Self::Persistence { .. } | Self::Io { .. }
        )
    }
}
