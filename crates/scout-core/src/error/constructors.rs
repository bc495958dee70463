//! Constructor methods for ScoutError

use super::types::ScoutError;
use std::path::Path;

impl ScoutError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a compute error for a cache namespace
    pub fn compute(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compute {
            namespace: namespace.into(),
            message: message.into(),
            context: None,
        }
    }

    /// Create a new persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            path: None,
            context: None,
        }
    }

    /// Create a persistence error tied to a file system path
    pub fn persistence_at(message: impl Into<String>, path: &Path) -> Self {
        Self::Persistence {
            message: message.into(),
            path: Some(path.display().to_string()),
            context: None,
        }
    }

    /// Create a decryption error for one event
    pub fn decryption(event_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decryption {
            event_id: event_id.into(),
            message: message.into(),
        }
    }

    /// Create a new initialization error
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
            context: None,
        }
    }

    /// Create an initialization error with context
    pub fn initialization_with_context(
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::Initialization {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a replay error for a stream
    pub fn replay(stream_id: impl Into<String>, message: impl Into<String>, delivered: usize) -> Self {
        Self::Replay {
            stream_id: stream_id.into(),
            message: message.into(),
            delivered,
        }
    }

    /// Create a timeout error
    pub fn timeout(millis: u64) -> Self {
        Self::Timeout {
            millis,
            context: None,
        }
    }

    /// Create a timeout error with context
    pub fn timeout_with_context(millis: u64, context: impl Into<String>) -> Self {
        Self::Timeout {
            millis,
            context: Some(context.into()),
        }
    }

    /// Create a new IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
            context: None,
        }
    }

    /// Create an IO error with path
    pub fn io_with_path(message: impl Into<String>, path: &Path) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.display().to_string()),
            context: None,
        }
    }

    /// Create a new JSON error
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
            context: None,
        }
    }

    /// Create an invalid input error naming the offending field
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
            context: None,
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: None,
            context: None,
        }
    }

    /// Create a not found error with resource type
    pub fn not_found_resource(message: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: Some(resource_type.into()),
            context: None,
        }
    }

    /// Create a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
            context: None,
        }
    }

    /// Attach context to errors that carry a context slot
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        let ctx = Some(ctx.into());
        match &mut self {
            Self::Config { context, .. }
            | Self::Compute { context, .. }
            | Self::Persistence { context, .. }
            | Self::Initialization { context, .. }
            | Self::Timeout { context, .. }
            | Self::Io { context, .. }
            | Self::Json { context, .. }
            | Self::InvalidInput { context, .. }
            | Self::NotFound { context, .. }
            | Self::Other { context, .. } => *context = ctx,
            Self::Decryption { .. } | Self::Replay { .. } => {}
        }
        self
    }
}
