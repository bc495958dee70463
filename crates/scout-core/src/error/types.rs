//! Core error types and traits for Scout

use thiserror::Error;

/// Result type alias for Scout operations
pub type ScoutResult<T> = Result<T, ScoutError>;

/// Unified error trait that all Scout errors implement.
///
/// This trait ensures consistent error handling across all crates by providing:
/// - error_code(): Unique code for programmatic error identification
/// - message(): Human-readable error message
/// - context(): Optional additional context
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if the failed operation may succeed when retried
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<C: std::fmt::Display>(self, context: C) -> ScoutResult<T>;

    /// Add context lazily (only evaluated on error)
    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> ScoutResult<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn context<C: std::fmt::Display>(self, context: C) -> ScoutResult<T> {
        self.map_err(|e| ScoutError::other(format!("{}: {}", context, e)))
    }

    fn with_context<C: std::fmt::Display, F: FnOnce() -> C>(self, f: F) -> ScoutResult<T> {
        self.map_err(|e| ScoutError::other(format!("{}: {}", f(), e)))
    }
}

/// Main error type for Scout
///
/// The type is `Clone` because every caller attached to one in-flight cache
/// computation receives the same outcome.
#[derive(Error, Debug, Clone)]
pub enum ScoutError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// A cache compute function failed; never stored as a value
    #[error("Compute error in '{namespace}': {message}")]
    Compute {
        namespace: String,
        message: String,
        context: Option<String>,
    },

    /// Disk persistence failure
    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        path: Option<String>,
        context: Option<String>,
    },

    /// A single stored event could not be decrypted
    #[error("Decryption error for event {event_id}: {message}")]
    Decryption {
        event_id: String,
        message: String,
    },

    /// Storage could not be brought up; fatal at startup
    #[error("Initialization error: {message}")]
    Initialization {
        message: String,
        context: Option<String>,
    },

    /// Replay of a whole stream failed
    #[error("Replay error for stream {stream_id}: {message}")]
    Replay {
        stream_id: String,
        message: String,
        delivered: usize,
    },

    /// Operation exceeded its time budget
    #[error("Operation timed out after {millis} ms")]
    Timeout {
        millis: u64,
        context: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
        context: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// Invalid input errors
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
        context: Option<String>,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        resource_type: Option<String>,
        context: Option<String>,
    },

    /// Generic error with context
    #[error("Error: {message}")]
    Other {
        message: String,
        context: Option<String>,
    },
}
