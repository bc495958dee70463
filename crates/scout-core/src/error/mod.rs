//! Error types for Scout
//!
//! This module provides the unified error handling system shared by the cache,
//! the event store and the CLI. All errors implement the `UnifiedError` trait
//! which provides consistent fields:
//! - error_code: A unique identifier for programmatic error handling
//! - message: Human-readable error message
//! - context: Optional additional context about where/why the error occurred

mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use types::{ResultExt, ScoutError, ScoutResult, UnifiedError};
