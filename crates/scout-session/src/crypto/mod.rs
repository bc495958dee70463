//! Message protection applied on the event path
//!
//! [`Sanitizer`] redacts credentials before a message is stored or logged,
//! whether or not encryption is enabled. [`MessageCipher`] optionally
//! encrypts the sanitized message before it reaches the disk.

mod cipher;
mod sanitize;

pub use cipher::{ALGORITHM, EncryptedEnvelope, MessageCipher};
pub use sanitize::{REDACTED, Sanitizer};

use thiserror::Error;

/// Encryption errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Authentication failed: ciphertext or key mismatch")]
    Authentication,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
