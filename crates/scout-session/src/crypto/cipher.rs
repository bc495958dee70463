//! AES-256-GCM message encryption

use super::CryptoError;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use scout_core::config::EncryptionConfig;
use scout_core::error::{ScoutError, ScoutResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algorithm label written into every envelope
pub const ALGORITHM: &str = "aes-256-gcm";

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypted message as stored on disk; all binary fields are base64
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
    pub algorithm: String,
}

/// Encrypts and decrypts JSON messages with a single 256-bit key
pub struct MessageCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessageCipher { .. }")
    }
}

impl MessageCipher {
    /// Create a cipher from raw key bytes
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Create a cipher from a base64-encoded key
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Self::new(&key)
    }

    /// Build the configured cipher, if encryption is enabled
    pub fn from_config(config: &EncryptionConfig) -> ScoutResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let key = config.key.as_deref().ok_or_else(|| {
            ScoutError::config_with_context(
                "encryption is enabled but no key is configured",
                "set encryption.key or SCOUT_EVENT_KEY",
            )
        })?;
        Self::from_base64(key)
            .map(Some)
            .map_err(|e| ScoutError::config_with_context(e.to_string(), "encryption.key"))
    }

    /// Fresh random key, base64-encoded
    pub fn generate_key() -> String {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        STANDARD.encode(key)
    }

    /// Serialize and encrypt a message under a fresh random IV
    pub fn encrypt_message(&self, message: &serde_json::Value) -> Result<EncryptedEnvelope, CryptoError> {
        let plaintext = serde_json::to_vec(message)?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_ref())
            .map_err(|_| CryptoError::Authentication)?;
        // aes-gcm appends the tag to the ciphertext
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedEnvelope {
            iv: STANDARD.encode(iv),
            ciphertext: STANDARD.encode(&sealed),
            tag: STANDARD.encode(tag),
            algorithm: ALGORITHM.to_string(),
        })
    }

    /// Decrypt and deserialize a message
    pub fn decrypt_message(&self, envelope: &EncryptedEnvelope) -> Result<serde_json::Value, CryptoError> {
        if envelope.algorithm != ALGORITHM {
            return Err(CryptoError::UnsupportedAlgorithm(envelope.algorithm.clone()));
        }

        let iv = decode_field("iv", &envelope.iv)?;
        let mut sealed = decode_field("ciphertext", &envelope.ciphertext)?;
        let tag = decode_field("tag", &envelope.tag)?;
        if iv.len() != IV_LEN {
            return Err(CryptoError::Malformed(format!("iv must be {} bytes", IV_LEN)));
        }
        if tag.len() != TAG_LEN {
            return Err(CryptoError::Malformed(format!("tag must be {} bytes", TAG_LEN)));
        }
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| CryptoError::Authentication)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::Malformed(format!("{}: {}", name, e)))
}
