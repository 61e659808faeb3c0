//! # Envelope
//!
//! The persisted form of encrypted data. It names the method and key provider that
//! produced it and carries the key metadata needed to re-derive the key, so decryption
//! needs nothing but the envelope and a configuration that still knows those plugins.
//!
//! ```json
//! {
//!   "version": 1,
//!   "method": "aes_gcm",
//!   "key_provider": "static",
//!   "meta": {
//!     "salt": "q83vEjRWeJq83vEjRWeJqw==",
//!     "kdf": { "algorithm": "argon2id", "memory_kib": 19456, "iterations": 2, "parallelism": 1 }
//!   },
//!   "ciphertext": "AQID..."
//! }
//! ```
//!
//! The field names and the `version` marker are part of the on-disk format.

use crate::error::EncryptionError;
use crate::keyprovider::KeyMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    version: u32,
    method: String,
    #[serde(default)]
    key_provider: String,
    #[serde(default)]
    meta: KeyMeta,
    #[serde(with = "base64_bytes")]
    ciphertext: Vec<u8>,
}

impl Envelope {
    /// Wraps `ciphertext` in an envelope of the current [`ENVELOPE_VERSION`].
    ///
    /// `method` and `key_provider` are plugin IDs, not configuration block names.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        key_provider: impl Into<String>,
        meta: KeyMeta,
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            method: method.into(),
            key_provider: key_provider.into(),
            meta,
            ciphertext,
        }
    }

    /// Format version. Always [`ENVELOPE_VERSION`] for envelopes that parsed.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// ID of the method that produced the ciphertext. Empty if unknown.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// ID of the key provider whose metadata is stored. Empty if unknown.
    #[must_use]
    pub fn key_provider(&self) -> &str {
        &self.key_provider
    }

    /// Key provider metadata, handed back to the provider on decryption.
    #[must_use]
    pub const fn meta(&self) -> &KeyMeta {
        &self.meta
    }

    /// Method output, including whatever nonce and tag the method embeds.
    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serializes the envelope to its JSON form.
    ///
    /// # Errors
    /// [`EncryptionError::EncryptionFailed`] if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>, EncryptionError> {
        serde_json::to_vec(self).map_err(|err| {
            EncryptionError::encryption_caused("envelope could not be serialized", err)
        })
    }

    /// Parses an envelope from its JSON form.
    ///
    /// # Errors
    /// [`EncryptionError::DecryptionFailed`] if the data is not an envelope or uses an
    /// unsupported version.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let envelope: Self = serde_json::from_slice(bytes)
            .map_err(|err| EncryptionError::decryption_caused("data is not a valid envelope", err))?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(EncryptionError::decryption(format!(
                "unsupported envelope version {}, expected {ENVELOPE_VERSION}",
                envelope.version
            )));
        }
        Ok(envelope)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("version", &self.version)
            .field("method", &self.method)
            .field("key_provider", &self.key_provider)
            .field("meta", &self.meta)
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
