//! # Key Providers
//!
//! A key provider turns its configuration plus a [`KeyMeta`] record into raw key material
//! ([`Output`]). The metadata it hands back travels inside the envelope and is replayed
//! verbatim when the data is decrypted, so a provider must derive the same key from the
//! same metadata.
//!
//! Lifecycle:
//! 1. [`KeyProviderDescriptor::config_struct`] hands out a fresh, empty config.
//! 2. [`KeyProviderConfig::populate`] fills it from the user-authored block body.
//! 3. [`KeyProviderConfig::build`] validates it and returns the provider together with the
//!    initial metadata used for the first encryption.
//! 4. [`KeyProvider::provide`] is called once per encrypt/decrypt.

pub mod static_key;

use crate::error::EncryptionError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Unique identifier of a key provider implementation, as used in the `type` field of a
/// `key_provider` block and in envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyProviderId(&'static str);

impl KeyProviderId {
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for KeyProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Provider-defined metadata needed to reproduce a key (a salt, a wrapped key, ...).
///
/// Structurally a record of named fields. Providers keep their own typed view of it and
/// convert with [`KeyMeta::encode`] / [`KeyMeta::decode`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMeta(Map<String, Value>);

impl KeyMeta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a provider's typed metadata record.
    ///
    /// # Errors
    /// [`EncryptionError::InvalidConfiguration`] if `value` does not serialize to a record.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, EncryptionError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(fields)) => Ok(Self(fields)),
            Ok(Value::Null) => Ok(Self::new()),
            Ok(_) => Err(EncryptionError::invalid_configuration(
                "key metadata must be a record of named fields",
            )),
            Err(err) => Err(EncryptionError::invalid_configuration_caused(
                "key metadata could not be encoded",
                err,
            )),
        }
    }

    /// Decodes the record into a provider's typed metadata.
    ///
    /// Metadata comes from envelopes, so a record that does not fit is treated as a
    /// malformed envelope.
    ///
    /// # Errors
    /// [`EncryptionError::DecryptionFailed`] if the record does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EncryptionError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|err| EncryptionError::decryption_caused("key metadata is malformed", err))
    }

    /// Raw value of one metadata field, for inspection. Providers use [`KeyMeta::decode`].
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raw symmetric key material. Zeroed on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Output {
    key: Vec<u8>,
}

impl Output {
    /// Takes ownership of `key`. Methods check the length they need.
    #[must_use]
    pub const fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    #[must_use]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output {{ key: [REDACTED; {} bytes] }}", self.key.len())
    }
}

/// A ready-to-use key provider.
pub trait KeyProvider: Send + Sync + fmt::Debug {
    /// Derives key material from `meta` and returns it with the metadata to persist.
    ///
    /// `meta` is either the initial metadata from [`KeyProviderConfig::build`], the one
    /// returned by the previous call, or the one stored in an envelope being decrypted.
    ///
    /// # Errors
    /// * [`EncryptionError::DecryptionFailed`] if `meta` is malformed.
    /// * Any other kind if the provider itself cannot operate.
    fn provide(&self, meta: &KeyMeta) -> Result<(Output, KeyMeta), EncryptionError>;
}

/// A key provider configuration of a plugin-specific shape.
pub trait KeyProviderConfig: Send + fmt::Debug {
    /// Fills the configuration from a structured block body.
    ///
    /// # Errors
    /// [`EncryptionError::InvalidConfiguration`] if the body does not match the shape.
    fn populate(&mut self, body: &Value) -> Result<(), EncryptionError>;

    /// Validates the configuration and builds the provider plus its initial metadata.
    ///
    /// # Errors
    /// [`EncryptionError::InvalidConfiguration`] on invalid settings.
    fn build(&self) -> Result<(Box<dyn KeyProvider>, KeyMeta), EncryptionError>;
}

/// Registration entry of a key provider implementation.
pub trait KeyProviderDescriptor: Send + Sync + fmt::Debug {
    fn id(&self) -> KeyProviderId;

    /// Returns a fresh, independent configuration value ready to be populated.
    fn config_struct(&self) -> Box<dyn KeyProviderConfig>;
}
