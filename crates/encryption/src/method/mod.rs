//! # Methods
//!
//! A method is a symmetric transformation that turns plaintext into ciphertext and back,
//! using key material produced by a key provider. Methods never see [`KeyMeta`]; they only
//! receive the [`Output`] of a provider.
//!
//! The lifecycle mirrors key providers: descriptor, fresh config, populate, build.
//!
//! [`KeyMeta`]: crate::keyprovider::KeyMeta

pub mod aead;

use crate::error::EncryptionError;
use crate::keyprovider::Output;
use serde_json::Value;
use std::fmt;

/// Unique identifier of a method implementation, as used in the `type` field of a `method`
/// block and in envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(&'static str);

impl MethodId {
    #[must_use]
    pub const fn new(id: &'static str) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A ready-to-use encryption method.
pub trait Method: Send + Sync + fmt::Debug {
    /// Encrypts `plaintext` with the given key material.
    ///
    /// # Errors
    /// [`EncryptionError::EncryptionFailed`] on any cipher error, including key material of
    /// the wrong length.
    fn encrypt(&self, plaintext: &[u8], key: &Output) -> Result<Vec<u8>, EncryptionError>;

    /// Decrypts `ciphertext`, verifying its integrity before anything is returned.
    ///
    /// # Errors
    /// * [`EncryptionError::DecryptionFailed`] if authentication fails or the ciphertext is
    ///   malformed.
    /// * [`EncryptionError::InvalidConfiguration`] if the key material has the wrong length.
    fn decrypt(&self, ciphertext: &[u8], key: &Output) -> Result<Vec<u8>, EncryptionError>;
}

/// A method configuration of a plugin-specific shape.
pub trait MethodConfig: Send + fmt::Debug {
    /// Fills the configuration from a structured block body.
    ///
    /// # Errors
    /// [`EncryptionError::InvalidConfiguration`] if the body does not match the shape.
    fn populate(&mut self, body: &Value) -> Result<(), EncryptionError>;

    /// Validates the configuration and builds the method.
    ///
    /// # Errors
    /// [`EncryptionError::InvalidConfiguration`] on invalid settings.
    fn build(&self) -> Result<Box<dyn Method>, EncryptionError>;
}

/// Registration entry of a method implementation.
pub trait MethodDescriptor: Send + Sync + fmt::Debug {
    fn id(&self) -> MethodId;

    /// Returns a fresh, independent configuration value ready to be populated.
    fn config_struct(&self) -> Box<dyn MethodConfig>;
}
