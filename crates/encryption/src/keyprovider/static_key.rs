//! The `static` key provider.
//!
//! Supplies a key fixed by configuration, in one of two forms:
//!
//! * `key`: hex-encoded raw key bytes, used as-is. The metadata record stays empty.
//! * `passphrase`: a secret string stretched with Argon2id. A random 16-byte salt is drawn
//!   when the provider is built. The salt and the Argon2id costs are stored in the metadata,
//!   so every envelope carries what is needed to re-derive its key even after the
//!   configured costs change:
//!
//! ```json
//! { "salt": "<base64>", "kdf": { "algorithm": "argon2id", "memory_kib": 19456, "iterations": 2, "parallelism": 1 } }
//! ```
//!
//! Configuration:
//!
//! ```json
//! { "type": "static", "config": { "passphrase": "correct horse battery staple" } }
//! { "type": "static", "config": { "passphrase": "...", "kdf": { "memory_kib": 65536, "iterations": 3 } } }
//! ```
//!
//! Omitted `kdf` fields fall back to 19 MiB of memory, 2 passes and 1 lane.

use crate::config::populate_from;
use crate::error::EncryptionError;
use crate::keyprovider::{
    KeyMeta, KeyProvider, KeyProviderConfig, KeyProviderDescriptor, KeyProviderId, Output,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use getrandom::fill;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const ID: KeyProviderId = KeyProviderId::new("static");

/// Length of keys derived from a passphrase.
pub const DERIVED_KEY_LEN: usize = 32;

const SALT_LEN: usize = 16;
const KDF_ARGON2ID: &str = "argon2id";

// Envelope metadata is untrusted input; these caps bound the work a decrypt can be made to do.
const MAX_MEMORY_KIB: u32 = 1 << 20;
const MAX_ITERATIONS: u32 = 16;
const MAX_PARALLELISM: u32 = 16;

/// Descriptor of the `static` key provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticDescriptor;

impl KeyProviderDescriptor for StaticDescriptor {
    fn id(&self) -> KeyProviderId {
        ID
    }

    fn config_struct(&self) -> Box<dyn KeyProviderConfig> {
        Box::new(StaticConfig::default())
    }
}

/// Argon2id cost parameters for passphrase keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes over the memory.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self { memory_kib: 19_456, iterations: 2, parallelism: 1 }
    }
}

impl KdfParams {
    /// Validates the costs and converts them for the `argon2` crate.
    fn argon2_params(self) -> Result<Params, String> {
        if self.memory_kib > MAX_MEMORY_KIB {
            return Err(format!("memory_kib {} exceeds {MAX_MEMORY_KIB}", self.memory_kib));
        }
        if self.iterations > MAX_ITERATIONS {
            return Err(format!("iterations {} exceeds {MAX_ITERATIONS}", self.iterations));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(format!("parallelism {} exceeds {MAX_PARALLELISM}", self.parallelism));
        }
        Params::new(self.memory_kib, self.iterations, self.parallelism, Some(DERIVED_KEY_LEN))
            .map_err(|err| format!("invalid argon2id costs: {err}"))
    }
}

/// Configuration of the `static` key provider. Exactly one of `key` and `passphrase` must
/// be set; `kdf` only applies to `passphrase`.
#[derive(Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    passphrase: Option<String>,
    #[serde(default)]
    #[zeroize(skip)]
    kdf: Option<KdfParams>,
}

impl fmt::Debug for StaticConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("kdf", &self.kdf)
            .finish()
    }
}

impl KeyProviderConfig for StaticConfig {
    fn populate(&mut self, body: &Value) -> Result<(), EncryptionError> {
        *self = populate_from(body)?;
        Ok(())
    }

    fn build(&self) -> Result<(Box<dyn KeyProvider>, KeyMeta), EncryptionError> {
        match (&self.key, &self.passphrase) {
            (Some(key), None) => {
                if self.kdf.is_some() {
                    return Err(EncryptionError::invalid_configuration(
                        "`kdf` only applies to `passphrase`, not to a raw `key`",
                    ));
                }
                let bytes = hex::decode(key.trim()).map_err(|err| {
                    EncryptionError::invalid_configuration_caused("static key is not valid hex", err)
                })?;
                if bytes.is_empty() {
                    return Err(EncryptionError::invalid_configuration("static key is empty"));
                }
                Ok((Box::new(StaticKeyProvider::new(Secret::Raw(bytes))), KeyMeta::new()))
            },
            (None, Some(passphrase)) => {
                if passphrase.is_empty() {
                    return Err(EncryptionError::invalid_configuration(
                        "static passphrase is empty",
                    ));
                }
                let kdf = self.kdf.unwrap_or_default();
                kdf.argon2_params().map_err(EncryptionError::invalid_configuration)?;

                let mut salt = [0u8; SALT_LEN];
                fill(&mut salt).map_err(|err| {
                    EncryptionError::invalid_configuration(format!(
                        "system RNG unavailable for salt generation: {err}"
                    ))
                })?;
                let meta = KeyMeta::encode(&StaticMeta {
                    salt: Some(STANDARD.encode(salt)),
                    kdf: Some(KdfMeta::argon2id(kdf)),
                })?;
                let secret = Secret::Passphrase(passphrase.as_bytes().to_vec());
                Ok((Box::new(StaticKeyProvider::new(secret)), meta))
            },
            (Some(_), Some(_)) => Err(EncryptionError::invalid_configuration(
                "static key provider accepts either `key` or `passphrase`, not both",
            )),
            (None, None) => Err(EncryptionError::invalid_configuration(
                "static key provider requires `key` or `passphrase`",
            )),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StaticMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    kdf: Option<KdfMeta>,
}

/// Key derivation settings as persisted in envelopes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KdfMeta {
    algorithm: String,
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl KdfMeta {
    fn argon2id(params: KdfParams) -> Self {
        Self {
            algorithm: KDF_ARGON2ID.to_owned(),
            memory_kib: params.memory_kib,
            iterations: params.iterations,
            parallelism: params.parallelism,
        }
    }

    fn params(&self) -> Result<Params, EncryptionError> {
        if self.algorithm != KDF_ARGON2ID {
            return Err(EncryptionError::decryption(format!(
                "unsupported key derivation '{}', expected '{KDF_ARGON2ID}'",
                self.algorithm
            )));
        }
        KdfParams {
            memory_kib: self.memory_kib,
            iterations: self.iterations,
            parallelism: self.parallelism,
        }
        .argon2_params()
        .map_err(|err| EncryptionError::decryption(format!("key metadata is unusable: {err}")))
    }
}

#[derive(Zeroize, ZeroizeOnDrop)]
enum Secret {
    Raw(Vec<u8>),
    Passphrase(Vec<u8>),
}

/// A built `static` key provider.
///
/// Passphrase keys are expensive to derive, so the key of the most recently seen metadata
/// is kept. Encryption reuses one metadata record, which makes repeated writes cheap.
pub struct StaticKeyProvider {
    secret: Secret,
    last: Mutex<Option<(KeyMeta, Output)>>,
}

impl StaticKeyProvider {
    fn new(secret: Secret) -> Self {
        Self { secret, last: Mutex::new(None) }
    }
}

impl fmt::Debug for StaticKeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.secret {
            Secret::Raw(_) => "raw",
            Secret::Passphrase(_) => "passphrase",
        };
        f.debug_struct("StaticKeyProvider").field("mode", &mode).finish_non_exhaustive()
    }
}

impl KeyProvider for StaticKeyProvider {
    fn provide(&self, meta: &KeyMeta) -> Result<(Output, KeyMeta), EncryptionError> {
        let StaticMeta { salt, kdf } = meta.decode()?;

        let passphrase = match &self.secret {
            Secret::Raw(key) => return Ok((Output::new(key.clone()), meta.clone())),
            Secret::Passphrase(passphrase) => passphrase,
        };

        let cached = self
            .last
            .lock()
            .as_ref()
            .filter(|(seen, _)| seen == meta)
            .map(|(_, key)| key.clone());
        if let Some(output) = cached {
            return Ok((output, meta.clone()));
        }

        let salt = salt.ok_or_else(|| {
            EncryptionError::decryption("key metadata carries no passphrase salt")
        })?;
        let salt = STANDARD.decode(salt).map_err(|err| {
            EncryptionError::decryption_caused("key metadata salt is not base64", err)
        })?;
        if salt.len() != SALT_LEN {
            return Err(EncryptionError::decryption(format!(
                "key metadata salt has {} bytes, expected {SALT_LEN}",
                salt.len()
            )));
        }
        let params = kdf
            .ok_or_else(|| {
                EncryptionError::decryption("key metadata carries no key derivation settings")
            })?
            .params()?;

        let output = derive_key(passphrase, &salt, params)?;
        *self.last.lock() = Some((meta.clone(), output.clone()));
        Ok((output, meta.clone()))
    }
}

fn derive_key(passphrase: &[u8], salt: &[u8], params: Params) -> Result<Output, EncryptionError> {
    let mut key = vec![0u8; DERIVED_KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(passphrase, salt, &mut key)
        .map_err(|err| {
            EncryptionError::invalid_configuration(format!(
                "argon2id derivation failed for passphrase key: {err}"
            ))
        })?;
    Ok(Output::new(key))
}
