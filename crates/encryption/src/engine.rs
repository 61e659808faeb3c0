//! # Encryption Engine
//!
//! [`Encryption`] holds the built pipelines of every target and performs the actual
//! encrypt/decrypt calls.
//!
//! * Encryption always uses the target's primary pairing. The key metadata returned by the
//!   key provider is stored in the envelope and remembered in memory as the provider's
//!   latest metadata for the next encryption.
//! * Decryption tries the primary pairing, then the fallbacks in declared order. Pairings
//!   whose method or key provider ID does not match the envelope are skipped. Only
//!   [`EncryptionError::DecryptionFailed`] moves on to the next pairing; any other error
//!   stops immediately so a broken provider is never masked by a fallback.

use crate::config::{PLAN, STATE};
use crate::envelope::Envelope;
use crate::error::{EncryptionError, EncryptionErrorExt};
use crate::keyprovider::{KeyMeta, KeyProvider, KeyProviderId};
use crate::method::{Method, MethodId};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// A key provider built from a named configuration block.
#[derive(Debug)]
pub(crate) struct BuiltKeyProvider {
    pub(crate) name: String,
    pub(crate) id: KeyProviderId,
    pub(crate) provider: Box<dyn KeyProvider>,
    pub(crate) initial_meta: KeyMeta,
}

/// A method built from a named configuration block.
#[derive(Debug)]
pub(crate) struct BuiltMethod {
    pub(crate) name: String,
    pub(crate) id: MethodId,
    pub(crate) method: Box<dyn Method>,
}

/// A resolved key provider + method combination.
#[derive(Debug, Clone)]
pub(crate) struct Pairing {
    pub(crate) key_provider: Arc<BuiltKeyProvider>,
    pub(crate) method: Arc<BuiltMethod>,
}

impl Pairing {
    /// An empty ID in the envelope matches any pairing.
    fn matches(&self, envelope: &Envelope) -> bool {
        let method = envelope.method();
        let key_provider = envelope.key_provider();
        (method.is_empty() || method == self.method.id.as_str())
            && (key_provider.is_empty() || key_provider == self.key_provider.id.as_str())
    }

    fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, EncryptionError> {
        let (key, _) = self.key_provider.provider.provide(envelope.meta())?;
        self.method.method.decrypt(envelope.ciphertext(), &key)
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.key_provider.name, self.method.name)
    }
}

/// The pairings of one target.
#[derive(Debug, Default)]
pub(crate) struct TargetPipeline {
    pub(crate) primary: Option<Pairing>,
    pub(crate) fallbacks: Vec<Pairing>,
}

impl TargetPipeline {
    fn candidates(&self) -> impl Iterator<Item = (String, &Pairing)> {
        self.primary.iter().map(|p| ("primary".to_owned(), p)).chain(
            self.fallbacks.iter().enumerate().map(|(i, p)| (format!("fallback[{i}]"), p)),
        )
    }
}

struct EncryptionInner {
    targets: BTreeMap<String, TargetPipeline>,
    key_meta: Mutex<FxHashMap<String, KeyMeta>>,
}

/// The runtime encryption engine. Cheap to clone and safe to share across threads.
///
/// ```rust
/// use sealstate_encryption::prelude::*;
/// use serde_json::json;
///
/// let registry = setup::default_registry();
/// let (config, _) = EncryptionConfig::from_value("example", json!({
///     "key_provider": { "main": { "type": "static", "config": { "passphrase": "s3cret" } } },
///     "method": { "gcm": { "type": "aes_gcm" } },
///     "target": { "state": { "primary": { "key_provider": "main", "method": "gcm" } } }
/// }));
///
/// let (encryption, diags) = Builder::new(&registry).build(&config.unwrap());
/// assert!(!diags.has_errors());
///
/// let envelope = encryption.encrypt("state", b"hello world").unwrap();
/// assert_eq!(encryption.decrypt("state", &envelope).unwrap(), b"hello world");
/// ```
#[derive(Clone)]
pub struct Encryption {
    inner: Arc<EncryptionInner>,
}

impl Encryption {
    pub(crate) fn new(targets: BTreeMap<String, TargetPipeline>) -> Self {
        Self { inner: Arc::new(EncryptionInner { targets, key_meta: Mutex::default() }) }
    }

    /// An engine with no targets. Every operation fails with `InvalidConfiguration`.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(BTreeMap::new())
    }

    /// Names of the targets that built successfully, sorted.
    #[must_use]
    pub fn targets(&self) -> Vec<&str> {
        self.inner.targets.keys().map(String::as_str).collect()
    }

    /// `true` if `name` built successfully, even when it can only decrypt.
    #[must_use]
    pub fn has_target(&self, name: &str) -> bool {
        self.inner.targets.contains_key(name)
    }

    /// `true` if `name` has a primary pairing.
    #[must_use]
    pub fn can_encrypt(&self, name: &str) -> bool {
        self.inner.targets.get(name).is_some_and(|t| t.primary.is_some())
    }

    /// Latest key metadata observed for the named key provider block.
    #[must_use]
    pub fn key_meta(&self, key_provider: &str) -> Option<KeyMeta> {
        self.inner.key_meta.lock().get(key_provider).cloned()
    }

    /// Handle bound to one target.
    ///
    /// # Errors
    /// [`EncryptionError::InvalidConfiguration`] if the target is not configured.
    pub fn target<'a>(&'a self, name: &'a str) -> Result<TargetEncryption<'a>, EncryptionError> {
        self.pipeline(name)?;
        Ok(TargetEncryption { encryption: self, name })
    }

    /// Handle bound to the `state` target.
    ///
    /// # Errors
    /// See [`Encryption::target`].
    pub fn state(&self) -> Result<TargetEncryption<'_>, EncryptionError> {
        self.target(STATE)
    }

    /// Handle bound to the `plan` target.
    ///
    /// # Errors
    /// See [`Encryption::target`].
    pub fn plan(&self) -> Result<TargetEncryption<'_>, EncryptionError> {
        self.target(PLAN)
    }

    /// Encrypts `plaintext` with the primary pairing of `target`.
    ///
    /// # Errors
    /// * [`EncryptionError::InvalidConfiguration`] if the target is unknown or has no
    ///   primary pairing.
    /// * Any error of the key provider or method.
    pub fn encrypt(&self, target: &str, plaintext: &[u8]) -> Result<Envelope, EncryptionError> {
        let pipeline = self.pipeline(target)?;
        let primary = pipeline.primary.as_ref().ok_or_else(|| {
            EncryptionError::invalid_configuration(format!(
                "target '{target}' has no primary pairing and cannot encrypt"
            ))
        })?;

        let provider = &primary.key_provider;
        let prior = self.current_meta(provider);
        let (key, meta) = provider
            .provider
            .provide(&prior)
            .context(format!("target '{target}', key provider '{}'", provider.name))?;

        let ciphertext = primary
            .method
            .method
            .encrypt(plaintext, &key)
            .context(format!("target '{target}', method '{}'", primary.method.name))?;
        drop(key);

        self.inner.key_meta.lock().insert(provider.name.clone(), meta.clone());
        debug!(
            target_name = target,
            pairing = %primary.describe(),
            bytes = plaintext.len(),
            "Encrypted payload"
        );

        Ok(Envelope::new(primary.method.id.as_str(), provider.id.as_str(), meta, ciphertext))
    }

    /// Decrypts `envelope` with the first pairing of `target` that opens it.
    ///
    /// # Errors
    /// * [`EncryptionError::InvalidConfiguration`] if the target is unknown, or a pairing
    ///   reports a broken configuration.
    /// * [`EncryptionError::DecryptionFailed`] if no pairing could open the envelope.
    pub fn decrypt(&self, target: &str, envelope: &Envelope) -> Result<Vec<u8>, EncryptionError> {
        let pipeline = self.pipeline(target)?;
        let mut attempted = 0usize;

        for (role, pairing) in pipeline.candidates() {
            if !pairing.matches(envelope) {
                debug!(target_name = target, %role, pairing = %pairing.describe(), "Skipping pairing, envelope IDs differ");
                continue;
            }
            attempted += 1;

            match pairing.open(envelope) {
                Ok(plaintext) => {
                    if role == "primary" {
                        debug!(target_name = target, pairing = %pairing.describe(), "Decrypted payload");
                    } else {
                        warn!(
                            target_name = target,
                            %role,
                            pairing = %pairing.describe(),
                            "Decrypted with a fallback pairing; data will be re-encrypted with the primary on next write"
                        );
                    }
                    return Ok(plaintext);
                },
                Err(err) if err.is_decryption_failure() => {
                    debug!(target_name = target, %role, pairing = %pairing.describe(), error = %err, "Pairing could not open envelope");
                },
                Err(err) => {
                    return Err(err)
                        .context(format!("target '{target}', {role} pairing {}", pairing.describe()));
                },
            }
        }

        Err(EncryptionError::decryption(format!(
            "no configured pairing of target '{target}' could open the data ({attempted} tried)"
        )))
    }

    fn pipeline(&self, target: &str) -> Result<&TargetPipeline, EncryptionError> {
        self.inner.targets.get(target).ok_or_else(|| {
            EncryptionError::invalid_configuration(format!("target '{target}' is not configured"))
        })
    }

    fn current_meta(&self, provider: &BuiltKeyProvider) -> KeyMeta {
        self.inner
            .key_meta
            .lock()
            .get(&provider.name)
            .cloned()
            .unwrap_or_else(|| provider.initial_meta.clone())
    }
}

impl Default for Encryption {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryption").field("targets", &self.targets()).finish_non_exhaustive()
    }
}

/// Encryption bound to a single target.
#[derive(Debug, Clone, Copy)]
pub struct TargetEncryption<'a> {
    encryption: &'a Encryption,
    name: &'a str,
}

impl TargetEncryption<'_> {
    /// Name of the bound target.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    /// # Errors
    /// See [`Encryption::encrypt`].
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, EncryptionError> {
        self.encryption.encrypt(self.name, plaintext)
    }

    /// # Errors
    /// See [`Encryption::decrypt`].
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, EncryptionError> {
        self.encryption.decrypt(self.name, envelope)
    }

    /// Encrypts and serializes the envelope.
    ///
    /// # Errors
    /// See [`Encryption::encrypt`] and [`Envelope::to_vec`].
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        self.encrypt(plaintext)?.to_vec()
    }

    /// Parses a serialized envelope and decrypts it.
    ///
    /// # Errors
    /// See [`Envelope::from_slice`] and [`Encryption::decrypt`].
    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let envelope = Envelope::from_slice(data)?;
        self.decrypt(&envelope)
    }
}
