//! Pluggable encryption of state snapshots and execution plans at rest.
//!
//! Operators configure, per target (`state`, `plan`, ...), which **key provider** derives
//! the key and which **method** encrypts the data. The framework resolves that
//! configuration into live plugins, encrypts payloads into self-describing [`Envelope`]s
//! and decrypts them again, falling back to older pairings after a key or method rotation.
//!
//! ## Wiring
//!
//! ```text
//! LockingRegistry ──register_builtins──▶ Builder::new(&registry)
//! base config ─┐                               │
//! TF_ENCRYPTION ┴─ merge ─▶ EncryptionConfig ──┴─ build ─▶ (Encryption, Diagnostics)
//! ```
//!
//! ## Error kinds
//!
//! Every failure is an [`EncryptionError`] of one of three kinds. Only
//! [`EncryptionError::DecryptionFailed`] lets decryption continue with the next fallback
//! pairing; configuration problems always stop the operation.
//!
//! ## Example
//!
//! ```rust
//! use sealstate_encryption::prelude::*;
//!
//! # fn main() -> Result<(), EncryptionError> {
//! let text = r#"{
//!     "key_provider": {
//!         "new": { "type": "static", "config": { "passphrase": "2026 passphrase" } },
//!         "old": { "type": "static", "config": { "passphrase": "2025 passphrase" } }
//!     },
//!     "method": { "gcm": { "type": "aes_gcm" } },
//!     "target": {
//!         "state": {
//!             "primary": { "key_provider": "new", "method": "gcm" },
//!             "fallback": [{ "key_provider": "old", "method": "gcm" }]
//!         }
//!     }
//! }"#;
//!
//! let (config, diags) = EncryptionConfig::parse("encryption.json", text);
//! assert!(!diags.has_errors(), "{diags}");
//!
//! let registry = setup::default_registry();
//! let (encryption, diags) = Builder::new(&registry).build(&config.unwrap_or_default());
//! assert!(diags.is_empty());
//!
//! let state = encryption.state()?;
//! let sealed = state.encrypt_bytes(b"{\"resources\": []}")?;
//! assert_eq!(state.decrypt_bytes(&sealed)?, b"{\"resources\": []}");
//! # Ok(())
//! # }
//! ```

mod builder;
pub mod config;
pub mod diagnostics;
mod engine;
mod envelope;
mod error;
pub mod keyprovider;
pub mod method;
pub mod registry;
pub mod setup;

pub use builder::Builder;
pub use config::{
    ConfigSyntax, EncryptionConfig, PLAN, PairingRef, PluginBlock, STATE, TargetConfig,
};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use engine::{Encryption, TargetEncryption};
pub use envelope::{ENVELOPE_VERSION, Envelope};
pub use error::{BoxError, CryptoFailure, EncryptionError, EncryptionErrorExt, ErrorKind};
pub use keyprovider::static_key::KdfParams;
pub use keyprovider::{
    KeyMeta, KeyProvider, KeyProviderConfig, KeyProviderDescriptor, KeyProviderId, Output,
};
pub use method::{Method, MethodConfig, MethodDescriptor, MethodId};
pub use registry::{Catalog, LockingRegistry, Registry, RegistryError, RegistryErrorExt};
pub use setup::ENCRYPTION_CONFIG_ENV;

pub mod prelude {
    pub use crate::builder::Builder;
    pub use crate::config::{EncryptionConfig, PLAN, STATE};
    pub use crate::diagnostics::{Diagnostic, Diagnostics};
    pub use crate::engine::{Encryption, TargetEncryption};
    pub use crate::envelope::Envelope;
    pub use crate::error::{EncryptionError, EncryptionErrorExt, ErrorKind};
    pub use crate::registry::{LockingRegistry, Registry};
    pub use crate::setup;
}
