//! # Startup Sequence
//!
//! The fixed order in which an application wires encryption:
//!
//! 1. Construct a registry and register the built-in plugins ([`default_registry`]).
//! 2. Read the `TF_ENCRYPTION` override, parse it on its own and stop on any error. The
//!    override uses the grammar of configuration files, JSON or TOML.
//! 3. Merge the override over the base configuration.
//! 4. Build the engine from a registry snapshot.

use crate::builder::Builder;
use crate::config::EncryptionConfig;
use crate::diagnostics::Diagnostics;
use crate::engine::Encryption;
use crate::keyprovider::static_key::StaticDescriptor;
use crate::method::aead::AeadDescriptor;
use crate::registry::{LockingRegistry, Registry, RegistryError};
use std::env;
use std::sync::Arc;
use tracing::info;

/// Environment variable holding an encryption configuration override.
pub const ENCRYPTION_CONFIG_ENV: &str = "TF_ENCRYPTION";

/// Registers the built-in key providers and methods.
///
/// # Errors
/// [`RegistryError::AlreadyRegistered`] if any built-in is already present.
pub fn register_builtins<R: Registry + ?Sized>(registry: &R) -> Result<(), RegistryError> {
    registry.register_key_provider(Arc::new(StaticDescriptor))?;
    registry.register_method(Arc::new(AeadDescriptor::aes_gcm()))?;
    registry.register_method(Arc::new(AeadDescriptor::chacha20_poly1305()))?;
    Ok(())
}

/// A fresh registry holding the built-in plugins.
///
/// # Panics
/// On a duplicate registration, which can only come from a defect in the built-in set.
#[must_use]
pub fn default_registry() -> LockingRegistry {
    let registry = LockingRegistry::new();
    if let Err(err) = register_builtins(&registry) {
        panic!("Built-in encryption plugins failed to register: {err}");
    }
    registry
}

/// Reads and parses the environment override.
///
/// Returns `Ok(None)` when the variable is unset or blank.
///
/// # Errors
/// The override's diagnostics if it fails to parse or validate.
pub fn env_override() -> Result<Option<EncryptionConfig>, Diagnostics> {
    let value = env::var(ENCRYPTION_CONFIG_ENV).ok();
    parse_override(value.as_deref())
}

/// Parses an override value as read from [`ENCRYPTION_CONFIG_ENV`].
///
/// # Errors
/// The override's diagnostics if it fails to parse or validate.
pub fn parse_override(value: Option<&str>) -> Result<Option<EncryptionConfig>, Diagnostics> {
    let Some(text) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };

    match EncryptionConfig::parse(ENCRYPTION_CONFIG_ENV, text) {
        (Some(config), _) => Ok(Some(config)),
        (None, diags) => Err(diags),
    }
}

/// Runs steps 2 to 4 against an explicit registry and override value.
///
/// The returned diagnostics include the override's warnings and all build problems.
///
/// # Errors
/// The override's diagnostics if it is broken. Nothing is built in that case.
pub fn encryption_with_registry<R: Registry + ?Sized>(
    registry: &R,
    base: EncryptionConfig,
    env_value: Option<&str>,
) -> Result<(Encryption, Diagnostics), Diagnostics> {
    let mut diags = Diagnostics::new();

    let config = match parse_override(env_value)? {
        Some(overrides) => {
            info!(
                key_providers = overrides.key_provider.len(),
                methods = overrides.method.len(),
                targets = overrides.target.len(),
                "Merging encryption configuration from {ENCRYPTION_CONFIG_ENV}"
            );
            diags.extend(overrides.validate());
            base.merge(overrides)
        },
        None => base,
    };

    let (encryption, build_diags) = Builder::new(registry).build(&config);
    diags.extend(build_diags);
    Ok((encryption, diags))
}

/// The full startup sequence using the built-in plugins and the process environment.
///
/// # Errors
/// The override's diagnostics if `TF_ENCRYPTION` is broken.
pub fn encryption_from_config(
    base: EncryptionConfig,
) -> Result<(Encryption, Diagnostics), Diagnostics> {
    let registry = default_registry();
    let value = env::var(ENCRYPTION_CONFIG_ENV).ok();
    encryption_with_registry(&registry, base, value.as_deref())
}
