//! # Builder
//!
//! Resolves an [`EncryptionConfig`] against a registry snapshot into an [`Encryption`]
//! engine.
//!
//! Every pairing of every target is resolved: block names are looked up in the
//! configuration, plugin IDs in the registry, then the plugin config is populated from the
//! block body and built. A target with any failing pairing is dropped as a whole and each
//! failure is reported as a diagnostic addressed `target.<name>.primary` or
//! `target.<name>.fallback[i]`. Other targets build independently.
//!
//! Named key provider and method blocks are built once per build and shared by every
//! pairing that references them, so a key provider's initial metadata is computed once.

use crate::config::{EncryptionConfig, PairingRef, PluginBlock};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::engine::{BuiltKeyProvider, BuiltMethod, Encryption, Pairing, TargetPipeline};
use crate::error::{EncryptionError, EncryptionErrorExt, ErrorKind};
use crate::registry::{Catalog, Registry};
use fxhash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Builder {
    catalog: Catalog,
}

impl Builder {
    /// Creates a builder over a snapshot of `registry`.
    #[must_use]
    pub fn new<R: Registry + ?Sized>(registry: &R) -> Self {
        Self { catalog: registry.snapshot() }
    }

    /// Builds every target of `config`.
    ///
    /// Never fails as a whole: problems are returned as diagnostics and the affected
    /// targets are left out of the engine.
    #[must_use]
    pub fn build(&self, config: &EncryptionConfig) -> (Encryption, Diagnostics) {
        let mut session = BuildSession::new(&self.catalog, config);
        let mut diags = Diagnostics::new();
        let mut targets = BTreeMap::new();

        for (name, target) in &config.target {
            let mut failed = false;
            let mut pipeline = TargetPipeline::default();

            if let Some(primary) = &target.primary {
                match session.pairing(primary) {
                    Ok(pairing) => pipeline.primary = Some(pairing),
                    Err(err) => {
                        diags.push(pairing_error(format!("target.{name}.primary"), err));
                        failed = true;
                    },
                }
            }

            for (i, fallback) in target.fallback.iter().enumerate() {
                match session.pairing(fallback) {
                    Ok(pairing) => pipeline.fallbacks.push(pairing),
                    Err(err) => {
                        diags.push(pairing_error(format!("target.{name}.fallback[{i}]"), err));
                        failed = true;
                    },
                }
            }

            if failed {
                warn!(target_name = %name, "Target not built due to invalid pairings");
                continue;
            }

            debug!(
                target_name = %name,
                primary = pipeline.primary.is_some(),
                fallbacks = pipeline.fallbacks.len(),
                "Built target"
            );
            targets.insert(name.clone(), pipeline);
        }

        (Encryption::new(targets), diags)
    }
}

/// Per-build caches of successfully built blocks.
struct BuildSession<'a> {
    catalog: &'a Catalog,
    config: &'a EncryptionConfig,
    key_providers: FxHashMap<&'a str, Arc<BuiltKeyProvider>>,
    methods: FxHashMap<&'a str, Arc<BuiltMethod>>,
}

impl<'a> BuildSession<'a> {
    fn new(catalog: &'a Catalog, config: &'a EncryptionConfig) -> Self {
        Self {
            catalog,
            config,
            key_providers: FxHashMap::default(),
            methods: FxHashMap::default(),
        }
    }

    fn pairing(&mut self, pairing: &'a PairingRef) -> Result<Pairing, EncryptionError> {
        let key_provider = self.key_provider(&pairing.key_provider)?;
        let method = self.method(&pairing.method)?;
        Ok(Pairing { key_provider, method })
    }

    fn key_provider(&mut self, name: &'a str) -> Result<Arc<BuiltKeyProvider>, EncryptionError> {
        if let Some(built) = self.key_providers.get(name) {
            return Ok(Arc::clone(built));
        }

        let config: &'a EncryptionConfig = self.config;
        let block = lookup_block(&config.key_provider, "key provider", name)?;
        let descriptor = self.catalog.key_provider(&block.kind).ok_or_else(|| {
            EncryptionError::invalid_configuration(format!(
                "unknown key provider type '{}' (registered: {})",
                block.kind,
                self.catalog.key_provider_ids().join(", ")
            ))
        })?;

        let address = format!("key_provider.{name}");
        let mut plugin = descriptor.config_struct();
        plugin.populate(&block.config).context(address.clone())?;
        let (provider, initial_meta) = plugin.build().context(address)?;

        let built = Arc::new(BuiltKeyProvider {
            name: name.to_owned(),
            id: descriptor.id(),
            provider,
            initial_meta,
        });
        debug!(name, id = %built.id, "Built key provider");
        self.key_providers.insert(name, Arc::clone(&built));
        Ok(built)
    }

    fn method(&mut self, name: &'a str) -> Result<Arc<BuiltMethod>, EncryptionError> {
        if let Some(built) = self.methods.get(name) {
            return Ok(Arc::clone(built));
        }

        let config: &'a EncryptionConfig = self.config;
        let block = lookup_block(&config.method, "method", name)?;
        let descriptor = self.catalog.method(&block.kind).ok_or_else(|| {
            EncryptionError::invalid_configuration(format!(
                "unknown method type '{}' (registered: {})",
                block.kind,
                self.catalog.method_ids().join(", ")
            ))
        })?;

        let address = format!("method.{name}");
        let mut plugin = descriptor.config_struct();
        plugin.populate(&block.config).context(address.clone())?;
        let method = plugin.build().context(address)?;

        let built = Arc::new(BuiltMethod { name: name.to_owned(), id: descriptor.id(), method });
        debug!(name, id = %built.id, "Built method");
        self.methods.insert(name, Arc::clone(&built));
        Ok(built)
    }
}

fn lookup_block<'c>(
    blocks: &'c BTreeMap<String, PluginBlock>,
    kind: &str,
    name: &str,
) -> Result<&'c PluginBlock, EncryptionError> {
    blocks.get(name).ok_or_else(|| {
        EncryptionError::invalid_configuration(format!("{kind} '{name}' is not declared"))
    })
}

/// Build failures are always reported as configuration problems.
fn pairing_error(address: String, err: EncryptionError) -> Diagnostic {
    let err = if err.kind() == ErrorKind::InvalidConfiguration {
        err
    } else {
        EncryptionError::invalid_configuration_caused("plugin failed to build", err)
    };
    Diagnostic::error("Invalid encryption pairing", Some(address), err)
}
