//! # Plugin Registry
//!
//! Maps plugin IDs to their descriptors. The registry is append-only: an ID can be
//! registered once and never replaced or removed.
//!
//! [`LockingRegistry`] is the shareable variant. It is a cheap clonable handle around a
//! [`Catalog`] guarded by a read-write lock, so lookups from many threads proceed in
//! parallel while registrations are serialized. Builders work on a [`Catalog`] snapshot and
//! do not observe registrations made after the snapshot was taken.

use crate::keyprovider::KeyProviderDescriptor;
use crate::method::MethodDescriptor;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Errors raised while registering plugins.
#[sealstate_derive::encryption_error]
pub enum RegistryError {
    /// A descriptor with the same ID is already registered. The first registration is kept.
    #[error("Already registered{}: {message}", format_context(.context))]
    AlreadyRegistered { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The descriptor ID is empty or contains characters outside `[A-Za-z0-9_-]`.
    #[error("Invalid plugin ID{}: {message}", format_context(.context))]
    InvalidId { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

/// Lookup and registration of key provider and method descriptors.
pub trait Registry: Send + Sync {
    /// Registers a key provider descriptor under its ID.
    ///
    /// # Errors
    /// * [`RegistryError::AlreadyRegistered`] if the ID is taken.
    /// * [`RegistryError::InvalidId`] if the ID is malformed.
    fn register_key_provider(
        &self,
        descriptor: Arc<dyn KeyProviderDescriptor>,
    ) -> Result<(), RegistryError>;

    /// Registers a method descriptor under its ID.
    ///
    /// # Errors
    /// * [`RegistryError::AlreadyRegistered`] if the ID is taken.
    /// * [`RegistryError::InvalidId`] if the ID is malformed.
    fn register_method(&self, descriptor: Arc<dyn MethodDescriptor>) -> Result<(), RegistryError>;

    /// Key provider descriptor registered under `id`.
    ///
    /// # Results
    /// `None` if nothing is registered under `id`. IDs are case-sensitive.
    fn key_provider(&self, id: &str) -> Option<Arc<dyn KeyProviderDescriptor>>;

    /// Method descriptor registered under `id`.
    ///
    /// # Results
    /// `None` if nothing is registered under `id`. Methods and key providers do not share IDs.
    fn method(&self, id: &str) -> Option<Arc<dyn MethodDescriptor>>;

    /// A consistent point-in-time copy of every registration.
    fn snapshot(&self) -> Catalog;
}

/// Plain, unsynchronized descriptor tables.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    key_providers: FxHashMap<&'static str, Arc<dyn KeyProviderDescriptor>>,
    methods: FxHashMap<&'static str, Arc<dyn MethodDescriptor>>,
}

impl Catalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// See [`Registry::register_key_provider`].
    pub fn register_key_provider(
        &mut self,
        descriptor: Arc<dyn KeyProviderDescriptor>,
    ) -> Result<(), RegistryError> {
        let id = descriptor.id().as_str();
        validate_id(id, "key provider")?;
        if self.key_providers.contains_key(id) {
            return Err(RegistryError::AlreadyRegistered {
                message: format!("key provider '{id}' is already registered").into(),
                context: None,
            });
        }
        self.key_providers.insert(id, descriptor);
        debug!(id, "Registered key provider");
        Ok(())
    }

    /// # Errors
    /// See [`Registry::register_method`].
    pub fn register_method(
        &mut self,
        descriptor: Arc<dyn MethodDescriptor>,
    ) -> Result<(), RegistryError> {
        let id = descriptor.id().as_str();
        validate_id(id, "method")?;
        if self.methods.contains_key(id) {
            return Err(RegistryError::AlreadyRegistered {
                message: format!("method '{id}' is already registered").into(),
                context: None,
            });
        }
        self.methods.insert(id, descriptor);
        debug!(id, "Registered method");
        Ok(())
    }

    /// See [`Registry::key_provider`].
    #[must_use]
    pub fn key_provider(&self, id: &str) -> Option<Arc<dyn KeyProviderDescriptor>> {
        self.key_providers.get(id).cloned()
    }

    /// See [`Registry::method`].
    #[must_use]
    pub fn method(&self, id: &str) -> Option<Arc<dyn MethodDescriptor>> {
        self.methods.get(id).cloned()
    }

    /// Registered key provider IDs, sorted.
    #[must_use]
    pub fn key_provider_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.key_providers.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Registered method IDs, sorted.
    #[must_use]
    pub fn method_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.methods.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Thread-safe, clonable registry handle.
#[derive(Debug, Clone, Default)]
pub struct LockingRegistry {
    catalog: Arc<RwLock<Catalog>>,
}

impl LockingRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for LockingRegistry {
    fn register_key_provider(
        &self,
        descriptor: Arc<dyn KeyProviderDescriptor>,
    ) -> Result<(), RegistryError> {
        self.catalog.write().register_key_provider(descriptor)
    }

    fn register_method(&self, descriptor: Arc<dyn MethodDescriptor>) -> Result<(), RegistryError> {
        self.catalog.write().register_method(descriptor)
    }

    fn key_provider(&self, id: &str) -> Option<Arc<dyn KeyProviderDescriptor>> {
        self.catalog.read().key_provider(id)
    }

    fn method(&self, id: &str) -> Option<Arc<dyn MethodDescriptor>> {
        self.catalog.read().method(id)
    }

    fn snapshot(&self) -> Catalog {
        self.catalog.read().clone()
    }
}

fn validate_id(id: &str, kind: &str) -> Result<(), RegistryError> {
    let valid = !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidId {
            message: format!("{kind} ID '{id}' must be non-empty and use only [A-Za-z0-9_-]")
                .into(),
            context: None,
        })
    }
}
