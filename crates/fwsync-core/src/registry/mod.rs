//! Plugin-based provider registry
//!
//! The registry maps each [`ProviderKind`] to a factory, so the engine never
//! branches on provider type.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fwsync_core::registry::ProviderRegistry;
//!
//! let mut registry = ProviderRegistry::new();
//! fwsync_provider_volcengine::register(&mut registry, options);
//! fwsync_provider_lightsail::register(&mut registry, options);
//!
//! let provider = registry.create_provider(ProviderKind::Aws, &credentials)?;
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register` function:
//!
//! ```rust,ignore
//! pub fn register(registry: &mut ProviderRegistry, options: ClientOptions) {
//!     registry.register_provider(ProviderKind::Volcengine, Box::new(VolcengineFactory::new(options)));
//! }
//! ```

use crate::config::{ProviderCredentials, ProviderKind};
use crate::error::{Error, Result};
use crate::traits::{FirewallProvider, FirewallProviderFactory};
use std::collections::HashMap;

/// Provider registry for plugin-based firewall provider creation
///
/// Registration happens once at startup, before the registry is shared, so
/// no interior locking is needed.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Box<dyn FirewallProviderFactory>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory, replacing any previous one for `kind`
    pub fn register_provider(
        &mut self,
        kind: ProviderKind,
        factory: Box<dyn FirewallProviderFactory>,
    ) {
        self.providers.insert(kind, factory);
    }

    /// Create a provider instance for one run
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn FirewallProvider>)`: Created provider instance
    /// - `Err(Error)`: If `kind` is not registered or creation fails
    pub fn create_provider(
        &self,
        kind: ProviderKind,
        credentials: &ProviderCredentials,
    ) -> Result<Box<dyn FirewallProvider>> {
        let factory = self
            .providers
            .get(&kind)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", kind)))?;

        factory.create(credentials)
    }

    /// List all registered provider kinds, in canonical order
    pub fn list_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.providers.contains_key(kind))
            .collect()
    }

    /// Check if a provider kind is registered
    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }
}
