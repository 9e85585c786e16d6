//! The process-wide addon store.

use super::AddonError;
use parking_lot::RwLock;
use plexus_extension::{Addon, AddonType};
use std::collections::HashMap;
use std::sync::Arc;

type Key = (AddonType, String);

/// Registry of addon factories keyed by `(type, name)`.
///
/// Shared behind an `Arc` across the app, its engines and their
/// extension threads. Reads from any thread; writes only through the
/// registration/unregistration phases on the app thread.
pub struct AddonStore {
    inner: RwLock<HashMap<Key, Arc<dyn Addon>>>,
}

impl AddonStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Publishes a factory. Identical re-registration (the same
    /// factory object under the same key) is idempotent; a different
    /// factory under an existing key is rejected.
    pub fn insert(
        &self,
        addon_type: AddonType,
        name: impl Into<String>,
        addon: Arc<dyn Addon>,
    ) -> Result<(), AddonError> {
        let name = name.into();
        let mut map = self.inner.write();
        if let Some(existing) = map.get(&(addon_type, name.clone())) {
            if Arc::ptr_eq(existing, &addon) {
                return Ok(());
            }
            return Err(AddonError::Duplicate { addon_type, name });
        }
        map.insert((addon_type, name), addon);
        Ok(())
    }

    /// Looks a factory up.
    #[must_use]
    pub fn find(&self, addon_type: AddonType, name: &str) -> Option<Arc<dyn Addon>> {
        self.inner.read().get(&(addon_type, name.to_string())).cloned()
    }

    /// Empties the store, returning every entry. Used by
    /// unregister-all at app close.
    #[must_use]
    pub fn drain(&self) -> Vec<(AddonType, String, Arc<dyn Addon>)> {
        self.inner
            .write()
            .drain()
            .map(|((ty, name), addon)| (ty, name, addon))
            .collect()
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl Default for AddonStore {
    fn default() -> Self {
        Self::new()
    }
}
