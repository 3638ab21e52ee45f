//! Session registry implementation

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use tg_core::error::RegistryError;
use tg_core::types::SessionKey;

use crate::bridge::ShellBridge;

/// Concurrent map from session key to the bridge serving it.
///
/// An entry exists exactly while its bridge is active.
pub struct SessionRegistry {
    bridges: DashMap<SessionKey, Arc<ShellBridge>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            bridges: DashMap::new(),
        }
    }

    /// Insert a bridge; an existing entry for the key is left untouched
    pub fn register(&self, bridge: Arc<ShellBridge>) -> Result<(), RegistryError> {
        let key = bridge.session();
        match self.bridges.entry(key) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateSession(key)),
            Entry::Vacant(slot) => {
                slot.insert(bridge);
                Ok(())
            }
        }
    }

    /// Get the bridge for a session
    pub fn lookup(&self, key: &SessionKey) -> Option<Arc<ShellBridge>> {
        self.bridges.get(key).map(|r| Arc::clone(&r))
    }

    /// Remove a session's entry; absent keys are a no-op
    pub fn remove(&self, key: &SessionKey) -> Option<Arc<ShellBridge>> {
        self.bridges.remove(key).map(|(_, bridge)| bridge)
    }

    /// Remove the entry only if it still points at `bridge`
    pub fn remove_if_same(&self, bridge: &ShellBridge) -> bool {
        self.bridges
            .remove_if(&bridge.session(), |_, current| {
                std::ptr::eq(Arc::as_ptr(current), bridge)
            })
            .is_some()
    }

    /// Keys of all live sessions
    pub fn sessions(&self) -> Vec<SessionKey> {
        self.bridges.iter().map(|r| *r.key()).collect()
    }

    /// All live bridges
    pub fn bridges(&self) -> Vec<Arc<ShellBridge>> {
        self.bridges.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
