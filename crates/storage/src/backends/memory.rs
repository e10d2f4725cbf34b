use crate::{StateKey, StateStorage, StorageError};
use alloy_primitives::Bytes;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};

/// In-memory world state.
///
/// Clones share the same underlying map, so a handle can be kept by the caller while the
/// executor mutates the state through another.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<BTreeMap<StateKey, Bytes>>>,
}

impl MemoryStorage {
    /// Create new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<StateKey, Bytes> {
        self.inner.read().clone()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl FromIterator<(StateKey, Bytes)> for MemoryStorage {
    fn from_iter<T: IntoIterator<Item = (StateKey, Bytes)>>(iter: T) -> Self {
        Self { inner: Arc::new(RwLock::new(iter.into_iter().collect())) }
    }
}

impl StateStorage for MemoryStorage {
    fn read(&self, key: &StateKey) -> Result<Option<Bytes>, StorageError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn write(&mut self, key: StateKey, value: Bytes) -> Result<(), StorageError> {
        self.inner.write().insert(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &StateKey) -> Result<(), StorageError> {
        self.inner.write().remove(key);
        Ok(())
    }
}
