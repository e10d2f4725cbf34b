use alloy_primitives::Bytes;
use parking_lot::RwLock;
use std::{collections::BTreeSet, sync::Arc};
use txflow_storage::{MemoryStorage, StateKey, StateStorage, StorageError};

/// In-memory storage failing every access to selected keys.
///
/// Clones share both the state and the set of failing keys.
#[derive(Clone, Debug, Default)]
pub struct FaultyStorage {
    inner: MemoryStorage,
    faulty: Arc<RwLock<BTreeSet<StateKey>>>,
}

impl FaultyStorage {
    /// Wrap `inner` with no failing keys.
    pub fn new(inner: MemoryStorage) -> Self {
        Self { inner, faulty: Arc::default() }
    }

    /// Fail every access to `key` from now on.
    pub fn fail_on(&self, key: StateKey) {
        self.faulty.write().insert(key);
    }

    /// Serve `key` again.
    pub fn heal(&self, key: &StateKey) {
        self.faulty.write().remove(key);
    }

    /// Wrapped storage.
    pub const fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    fn check(&self, key: &StateKey) -> Result<(), StorageError> {
        if self.faulty.read().contains(key) {
            return Err(StorageError::KeyUnavailable(*key))
        }
        Ok(())
    }
}

impl StateStorage for FaultyStorage {
    fn read(&self, key: &StateKey) -> Result<Option<Bytes>, StorageError> {
        self.check(key)?;
        self.inner.read(key)
    }

    fn write(&mut self, key: StateKey, value: Bytes) -> Result<(), StorageError> {
        self.check(&key)?;
        self.inner.write(key, value)
    }

    fn remove(&mut self, key: &StateKey) -> Result<(), StorageError> {
        self.check(key)?;
        self.inner.remove(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{bytes, Address};
    use assert_matches::assert_matches;

    #[test]
    fn fails_selected_keys() {
        let key = StateKey::code(Address::ZERO);
        let mut storage = FaultyStorage::default();
        storage.write(key, bytes!("01")).unwrap();

        storage.fail_on(key);
        assert_matches!(storage.read(&key), Err(StorageError::KeyUnavailable(k)) if k == key);
        assert_matches!(storage.remove(&key), Err(StorageError::KeyUnavailable(_)));

        storage.heal(&key);
        assert_eq!(storage.read(&key).unwrap(), Some(bytes!("01")));
        assert_eq!(storage.inner().len(), 1);
    }
}
