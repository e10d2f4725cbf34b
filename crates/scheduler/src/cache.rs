use alloy_primitives::Address;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::{collections::HashMap, sync::Arc};

/// Identifier of a shard.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display, derive_more::From,
)]
pub struct ShardId(pub u32);

/// Contract to shard mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AffinityTable {
    shards: HashMap<Address, ShardId>,
    next: u32,
}

impl AffinityTable {
    /// Shard `contract` is pinned to.
    pub fn get(&self, contract: &Address) -> Option<ShardId> {
        self.shards.get(contract).copied()
    }

    /// Pin `contract` to `shard`, returning the previous shard.
    pub fn assign(&mut self, contract: Address, shard: ShardId) -> Option<ShardId> {
        self.next = self.next.max(shard.0.saturating_add(1));
        self.shards.insert(contract, shard)
    }

    /// Reserve a shard id no contract is pinned to yet.
    pub fn allocate(&mut self) -> ShardId {
        let shard = ShardId(self.next);
        self.next = self.next.saturating_add(1);
        shard
    }

    /// Number of pinned contracts.
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Returns `true` if no contract is pinned.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Iterate over all pinned contracts.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &ShardId)> {
        self.shards.iter()
    }
}

/// Handle to a shard affinity table.
///
/// Clones are shared: every clone observes what any of them learns. [`ShardCache::detached`]
/// produces an independent deep copy for speculative executions whose learning must not leak
/// into the canonical table.
#[derive(Clone, Debug, Default)]
pub struct ShardCache {
    inner: Arc<RwLock<AffinityTable>>,
}

impl ShardCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Independent deep copy of the current table.
    pub fn detached(&self) -> Self {
        Self { inner: Arc::new(RwLock::new(self.inner.read().clone())) }
    }

    /// Returns `true` if both handles refer to the same table.
    pub fn is_shared_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Lock the table for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, AffinityTable> {
        self.inner.read()
    }

    /// Lock the table for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, AffinityTable> {
        self.inner.write()
    }
}

impl FromIterator<(Address, ShardId)> for ShardCache {
    fn from_iter<T: IntoIterator<Item = (Address, ShardId)>>(iter: T) -> Self {
        let mut table = AffinityTable::default();
        for (contract, shard) in iter {
            table.assign(contract, shard);
        }
        Self { inner: Arc::new(RwLock::new(table)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_and_detached() {
        let cache = ShardCache::from_iter([(Address::with_last_byte(1), ShardId(4))]);
        let shared = cache.clone();
        let detached = cache.detached();
        assert!(cache.is_shared_with(&shared));
        assert!(!cache.is_shared_with(&detached));

        let shard = detached.write().allocate();
        assert_eq!(shard, ShardId(5));
        detached.write().assign(Address::with_last_byte(2), shard);
        assert_eq!(cache.read().len(), 1);
        assert_eq!(detached.read().len(), 2);

        shared.write().assign(Address::with_last_byte(3), ShardId(0));
        assert_eq!(cache.read().get(&Address::with_last_byte(3)), Some(ShardId(0)));
        assert_eq!(detached.read().get(&Address::with_last_byte(3)), None);
    }
}
