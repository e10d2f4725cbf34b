use crate::{StateKey, StateStorage, StorageError};
use alloy_primitives::{Address, Bytes};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
};

/// Keys read from the base state and keys written by a speculative execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessSet {
    /// Keys read from the base state.
    pub reads: BTreeSet<StateKey>,
    /// Keys written or removed.
    pub writes: BTreeSet<StateKey>,
}

impl AccessSet {
    /// Returns `true` if executing `self` and `other` in either order could observe different
    /// state, i.e. one side writes a key the other side reads or writes.
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.writes.iter().any(|key| other.reads.contains(key) || other.writes.contains(key)) ||
            other.writes.iter().any(|key| self.reads.contains(key))
    }

    /// Merge another access set into this one.
    pub fn extend(&mut self, other: Self) {
        self.reads.extend(other.reads);
        self.writes.extend(other.writes);
    }

    /// Contracts owning any accessed key.
    pub fn contracts(&self) -> BTreeSet<Address> {
        self.reads.iter().chain(self.writes.iter()).map(|key| key.address).collect()
    }

    /// Returns `true` if nothing was accessed.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty()
    }
}

/// Buffered mutations; `None` marks a removal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet(BTreeMap<StateKey, Option<Bytes>>);

impl ChangeSet {
    /// Apply every buffered mutation to `target` in key order.
    pub fn apply_to<S: StateStorage + ?Sized>(self, target: &mut S) -> Result<(), StorageError> {
        for (key, value) in self.0 {
            match value {
                Some(value) => target.write(key, value)?,
                None => target.remove(&key)?,
            }
        }
        Ok(())
    }

    /// Number of buffered mutations.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing was buffered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Speculative overlay over a read-only base state.
///
/// Writes never reach the base. Reads of keys not written locally go to the base and are
/// recorded, so overlays executed side by side can be checked for conflicts before their
/// [`ChangeSet`]s are merged.
#[derive(Debug)]
pub struct TrackedStorage<'a, S: ?Sized> {
    base: &'a S,
    changes: BTreeMap<StateKey, Option<Bytes>>,
    reads: RefCell<BTreeSet<StateKey>>,
}

impl<'a, S: StateStorage + ?Sized> TrackedStorage<'a, S> {
    /// Create an empty overlay over `base`.
    pub fn new(base: &'a S) -> Self {
        Self { base, changes: BTreeMap::new(), reads: RefCell::default() }
    }

    /// Keys accessed so far.
    pub fn access_set(&self) -> AccessSet {
        AccessSet { reads: self.reads.borrow().clone(), writes: self.changes.keys().copied().collect() }
    }

    /// Split the overlay into what it accessed and what it would change.
    pub fn into_parts(self) -> (AccessSet, ChangeSet) {
        let access = AccessSet {
            reads: self.reads.into_inner(),
            writes: self.changes.keys().copied().collect(),
        };
        (access, ChangeSet(self.changes))
    }
}

impl<S: StateStorage + ?Sized> StateStorage for TrackedStorage<'_, S> {
    fn read(&self, key: &StateKey) -> Result<Option<Bytes>, StorageError> {
        if let Some(value) = self.changes.get(key) {
            return Ok(value.clone())
        }
        self.reads.borrow_mut().insert(*key);
        self.base.read(key)
    }

    fn write(&mut self, key: StateKey, value: Bytes) -> Result<(), StorageError> {
        self.changes.insert(key, Some(value));
        Ok(())
    }

    fn remove(&mut self, key: &StateKey) -> Result<(), StorageError> {
        self.changes.insert(*key, None);
        Ok(())
    }
}
