//! World state storage for transaction execution.
//!
//! [`StateStorage`] is the contract every backend implements. [`Rollbackable`] journals writes on
//! top of any backend so execution can be undone to a [`Checkpoint`], and [`TrackedStorage`]
//! buffers a shard's speculative writes while recording what it read and wrote.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use alloy_primitives::Bytes;

/// Storage errors.
pub mod errors;
pub use errors::StorageError;

mod key;
pub use key::{KeyKind, StateKey};

/// Storage backends.
pub mod backends;
pub use backends::memory::MemoryStorage;

mod rollback;
pub use rollback::{Checkpoint, Rollbackable};

mod tracked;
pub use tracked::{AccessSet, ChangeSet, TrackedStorage};

/// Key-value world state.
pub trait StateStorage {
    /// Read the value stored under `key`.
    fn read(&self, key: &StateKey) -> Result<Option<Bytes>, StorageError>;

    /// Store `value` under `key`.
    fn write(&mut self, key: StateKey, value: Bytes) -> Result<(), StorageError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&mut self, key: &StateKey) -> Result<(), StorageError>;
}

impl<T: StateStorage + ?Sized> StateStorage for &mut T {
    fn read(&self, key: &StateKey) -> Result<Option<Bytes>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: StateKey, value: Bytes) -> Result<(), StorageError> {
        (**self).write(key, value)
    }

    fn remove(&mut self, key: &StateKey) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}
