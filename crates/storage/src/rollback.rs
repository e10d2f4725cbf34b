use crate::{StateKey, StateStorage, StorageError};
use alloy_primitives::Bytes;
use tracing::trace;

/// Position in a [`Rollbackable`] journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(usize);

impl Checkpoint {
    /// Number of journal entries recorded before the checkpoint was taken.
    pub const fn position(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct JournalEntry {
    key: StateKey,
    previous: Option<Bytes>,
}

/// Storage wrapper that journals every mutation so it can be undone.
///
/// ## Invariants
///
/// - Every mutation of the wrapped storage made through this wrapper has a journal entry holding
///   the value observed right before it, or `None` if the key was absent.
/// - Rolling back to a [`Checkpoint`] restores the state observed when it was taken; checkpoints
///   taken after it become invalid and rolling back to them is a no-op.
#[derive(Debug)]
pub struct Rollbackable<S> {
    storage: S,
    journal: Vec<JournalEntry>,
}

impl<S: StateStorage> Rollbackable<S> {
    /// Wrap the storage with an empty journal.
    pub const fn new(storage: S) -> Self {
        Self { storage, journal: Vec::new() }
    }

    /// Mark the current journal position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Undo every mutation recorded after `checkpoint`, newest first.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Result<(), StorageError> {
        if checkpoint.0 >= self.journal.len() {
            return Ok(())
        }

        trace!(target: "txflow::storage", from = self.journal.len(), to = checkpoint.0, "rolling back");
        while self.journal.len() > checkpoint.0 {
            let Some(JournalEntry { key, previous }) = self.journal.pop() else { break };
            match previous {
                Some(value) => self.storage.write(key, value)?,
                None => self.storage.remove(&key)?,
            }
        }
        Ok(())
    }

    /// Number of recorded mutations.
    pub fn journal_len(&self) -> usize {
        self.journal.len()
    }

    /// Reference to the wrapped storage.
    pub const fn inner(&self) -> &S {
        &self.storage
    }

    /// Release the wrapped storage, keeping every applied mutation.
    pub fn into_inner(self) -> S {
        self.storage
    }

    fn record(&mut self, key: StateKey) -> Result<(), StorageError> {
        let previous = self.storage.read(&key)?;
        self.journal.push(JournalEntry { key, previous });
        Ok(())
    }
}

impl<S: StateStorage> StateStorage for Rollbackable<S> {
    fn read(&self, key: &StateKey) -> Result<Option<Bytes>, StorageError> {
        self.storage.read(key)
    }

    fn write(&mut self, key: StateKey, value: Bytes) -> Result<(), StorageError> {
        self.record(key)?;
        self.storage.write(key, value)
    }

    fn remove(&mut self, key: &StateKey) -> Result<(), StorageError> {
        self.record(*key)?;
        self.storage.remove(key)
    }
}
