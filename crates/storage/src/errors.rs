use crate::StateKey;

/// Storage error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The backend could not serve the key.
    #[error("state unavailable for key: {0}")]
    KeyUnavailable(StateKey),

    /// The backend failed for a reason unrelated to a particular key.
    #[error("storage backend: {0}")]
    Backend(String),
}
