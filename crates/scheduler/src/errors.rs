use alloy_primitives::B256;
use txflow_executor::ExecutorError;
use txflow_storage::StorageError;

/// Errors failing a whole block. Storage is rolled back to its pre-block state whenever one is
/// returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Fatal transaction error, e.g. an unsupported receipt version.
    #[error(transparent)]
    Executor(ExecutorError),

    /// Storage fault outside of any transaction.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Execution was aborted through its [`crate::AbortHandle`].
    #[error("block execution aborted")]
    Aborted,

    /// A synced block carries a receipt that differs from the computed one.
    #[error("receipt mismatch at index {index}: expected {expected}, got {got}")]
    ReceiptMismatch {
        /// Transaction index.
        index: usize,
        /// Hash of the carried receipt.
        expected: B256,
        /// Hash of the computed receipt.
        got: B256,
    },

    /// A synced block carries a different number of receipts than it has transactions.
    #[error("receipt count mismatch: expected {expected}, got {got}")]
    ReceiptCountMismatch {
        /// Number of carried receipts.
        expected: usize,
        /// Number of computed receipts.
        got: usize,
    },

    /// Sharded execution could not be reconciled.
    #[error("internal scheduler error: {0}")]
    Internal(String),
}

impl From<ExecutorError> for SchedulerError {
    fn from(error: ExecutorError) -> Self {
        match error {
            ExecutorError::Cancelled => Self::Aborted,
            error => Self::Executor(error),
        }
    }
}
