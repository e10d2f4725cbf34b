/// Errors that terminate block execution.
///
/// Failures of a single transaction are not errors: they are recorded in its receipt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The transaction version maps to no receipt constructor.
    #[error("invalid receipt version {0}")]
    InvalidReceiptVersion(u32),

    /// The state machine was resumed after producing its receipt.
    #[error("transaction already finalized")]
    AlreadyFinalized,

    /// A previous step panicked and left no state behind.
    #[error("transaction state machine poisoned")]
    Poisoned,

    /// Execution was cancelled between two steps.
    #[error("execution cancelled")]
    Cancelled,
}
