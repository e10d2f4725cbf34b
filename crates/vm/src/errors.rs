use alloy_primitives::Address;
use txflow_storage::StorageError;

/// Errors raised while preparing or executing a transaction.
///
/// Conditions the executed code can cause on its own (reverts, gas exhaustion, call depth) are
/// not errors, they are reported through [`crate::ExecStatus`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// The recipient of a call has no executable code.
    #[error("no code found at {0}")]
    CodeNotFound(Address),

    /// Host context methods were called out of order.
    #[error("host context is not {0}")]
    InvalidState(&'static str),

    /// The interpreter failed for a reason unrelated to the executed code.
    #[error("interpreter: {0}")]
    Interpreter(String),

    /// Storage fault.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
