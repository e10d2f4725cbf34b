use crate::{ExecResult, Host, Message, VmError};
use alloy_primitives::Bytes;
use std::fmt;

/// Executable-code capability.
///
/// Runs `code` for `message` to completion, metering gas against [`Message::gas`] and reaching
/// state only through `host`. Running out of gas must end execution with
/// [`crate::ExecStatus::OutOfGas`]; an `Err` is reserved for faults outside the executed code.
pub trait Interpreter: Send + Sync + fmt::Debug {
    /// Execute `code` in the frame described by `message`.
    fn execute(
        &self,
        host: &mut dyn Host,
        message: &Message,
        code: &Bytes,
    ) -> Result<ExecResult, VmError>;
}
