use alloy_primitives::{Address, Bytes};
use txflow_primitives::ReceiptStatus;

/// Kind of a call frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Message call to existing code.
    Call,
    /// Contract creation; the input is the init code.
    Create,
}

/// Call message describing one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Frame kind.
    pub kind: CallKind,
    /// Call depth, `0` for the transaction itself.
    pub depth: u32,
    /// Gas available to the frame.
    pub gas: u64,
    /// Caller.
    pub sender: Address,
    /// Account whose storage the frame runs against. Zero for creations whose address is derived.
    pub recipient: Address,
    /// Account whose code is executed.
    pub code_address: Address,
    /// Call data or init code.
    pub input: Bytes,
}

impl Message {
    /// Message for a nested call from `sender` to `recipient`.
    pub fn call(sender: Address, recipient: Address, input: Bytes, gas: u64) -> Self {
        Self {
            kind: CallKind::Call,
            depth: 0,
            gas,
            sender,
            recipient,
            code_address: recipient,
            input,
        }
    }

    /// Message for a nested creation by `sender`.
    pub fn create(sender: Address, init_code: Bytes, gas: u64) -> Self {
        Self {
            kind: CallKind::Create,
            depth: 0,
            gas,
            sender,
            recipient: Address::ZERO,
            code_address: Address::ZERO,
            input: init_code,
        }
    }
}

/// Status reported by executed code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecStatus {
    /// Finished normally.
    Success,
    /// Explicit revert.
    Revert,
    /// Gas ran out.
    OutOfGas,
    /// Call depth limit exceeded.
    CallDepthExceeded,
    /// Any other failure of the executed code, e.g. a failing precompiled contract or a
    /// creation colliding with existing code.
    Failure,
}

impl ExecStatus {
    /// Returns `true` for [`ExecStatus::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Status recorded in the receipt. Every failure of the executed code reverts.
    pub const fn receipt_status(self) -> ReceiptStatus {
        match self {
            Self::Success => ReceiptStatus::Success,
            Self::Revert | Self::OutOfGas | Self::CallDepthExceeded | Self::Failure => {
                ReceiptStatus::Revert
            }
        }
    }
}

/// Result of one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecResult {
    /// Completion status.
    pub status: ExecStatus,
    /// Gas left out of [`Message::gas`].
    pub gas_left: u64,
    /// Returned data. For creations, the code to deploy.
    pub output: Bytes,
    /// Address of the created contract.
    pub create_address: Option<Address>,
}

impl ExecResult {
    /// Successful result.
    pub const fn success(gas_left: u64, output: Bytes) -> Self {
        Self { status: ExecStatus::Success, gas_left, output, create_address: None }
    }

    /// Failed result with no output.
    pub const fn failure(status: ExecStatus, gas_left: u64) -> Self {
        Self { status, gas_left, output: Bytes::new(), create_address: None }
    }
}
