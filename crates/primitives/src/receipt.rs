use alloy_primitives::{BlockNumber, Bytes, Keccak256, Log, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Receipt encoding version, chosen by the transaction version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptVersion {
    /// Built by [`ReceiptFactory::create_receipt`].
    #[default]
    V0,
    /// Built by [`ReceiptFactory::create_receipt2`].
    V1,
}

/// Execution status recorded in a receipt.
///
/// Numeric values follow EVMC status codes so receipts stay comparable with other nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
#[repr(i32)]
pub enum ReceiptStatus {
    /// Execution finished successfully.
    #[default]
    Success = 0,
    /// Execution reverted; every state change of the transaction was rolled back.
    Revert = 2,
    /// Unexpected failure while preparing or executing the transaction.
    InternalError = -1,
}

impl ReceiptStatus {
    /// Returns `true` for [`ReceiptStatus::Success`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<ReceiptStatus> for i32 {
    fn from(status: ReceiptStatus) -> Self {
        status as Self
    }
}

impl TryFrom<i32> for ReceiptStatus {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            2 => Ok(Self::Revert),
            -1 => Ok(Self::InternalError),
            other => Err(format!("unknown receipt status: {other}")),
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i32::from(*self))
    }
}

/// Outcome of one transaction.
///
/// Receipts are only built through a [`ReceiptFactory`] and are read-only afterwards; the message
/// is attached by value before the receipt leaves the executor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    version: ReceiptVersion,
    gas_used: u64,
    contract_address: String,
    logs: Vec<Log>,
    status: ReceiptStatus,
    output: Bytes,
    block_number: BlockNumber,
    #[serde(default)]
    message: String,
}

impl Receipt {
    /// Attach a diagnostic message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Receipt version.
    pub const fn version(&self) -> ReceiptVersion {
        self.version
    }

    /// Gas consumed by the transaction.
    pub const fn gas_used(&self) -> u64 {
        self.gas_used
    }

    /// Lower-case hex address of the created contract, empty unless the transaction created one.
    pub fn contract_address(&self) -> &str {
        &self.contract_address
    }

    /// Logs in emission order.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Execution status.
    pub const fn status(&self) -> ReceiptStatus {
        self.status
    }

    /// Returned data of a call.
    pub const fn output(&self) -> &Bytes {
        &self.output
    }

    /// Number of the block the transaction was executed in.
    pub const fn block_number(&self) -> BlockNumber {
        self.block_number
    }

    /// Diagnostic message, set only for internal errors and missing code.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Compute the receipt hash over every field.
    pub fn hash_slow(&self) -> B256 {
        let mut hasher = Keccak256::new();
        hasher.update([self.version as u8]);
        hasher.update(self.gas_used.to_be_bytes());
        hasher.update((self.contract_address.len() as u64).to_be_bytes());
        hasher.update(self.contract_address.as_bytes());
        hasher.update((self.logs.len() as u64).to_be_bytes());
        for log in &self.logs {
            hasher.update(log.address);
            hasher.update((log.data.topics().len() as u64).to_be_bytes());
            for topic in log.data.topics() {
                hasher.update(topic);
            }
            hasher.update((log.data.data.len() as u64).to_be_bytes());
            hasher.update(&log.data.data);
        }
        hasher.update(i32::from(self.status).to_be_bytes());
        hasher.update((self.output.len() as u64).to_be_bytes());
        hasher.update(&self.output);
        hasher.update(self.block_number.to_be_bytes());
        hasher.update(self.message.as_bytes());
        hasher.finalize()
    }
}

/// Versioned receipt constructors.
pub trait ReceiptFactory: Send + Sync + fmt::Debug {
    /// Build a [`ReceiptVersion::V0`] receipt.
    fn create_receipt(
        &self,
        gas_used: u64,
        contract_address: String,
        logs: Vec<Log>,
        status: ReceiptStatus,
        output: Bytes,
        block_number: BlockNumber,
    ) -> Receipt;

    /// Build a [`ReceiptVersion::V1`] receipt.
    fn create_receipt2(
        &self,
        gas_used: u64,
        contract_address: String,
        logs: Vec<Log>,
        status: ReceiptStatus,
        output: Bytes,
        block_number: BlockNumber,
    ) -> Receipt;
}

/// Receipt factory producing plain [`Receipt`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultReceiptFactory;

impl ReceiptFactory for DefaultReceiptFactory {
    fn create_receipt(
        &self,
        gas_used: u64,
        contract_address: String,
        logs: Vec<Log>,
        status: ReceiptStatus,
        output: Bytes,
        block_number: BlockNumber,
    ) -> Receipt {
        Receipt {
            version: ReceiptVersion::V0,
            gas_used,
            contract_address,
            logs,
            status,
            output,
            block_number,
            message: String::new(),
        }
    }

    fn create_receipt2(
        &self,
        gas_used: u64,
        contract_address: String,
        logs: Vec<Log>,
        status: ReceiptStatus,
        output: Bytes,
        block_number: BlockNumber,
    ) -> Receipt {
        Receipt {
            version: ReceiptVersion::V1,
            ..self.create_receipt(gas_used, contract_address, logs, status, output, block_number)
        }
    }
}
