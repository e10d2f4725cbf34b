use crate::{Receipt, Transaction};
use alloy_primitives::{BlockNumber, Keccak256, B256};
use serde::{Deserialize, Serialize};

/// Block header fields the executor depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Block number.
    pub number: BlockNumber,
    /// Raw protocol version, see [`crate::BlockVersion`].
    pub version: u32,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Hash of the parent block.
    pub parent_hash: B256,
    /// Block timestamp in milliseconds.
    #[serde(default)]
    pub timestamp: u64,
}

impl BlockHeader {
    /// Compute the header hash.
    pub fn hash_slow(&self) -> B256 {
        let mut hasher = Keccak256::new();
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.version.to_be_bytes());
        hasher.update(self.gas_limit.to_be_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.timestamp.to_be_bytes());
        hasher.finalize()
    }
}

/// An ordered block of transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block header.
    pub header: BlockHeader,
    /// Transactions in submission order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Receipts carried by a block received through sync. Empty for proposals.
    #[serde(default)]
    pub receipts: Vec<Receipt>,
}

impl Block {
    /// Create new block without receipts.
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self { header, transactions, receipts: Vec::new() }
    }

    /// Block number.
    pub const fn number(&self) -> BlockNumber {
        self.header.number
    }

    /// Number of transactions in the block.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}
