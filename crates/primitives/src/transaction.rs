use alloy_primitives::{Address, Bytes, Keccak256, B256};
use serde::{Deserialize, Serialize};

/// A transaction admitted into a block.
///
/// The hash is computed once on construction and the transaction is read-only afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TransactionFields", rename_all = "camelCase")]
pub struct Transaction {
    sender: Address,
    to: Option<Address>,
    input: Bytes,
    version: u32,
    hash: B256,
}

impl Transaction {
    /// Create new transaction. An empty destination denotes contract creation.
    pub fn new(sender: Address, to: Option<Address>, input: Bytes, version: u32) -> Self {
        let hash = Self::hash_fields(&sender, to.as_ref(), &input, version);
        Self { sender, to, input, version, hash }
    }

    /// Transaction sender.
    pub const fn sender(&self) -> Address {
        self.sender
    }

    /// Destination address, `None` for contract creation.
    pub const fn to(&self) -> Option<Address> {
        self.to
    }

    /// Call or init-code payload.
    pub const fn input(&self) -> &Bytes {
        &self.input
    }

    /// Raw version tag.
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Transaction hash.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// Returns `true` if this transaction creates a contract.
    pub const fn is_create(&self) -> bool {
        self.to.is_none()
    }

    fn hash_fields(sender: &Address, to: Option<&Address>, input: &Bytes, version: u32) -> B256 {
        let mut hasher = Keccak256::new();
        hasher.update(sender);
        match to {
            Some(to) => {
                hasher.update([1u8]);
                hasher.update(to);
            }
            None => hasher.update([0u8]),
        }
        hasher.update((input.len() as u64).to_be_bytes());
        hasher.update(input);
        hasher.update(version.to_be_bytes());
        hasher.finalize()
    }
}

/// Wire shape of a transaction; the hash is always recomputed.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionFields {
    sender: Address,
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    input: Bytes,
    #[serde(default)]
    version: u32,
}

impl From<TransactionFields> for Transaction {
    fn from(fields: TransactionFields) -> Self {
        Self::new(fields.sender, fields.to, fields.input, fields.version)
    }
}
