use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a [`StateKey`] addresses within a contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyKind {
    /// Deployed contract code.
    Code,
    /// A storage slot.
    Slot(B256),
}

/// Key into the world state, always scoped to one contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Owning contract.
    pub address: Address,
    /// Entry within the contract.
    pub kind: KeyKind,
}

impl StateKey {
    /// Key of the code deployed at `address`.
    pub const fn code(address: Address) -> Self {
        Self { address, kind: KeyKind::Code }
    }

    /// Key of storage `slot` of `address`.
    pub const fn slot(address: Address, slot: B256) -> Self {
        Self { address, kind: KeyKind::Slot(slot) }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            KeyKind::Code => write!(f, "{}/code", self.address),
            KeyKind::Slot(slot) => write!(f, "{}/{}", self.address, slot),
        }
    }
}
