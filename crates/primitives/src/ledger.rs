use crate::BlockVersion;
use alloy_primitives::BlockNumber;
use serde::{Deserialize, Serialize};

/// Default per-transaction gas limit.
pub const DEFAULT_TX_GAS_LIMIT: u64 = 3_000_000_000;

/// Chain-wide parameters shared by every transaction of a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Transaction gas limit and the block number it became effective at.
    gas_limit: (u64, BlockNumber),
    /// Active protocol version.
    compatibility_version: u32,
}

impl LedgerConfig {
    /// Create new ledger config.
    pub const fn new(gas_limit: u64, enable_number: BlockNumber, compatibility_version: u32) -> Self {
        Self { gas_limit: (gas_limit, enable_number), compatibility_version }
    }

    /// Transaction gas limit paired with its enable number.
    pub const fn gas_limit(&self) -> (u64, BlockNumber) {
        self.gas_limit
    }

    /// Active protocol version.
    pub const fn compatibility_version(&self) -> u32 {
        self.compatibility_version
    }

    /// Return a copy with the gas limit replaced.
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit.0 = gas_limit;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TX_GAS_LIMIT, 0, BlockVersion::V3_3.into())
    }
}
