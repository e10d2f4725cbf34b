use serde::{Deserialize, Serialize};

/// Protocol versions a block header can declare.
///
/// Headers carry the raw `u32`, so unknown future versions still compare correctly against the
/// known thresholds.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[repr(u32)]
pub enum BlockVersion {
    /// Initial protocol version.
    #[strum(serialize = "3.0.0")]
    V3_0 = 0x0300_0000,
    /// DMC scheduling.
    #[strum(serialize = "3.1.0")]
    V3_1 = 0x0301_0000,
    /// Serial execution switch.
    #[strum(serialize = "3.2.0")]
    V3_2 = 0x0302_0000,
    /// DMC and serial execution combined into sharded execution.
    #[strum(serialize = "3.3.0")]
    V3_3 = 0x0303_0000,
}

impl BlockVersion {
    /// First version that schedules blocks through the sharded executive.
    pub const SHARDING: Self = Self::V3_3;

    /// Returns `true` if the raw header version is at least `self`.
    pub const fn is_enabled_in(self, raw: u32) -> bool {
        raw >= self as u32
    }
}

impl From<BlockVersion> for u32 {
    fn from(version: BlockVersion) -> Self {
        version as Self
    }
}

/// Transaction versions. The version decides which receipt constructor is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
#[repr(u32)]
pub enum TransactionVersion {
    /// Legacy transactions.
    V0 = 0,
    /// Transactions carrying extended receipt fields.
    V1 = 1,
}

/// Raw transaction version that does not map to any [`TransactionVersion`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction version: {0}")]
pub struct UnknownTransactionVersion(pub u32);

impl TryFrom<u32> for TransactionVersion {
    type Error = UnknownTransactionVersion;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            other => Err(UnknownTransactionVersion(other)),
        }
    }
}
