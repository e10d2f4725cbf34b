use serde::{Deserialize, Serialize};

/// Placement of transactions whose destination has no known shard affinity.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UnknownAffinityPolicy {
    /// All of them share one unassigned lane.
    #[default]
    Serialize,
    /// Each unknown destination gets a lane of its own. Creations share the unassigned lane.
    Isolate,
}

/// How the lanes of a sharded block run.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ShardExecutionMode {
    /// One lane per worker of the global rayon pool.
    #[default]
    Parallel,
    /// Steps of all lanes interleaved on the calling thread.
    Interleaved,
}

/// Sharded executive configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShardingConfig {
    /// Placement of transactions without affinity.
    pub unknown_affinity: UnknownAffinityPolicy,
    /// Lane execution mode.
    pub mode: ShardExecutionMode,
}

/// Block scheduler configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Drive pre-sharding blocks through the step pipeline instead of one transaction at a time.
    pub is_serial_execute: bool,
    /// Sharded executive configuration.
    pub sharding: ShardingConfig,
}
