//! Block scheduling.
//!
//! A [`BlockExecutiveFactory`] picks the [`BlockExecutive`] for a block: sequential, serial or
//! sharded. The sharded executive groups transactions into lanes by the contract affinities kept
//! in a [`ShardCache`], runs the lanes side by side and commits them only if the outcome equals
//! executing the block in submission order.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// Scheduler error types.
pub mod errors;
pub use errors::SchedulerError;

mod config;
pub use config::{SchedulerConfig, ShardExecutionMode, ShardingConfig, UnknownAffinityPolicy};

mod cache;
pub use cache::{AffinityTable, ShardCache, ShardId};

mod metrics;

/// Block executives.
pub mod executive;
pub use executive::{
    AbortHandle, BlockExecutionResult, BlockExecutive, ExecuteBlock, ExecutiveKind,
};

mod factory;
pub use factory::{BlockExecutiveFactory, BuildOptions};
