use metrics::{Counter, Histogram};
use std::fmt;

/// Block scheduler metrics.
#[derive(Clone)]
pub(crate) struct SchedulerMetrics {
    /// Executed blocks.
    pub(crate) blocks: Counter,
    /// Pairs of lanes found conflicting at commit.
    pub(crate) shard_conflicts: Counter,
    /// Sharded blocks re-executed sequentially.
    pub(crate) sequential_fallbacks: Counter,
    /// Aborted blocks.
    pub(crate) aborted: Counter,
    /// Gas used per block.
    pub(crate) block_gas_used: Histogram,
}

impl Default for SchedulerMetrics {
    fn default() -> Self {
        Self {
            blocks: metrics::counter!("txflow.scheduler.blocks"),
            shard_conflicts: metrics::counter!("txflow.scheduler.shard_conflicts"),
            sequential_fallbacks: metrics::counter!("txflow.scheduler.sequential_fallbacks"),
            aborted: metrics::counter!("txflow.scheduler.aborted"),
            block_gas_used: metrics::histogram!("txflow.scheduler.block_gas_used"),
        }
    }
}

impl fmt::Debug for SchedulerMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerMetrics").finish_non_exhaustive()
    }
}
