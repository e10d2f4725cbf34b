use clap::{Args, Parser};
use std::path::PathBuf;
use txflow_executor::ExecutorConfig;
use txflow_scheduler::{SchedulerConfig, ShardExecutionMode, ShardingConfig, UnknownAffinityPolicy};

/// Txflow CLI interface.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "Execute the blocks of a txflow fixture", long_about = None)]
pub struct TxflowArgs {
    /// Path to a JSON fixture holding the genesis state and the blocks to execute.
    #[arg(value_name = "FIXTURE", required_unless_present = "sample")]
    pub fixture: Option<PathBuf>,

    /// Print the built-in sample fixture instead of executing one.
    #[arg(long, conflicts_with = "fixture")]
    pub sample: bool,

    /// Scheduler args.
    #[clap(flatten)]
    pub scheduler: SchedulerArgs,

    /// Execution args.
    #[clap(flatten)]
    pub execution: ExecutionArgs,
}

/// Block scheduling args.
#[derive(Clone, Debug, Args)]
pub struct SchedulerArgs {
    /// Run blocks older than the sharding version through the step pipeline.
    #[arg(long = "serial", help_heading = "Scheduler")]
    pub serial: bool,

    /// Placement of transactions whose destination has no shard yet.
    #[arg(long, value_name = "POLICY", default_value_t, help_heading = "Scheduler")]
    pub unknown_affinity: UnknownAffinityPolicy,

    /// How the lanes of a sharded block run.
    #[arg(long = "shard-mode", value_name = "MODE", default_value_t, help_heading = "Scheduler")]
    pub shard_mode: ShardExecutionMode,

    /// Maximum nesting depth of calls.
    #[arg(long, default_value_t = ExecutorConfig::default().max_call_depth, help_heading = "Scheduler")]
    pub max_call_depth: u32,
}

impl SchedulerArgs {
    /// Scheduler configuration.
    pub const fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            is_serial_execute: self.serial,
            sharding: ShardingConfig { unknown_affinity: self.unknown_affinity, mode: self.shard_mode },
        }
    }

    /// Transaction executor configuration.
    pub const fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig { max_call_depth: self.max_call_depth }
    }
}

/// Block execution args.
#[derive(Clone, Debug, Args)]
pub struct ExecutionArgs {
    /// Execute every block as a static call: receipts are produced but state changes and shard
    /// learning are discarded.
    #[arg(long, help_heading = "Execution")]
    pub static_call: bool,

    /// Verify the receipts carried by fixture blocks against the computed ones.
    #[arg(long, help_heading = "Execution")]
    pub verify_receipts: bool,

    /// Context id of the first transaction of the first block.
    #[arg(long, default_value_t = 0, help_heading = "Execution")]
    pub start_context_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scheduler_args() {
        let args = TxflowArgs::try_parse_from([
            "txflow",
            "blocks.json",
            "--serial",
            "--unknown-affinity",
            "isolate",
            "--shard-mode",
            "interleaved",
        ])
        .unwrap();
        assert_eq!(args.fixture, Some(PathBuf::from("blocks.json")));
        let config = args.scheduler.scheduler_config();
        assert!(config.is_serial_execute);
        assert_eq!(config.sharding.unknown_affinity, UnknownAffinityPolicy::Isolate);
        assert_eq!(config.sharding.mode, ShardExecutionMode::Interleaved);
        assert_eq!(args.scheduler.executor_config(), ExecutorConfig::default());
    }

    #[test]
    fn fixture_or_sample() {
        assert!(TxflowArgs::try_parse_from(["txflow"]).is_err());
        assert!(TxflowArgs::try_parse_from(["txflow", "--shard-mode", "threads", "f.json"]).is_err());
        let args = TxflowArgs::try_parse_from(["txflow", "--sample"]).unwrap();
        assert!(args.sample);
        assert_eq!(args.scheduler.scheduler_config(), SchedulerConfig::default());
    }
}
