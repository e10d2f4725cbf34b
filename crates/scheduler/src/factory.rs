use crate::{
    executive::{BlockContext, LanePool, SequentialExecutive, SerialExecutive, ShardedExecutive},
    metrics::SchedulerMetrics,
    AbortHandle, BlockExecutive, ExecuteBlock, SchedulerConfig, ShardCache,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use txflow_executor::TransactionExecutor;
use txflow_primitives::{Block, BlockVersion, LedgerConfig};

/// Per-block options of [`BlockExecutiveFactory::build`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    /// Context id of the first transaction. Transaction `i` gets `start_context_id + i`.
    pub start_context_id: u64,
    /// Discard all state changes once the block is executed.
    pub static_call: bool,
    /// The block was received through sync; its carried receipts are verified.
    pub sync_block: bool,
    /// Speculative execution whose shard learning must not reach the canonical cache.
    pub temp_for_call: bool,
    /// Chain parameters in effect for the block.
    pub ledger_config: LedgerConfig,
}

/// Builds the executive for each block.
///
/// Blocks declaring [`BlockVersion::SHARDING`] or later run on a [`ShardedExecutive`]. Older
/// blocks run on a [`SerialExecutive`] if [`SchedulerConfig::is_serial_execute`] is set and on a
/// [`SequentialExecutive`] otherwise.
#[derive(Clone, Debug)]
pub struct BlockExecutiveFactory {
    executor: TransactionExecutor,
    config: SchedulerConfig,
    cache: ShardCache,
    pool: LanePool,
    metrics: SchedulerMetrics,
}

impl BlockExecutiveFactory {
    /// Create new factory with an empty shard cache.
    pub fn new(executor: TransactionExecutor, config: SchedulerConfig) -> Self {
        Self {
            executor,
            config,
            cache: ShardCache::new(),
            pool: LanePool::default(),
            metrics: SchedulerMetrics::default(),
        }
    }

    /// Use `cache` as the canonical shard cache.
    pub fn with_cache(mut self, cache: ShardCache) -> Self {
        self.cache = cache;
        self
    }

    /// Canonical shard cache shared by every non-speculative sharded executive.
    pub const fn cache(&self) -> &ShardCache {
        &self.cache
    }

    /// Scheduler configuration.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Transaction executor handed to every executive.
    pub const fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    /// Select and build the executive for `block`.
    pub fn build(&self, block: Block, options: BuildOptions) -> BlockExecutive {
        let BuildOptions { start_context_id, static_call, sync_block, temp_for_call, ledger_config } =
            options;
        let sharded = BlockVersion::SHARDING.is_enabled_in(block.header.version);
        let ctx = BlockContext {
            block,
            ledger_config,
            executor: self.executor.clone(),
            start_context_id,
            static_call,
            sync_block,
            abort: AbortHandle::new(),
            metrics: self.metrics.clone(),
        };

        let executive = if sharded {
            let cache = if temp_for_call { self.cache.detached() } else { self.cache.clone() };
            BlockExecutive::Sharded(ShardedExecutive::new(
                ctx,
                cache,
                self.config.sharding,
                self.pool.clone(),
            ))
        } else if self.config.is_serial_execute {
            BlockExecutive::Serial(SerialExecutive::new(ctx))
        } else {
            BlockExecutive::Sequential(SequentialExecutive::new(ctx))
        };
        debug!(target: "txflow::scheduler", kind = %executive.kind(), temp_for_call, static_call, sync_block, "built block executive");
        executive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{executive::test_utils::executor, ExecutiveKind, ShardId};
    use assert_matches::assert_matches;
    use txflow_testing::{
        fixtures::{call, contract, header, sender},
        Fixture,
    };

    fn block(version: u32) -> Block {
        let mut block = Block::new(header(1, BlockVersion::V3_0), vec![call(sender(1), contract(1))]);
        block.header.version = version;
        block
    }

    #[test]
    fn selects_executive_by_version() {
        let sequential = BlockExecutiveFactory::new(executor(), SchedulerConfig::default());
        let serial = BlockExecutiveFactory::new(
            executor(),
            SchedulerConfig { is_serial_execute: true, ..Default::default() },
        );

        for version in [BlockVersion::V3_0.into(), BlockVersion::V3_2.into()] {
            assert_eq!(sequential.build(block(version), Default::default()).kind(), ExecutiveKind::Sequential);
            assert_eq!(serial.build(block(version), Default::default()).kind(), ExecutiveKind::Serial);
        }
        // unknown later versions keep sharding
        for version in [BlockVersion::V3_3.into(), 0x0304_0000] {
            assert_eq!(sequential.build(block(version), Default::default()).kind(), ExecutiveKind::Sharded);
            assert_eq!(serial.build(block(version), Default::default()).kind(), ExecutiveKind::Sharded);
        }

        let options = BuildOptions { static_call: true, ..Default::default() };
        let executive = sequential.build(block(BlockVersion::V3_2.into()), options);
        assert!(executive.is_static_call());
        assert_eq!(executive.block().number(), 1);
    }

    #[test]
    fn canonical_executives_share_the_cache() {
        let fixture = Fixture::sample();
        let factory = BlockExecutiveFactory::new(executor(), SchedulerConfig::default())
            .with_cache(ShardCache::from_iter([(contract(1), ShardId(0))]));
        let options = BuildOptions { ledger_config: fixture.ledger_config.clone(), ..Default::default() };

        let executive = factory.build(fixture.blocks[0].clone(), options);
        let cache = assert_matches!(&executive, BlockExecutive::Sharded(sharded) => sharded.cache().clone());
        assert!(cache.is_shared_with(factory.cache()));

        executive.execute(&mut fixture.genesis_state().unwrap()).unwrap();
        assert!(factory.cache().read().get(&contract(2)).is_some());
        assert!(factory.cache().read().get(&contract(9)).is_some());
    }

    #[test]
    fn temp_calls_never_touch_the_canonical_cache() {
        let fixture = Fixture::sample();
        let factory = BlockExecutiveFactory::new(executor(), SchedulerConfig::default())
            .with_cache(ShardCache::from_iter([(contract(1), ShardId(0))]));
        let before = factory.cache().read().clone();
        let options = BuildOptions {
            temp_for_call: true,
            static_call: true,
            ledger_config: fixture.ledger_config.clone(),
            ..Default::default()
        };

        let executive = factory.build(fixture.blocks[0].clone(), options);
        let detached = assert_matches!(&executive, BlockExecutive::Sharded(sharded) => sharded.cache().clone());
        assert!(!detached.is_shared_with(factory.cache()));

        let mut state = fixture.genesis_state().unwrap();
        let genesis = state.snapshot();
        let result = executive.execute(&mut state).unwrap();
        assert!(result.static_call);
        assert_eq!(state.snapshot(), genesis);
        assert_eq!(*factory.cache().read(), before);
        assert!(detached.read().len() > before.len());
    }
}
