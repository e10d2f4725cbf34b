use super::{
    reassemble, AbortHandle, BlockContext, BlockExecutionResult, BlockOutput, ExecuteBlock,
    ExecutiveKind,
};
use crate::SchedulerError;
use txflow_executor::StepDriver;
use txflow_primitives::Block;
use txflow_storage::StateStorage;

/// Executes the block through the step pipeline over a single lane.
///
/// Every transaction is prepared, executed and finalized in submission order, so the outcome is
/// identical to [`super::SequentialExecutive`].
#[derive(Debug)]
pub struct SerialExecutive {
    ctx: BlockContext,
}

impl SerialExecutive {
    pub(crate) const fn new(ctx: BlockContext) -> Self {
        Self { ctx }
    }
}

impl ExecuteBlock for SerialExecutive {
    fn block(&self) -> &Block {
        &self.ctx.block
    }

    fn kind(&self) -> ExecutiveKind {
        ExecutiveKind::Serial
    }

    fn is_static_call(&self) -> bool {
        self.ctx.static_call
    }

    fn abort_handle(&self) -> AbortHandle {
        self.ctx.abort.clone()
    }

    fn execute<S: StateStorage + Send + Sync>(
        &self,
        storage: &mut S,
    ) -> Result<BlockExecutionResult, SchedulerError> {
        let ctx = &self.ctx;
        ctx.run(self.kind(), storage, |scope| {
            let mut driver = StepDriver::new(&ctx.executor, ctx.env(), ctx.start_context_id)
                .with_cancellation(ctx.abort.flag());
            driver.add_lane(&mut *scope, ctx.block.transactions.iter().enumerate());
            let output = driver.run()?;
            Ok(BlockOutput::ordered(reassemble(output.receipts, ctx.block.transaction_count())?))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        executive::test_utils::factory, BuildOptions, ExecuteBlock, ExecutiveKind, SchedulerConfig,
        SchedulerError,
    };
    use alloy_primitives::B256;
    use assert_matches::assert_matches;
    use txflow_primitives::{Block, BlockVersion, LedgerConfig, Transaction};
    use txflow_storage::{MemoryStorage, StateKey};
    use txflow_testing::{
        fixtures::{call, contract, counter_code, header, sender},
        FaultyStorage, Fixture, Script,
    };

    fn serial() -> SchedulerConfig {
        SchedulerConfig { is_serial_execute: true, ..Default::default() }
    }

    #[test]
    fn matches_sequential() {
        let fixture = Fixture::sample();
        let mut block = fixture.blocks[0].clone();
        block.header.version = BlockVersion::V3_2.into();
        block.transactions.push(Transaction::new(
            sender(4),
            Some(contract(1)),
            Script::new().input().build(),
            1,
        ));
        let options = BuildOptions { ledger_config: fixture.ledger_config.clone(), ..Default::default() };

        let sequential_state = fixture.genesis_state().unwrap();
        let sequential = factory(SchedulerConfig::default())
            .build(block.clone(), options.clone())
            .execute(&mut sequential_state.clone())
            .unwrap();

        let serial_state = fixture.genesis_state().unwrap();
        let executive = factory(serial()).build(block, options);
        assert_eq!(executive.kind(), ExecutiveKind::Serial);
        let result = executive.execute(&mut serial_state.clone()).unwrap();

        assert_eq!(result.receipts, sequential.receipts);
        assert_eq!(result.gas_used, sequential.gas_used);
        assert_eq!(serial_state.snapshot(), sequential_state.snapshot());
    }

    #[test]
    fn storage_fault_is_a_receipt_and_abort_rolls_back() {
        let inner = MemoryStorage::from_iter([(StateKey::code(contract(1)), counter_code())]);
        let mut storage = FaultyStorage::new(inner.clone());
        storage.fail_on(StateKey::slot(contract(1), B256::ZERO));
        let block = Block::new(
            header(1, BlockVersion::V3_2),
            vec![call(sender(1), contract(1)), call(sender(1), contract(1))],
        );
        let options = BuildOptions {
            ledger_config: LedgerConfig::default().with_gas_limit(100_000),
            ..Default::default()
        };

        let result = factory(serial()).build(block.clone(), options.clone()).execute(&mut storage).unwrap();
        assert!(result.receipts.iter().all(|receipt| receipt.message().contains("unavailable")));

        let executive = factory(serial()).build(block, options);
        executive.abort_handle().abort();
        let before = inner.snapshot();
        assert_matches!(executive.execute(&mut storage), Err(SchedulerError::Aborted));
        assert_eq!(inner.snapshot(), before);
    }
}
