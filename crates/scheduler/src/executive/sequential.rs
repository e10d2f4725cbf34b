use super::{AbortHandle, BlockContext, BlockExecutionResult, BlockOutput, ExecuteBlock, ExecutiveKind};
use crate::SchedulerError;
use tracing::trace;
use txflow_primitives::{Block, Receipt};
use txflow_storage::StateStorage;

/// Executes transactions one at a time in submission order.
#[derive(Debug)]
pub struct SequentialExecutive {
    ctx: BlockContext,
}

impl SequentialExecutive {
    pub(crate) const fn new(ctx: BlockContext) -> Self {
        Self { ctx }
    }
}

/// Execute every transaction of the block in submission order over `storage`.
pub(crate) fn execute_in_order<S: StateStorage>(
    ctx: &BlockContext,
    storage: &mut S,
) -> Result<Vec<Receipt>, SchedulerError> {
    let env = ctx.env();
    let mut receipts = Vec::with_capacity(ctx.block.transaction_count());
    for (index, transaction) in ctx.block.transactions.iter().enumerate() {
        ctx.check_abort()?;
        let receipt =
            ctx.executor.execute_transaction(env, transaction, ctx.context_id(index), &mut *storage)?;
        trace!(target: "txflow::scheduler", index, status = %receipt.status(), "executed transaction");
        receipts.push(receipt);
    }
    Ok(receipts)
}

impl ExecuteBlock for SequentialExecutive {
    fn block(&self) -> &Block {
        &self.ctx.block
    }

    fn kind(&self) -> ExecutiveKind {
        ExecutiveKind::Sequential
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
        self.ctx.run(self.kind(), storage, |scope| {
            Ok(BlockOutput::ordered(execute_in_order(&self.ctx, scope)?))
        })
    }
}
