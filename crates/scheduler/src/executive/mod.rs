use crate::{metrics::SchedulerMetrics, SchedulerError};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, trace};
use txflow_executor::{BlockEnv, TransactionExecutor};
use txflow_primitives::{Block, BlockNumber, LedgerConfig, Receipt};
use txflow_storage::{Rollbackable, StateStorage};

mod sequential;
pub use sequential::SequentialExecutive;

mod serial;
pub use serial::SerialExecutive;

mod sharded;
pub use sharded::ShardedExecutive;

mod stack;
pub(crate) use stack::LanePool;

/// Shared cancellation flag of one block execution.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    /// Create new handle that is not aborted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the execution to stop. It rolls back and fails with [`SchedulerError::Aborted`]
    /// at the next check.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`AbortHandle::abort`] was called.
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn flag(&self) -> &AtomicBool {
        &self.0
    }
}

/// Block executive variant.
#[derive(
    Clone,
    Copy,
    Debug,
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
pub enum ExecutiveKind {
    /// One transaction at a time.
    Sequential,
    /// Step pipeline over a single lane.
    Serial,
    /// Lanes grouped by shard affinity.
    Sharded,
}

/// Outcome of a block execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockExecutionResult {
    /// Number of the executed block.
    pub block_number: BlockNumber,
    /// Executive that ran the block.
    pub kind: ExecutiveKind,
    /// One receipt per transaction, in submission order.
    pub receipts: Vec<Receipt>,
    /// Sum of the gas used by every transaction.
    pub gas_used: u64,
    /// Whether state changes were discarded.
    pub static_call: bool,
    /// Pairs of lanes found conflicting at commit.
    pub shard_conflicts: usize,
    /// Whether conflicts forced a sequential re-execution of the whole block.
    pub sequential_fallback: bool,
}

/// Block execution entry point implemented by every executive.
pub trait ExecuteBlock {
    /// Block being executed.
    fn block(&self) -> &Block;

    /// Executive variant.
    fn kind(&self) -> ExecutiveKind;

    /// Returns `true` if state changes are discarded after execution.
    fn is_static_call(&self) -> bool;

    /// Handle aborting this executive's execution.
    fn abort_handle(&self) -> AbortHandle;

    /// Execute the block on top of `storage`.
    ///
    /// Either every transaction gets a receipt and its writes are applied, or `storage` is left
    /// exactly as it was and an error is returned. Static calls always leave `storage` untouched.
    ///
    /// Transactions run on threads whose stack holds the configured call depth, never on the
    /// calling thread.
    fn execute<S: StateStorage + Send + Sync>(
        &self,
        storage: &mut S,
    ) -> Result<BlockExecutionResult, SchedulerError>;
}

/// Executive selected for one block.
#[derive(Debug)]
pub enum BlockExecutive {
    /// See [`SequentialExecutive`].
    Sequential(SequentialExecutive),
    /// See [`SerialExecutive`].
    Serial(SerialExecutive),
    /// See [`ShardedExecutive`].
    Sharded(ShardedExecutive),
}

impl ExecuteBlock for BlockExecutive {
    fn block(&self) -> &Block {
        match self {
            Self::Sequential(executive) => executive.block(),
            Self::Serial(executive) => executive.block(),
            Self::Sharded(executive) => executive.block(),
        }
    }

    fn kind(&self) -> ExecutiveKind {
        match self {
            Self::Sequential(executive) => executive.kind(),
            Self::Serial(executive) => executive.kind(),
            Self::Sharded(executive) => executive.kind(),
        }
    }

    fn is_static_call(&self) -> bool {
        match self {
            Self::Sequential(executive) => executive.is_static_call(),
            Self::Serial(executive) => executive.is_static_call(),
            Self::Sharded(executive) => executive.is_static_call(),
        }
    }

    fn abort_handle(&self) -> AbortHandle {
        match self {
            Self::Sequential(executive) => executive.abort_handle(),
            Self::Serial(executive) => executive.abort_handle(),
            Self::Sharded(executive) => executive.abort_handle(),
        }
    }

    fn execute<S: StateStorage + Send + Sync>(
        &self,
        storage: &mut S,
    ) -> Result<BlockExecutionResult, SchedulerError> {
        match self {
            Self::Sequential(executive) => executive.execute(storage),
            Self::Serial(executive) => executive.execute(storage),
            Self::Sharded(executive) => executive.execute(storage),
        }
    }
}

/// Receipts of a block and how they were obtained.
#[derive(Debug)]
pub(crate) struct BlockOutput {
    pub(crate) receipts: Vec<Receipt>,
    pub(crate) shard_conflicts: usize,
    pub(crate) sequential_fallback: bool,
}

impl BlockOutput {
    pub(crate) const fn ordered(receipts: Vec<Receipt>) -> Self {
        Self { receipts, shard_conflicts: 0, sequential_fallback: false }
    }
}

/// Per-block inputs shared by every executive.
#[derive(Debug)]
pub(crate) struct BlockContext {
    pub(crate) block: Block,
    pub(crate) ledger_config: LedgerConfig,
    pub(crate) executor: TransactionExecutor,
    pub(crate) start_context_id: u64,
    pub(crate) static_call: bool,
    pub(crate) sync_block: bool,
    pub(crate) abort: AbortHandle,
    pub(crate) metrics: SchedulerMetrics,
}

impl BlockContext {
    pub(crate) const fn env(&self) -> BlockEnv<'_> {
        BlockEnv::new(&self.block.header, &self.ledger_config)
    }

    pub(crate) const fn context_id(&self, index: usize) -> u64 {
        self.start_context_id.wrapping_add(index as u64)
    }

    /// Stack size of threads executing this block's transactions.
    pub(crate) const fn stack_size(&self) -> usize {
        stack::execution_stack_size(self.executor.config().max_call_depth)
    }

    pub(crate) fn check_abort(&self) -> Result<(), SchedulerError> {
        if self.abort.is_aborted() {
            return Err(SchedulerError::Aborted)
        }
        Ok(())
    }

    /// Run `body` inside a block-level rollback scope on an execution thread, verify the
    /// receipts and roll back on failure or for static calls.
    pub(crate) fn run<S, F>(
        &self,
        kind: ExecutiveKind,
        storage: &mut S,
        body: F,
    ) -> Result<BlockExecutionResult, SchedulerError>
    where
        S: StateStorage + Send,
        F: FnOnce(&mut Rollbackable<&mut S>) -> Result<BlockOutput, SchedulerError> + Send,
    {
        let stack_size = self.stack_size();
        stack::on_execution_stack(stack_size, move || self.run_in_scope(kind, storage, body))?
    }

    fn run_in_scope<S, F>(
        &self,
        kind: ExecutiveKind,
        storage: &mut S,
        body: F,
    ) -> Result<BlockExecutionResult, SchedulerError>
    where
        S: StateStorage,
        F: FnOnce(&mut Rollbackable<&mut S>) -> Result<BlockOutput, SchedulerError>,
    {
        let block_number = self.block.number();
        debug!(target: "txflow::scheduler", block_number, %kind, transactions = self.block.transaction_count(), "executing block");

        let mut scope = Rollbackable::new(storage);
        let checkpoint = scope.checkpoint();
        let outcome = self.check_abort().and_then(|_| body(&mut scope)).and_then(|output| {
            self.verify(&output.receipts)?;
            Ok(output)
        });
        let output = match outcome {
            Ok(output) => output,
            Err(error) => {
                scope.rollback(checkpoint)?;
                if error == SchedulerError::Aborted {
                    self.metrics.aborted.increment(1);
                }
                debug!(target: "txflow::scheduler", block_number, %error, "block execution failed");
                return Err(error)
            }
        };

        if self.static_call {
            trace!(target: "txflow::scheduler", block_number, writes = scope.journal_len(), "discarding static call writes");
            scope.rollback(checkpoint)?;
        }

        let gas_used = output.receipts.iter().map(Receipt::gas_used).sum();
        self.metrics.blocks.increment(1);
        self.metrics.block_gas_used.record(gas_used as f64);
        Ok(BlockExecutionResult {
            block_number,
            kind,
            receipts: output.receipts,
            gas_used,
            static_call: self.static_call,
            shard_conflicts: output.shard_conflicts,
            sequential_fallback: output.sequential_fallback,
        })
    }

    fn verify(&self, receipts: &[Receipt]) -> Result<(), SchedulerError> {
        if !self.sync_block || self.block.receipts.is_empty() {
            return Ok(())
        }
        if self.block.receipts.len() != receipts.len() {
            return Err(SchedulerError::ReceiptCountMismatch {
                expected: self.block.receipts.len(),
                got: receipts.len(),
            })
        }
        for (index, (carried, computed)) in self.block.receipts.iter().zip(receipts).enumerate() {
            let (expected, got) = (carried.hash_slow(), computed.hash_slow());
            if expected != got {
                return Err(SchedulerError::ReceiptMismatch { index, expected, got })
            }
        }
        Ok(())
    }
}

/// Order receipts tagged with submission indices, checking every transaction has exactly one.
pub(crate) fn reassemble(
    mut receipts: Vec<(usize, Receipt)>,
    count: usize,
) -> Result<Vec<Receipt>, SchedulerError> {
    receipts.sort_unstable_by_key(|(index, _)| *index);
    if receipts.len() != count || receipts.iter().enumerate().any(|(position, (index, _))| position != *index) {
        return Err(SchedulerError::Internal(format!(
            "expected {count} receipts in submission order, got {}",
            receipts.len()
        )))
    }
    Ok(receipts.into_iter().map(|(_, receipt)| receipt).collect())
}


#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Bytes;
    use txflow_primitives::{DefaultReceiptFactory, ReceiptFactory, ReceiptStatus};

    fn receipt(gas_used: u64) -> Receipt {
        DefaultReceiptFactory.create_receipt(
            gas_used,
            String::new(),
            vec![],
            ReceiptStatus::Success,
            Bytes::new(),
            1,
        )
    }

    #[test]
    fn reassemble_orders_by_index() {
        let receipts = vec![(2, receipt(2)), (0, receipt(0)), (1, receipt(1))];
        let ordered = reassemble(receipts, 3).unwrap();
        assert_eq!(ordered.iter().map(Receipt::gas_used).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn reassemble_rejects_gaps() {
        assert!(reassemble(vec![(0, receipt(0)), (2, receipt(2))], 2).is_err());
        assert!(reassemble(vec![(0, receipt(0)), (0, receipt(0))], 2).is_err());
        assert!(reassemble(vec![(0, receipt(0))], 2).is_err());
    }

    #[test]
    fn abort_handle_is_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());
        clone.abort();
        assert!(handle.is_aborted());
    }
}
