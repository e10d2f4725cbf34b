use crate::{BlockEnv, ExecutorError, Step, TransactionExecutor, TransactionSteps};
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::trace;
use txflow_primitives::{Receipt, Transaction};
use txflow_storage::StateStorage;

/// Receipts and lane storages returned by [`StepDriver::run`].
#[derive(Debug)]
pub struct DriverOutput<S> {
    /// Receipts tagged with the submission index of their transaction, in completion order.
    pub receipts: Vec<(usize, Receipt)>,
    /// Storage of every lane, in the order the lanes were added.
    pub storages: Vec<S>,
}

enum Progress {
    Idle,
    Stepped,
    Finalized(usize, Receipt),
}

struct Lane<'a, S> {
    storage: Option<S>,
    pending: VecDeque<(usize, &'a Transaction)>,
    current: Option<(usize, TransactionSteps<'a, S>)>,
}

impl<'a, S: StateStorage> Lane<'a, S> {
    fn step(
        &mut self,
        executor: &'a TransactionExecutor,
        env: BlockEnv<'a>,
        start_context_id: u64,
    ) -> Result<Progress, ExecutorError> {
        if self.current.is_none() {
            let Some((index, transaction)) = self.pending.pop_front() else {
                return Ok(Progress::Idle)
            };
            let storage = self.storage.take().ok_or(ExecutorError::Poisoned)?;
            let context_id = start_context_id.wrapping_add(index as u64);
            self.current = Some((index, executor.steps(env, transaction, context_id, storage)));
        }

        let Some((_, steps)) = self.current.as_mut() else { return Ok(Progress::Idle) };
        match steps.resume()? {
            Step::Finalized(receipt) => {
                let (index, steps) = self.current.take().ok_or(ExecutorError::Poisoned)?;
                self.storage = Some(steps.into_storage().ok_or(ExecutorError::Poisoned)?);
                Ok(Progress::Finalized(index, receipt))
            }
            Step::Prepared | Step::Executed => Ok(Progress::Stepped),
        }
    }
}

/// Cooperative driver interleaving the steps of several lanes on the calling thread.
///
/// A lane is an exclusively owned storage and a FIFO of transactions. The driver visits lanes in
/// rotation, resuming up to `quantum` steps of a lane per visit; a lane only starts its next
/// transaction once the previous one is finalized. The cancellation flag is checked before every
/// step.
#[allow(missing_debug_implementations)]
pub struct StepDriver<'a, S> {
    executor: &'a TransactionExecutor,
    env: BlockEnv<'a>,
    start_context_id: u64,
    lanes: Vec<Lane<'a, S>>,
    rotation: Vec<usize>,
    quantum: usize,
    cancelled: Option<&'a AtomicBool>,
}

impl<'a, S: StateStorage> StepDriver<'a, S> {
    /// Create new driver without lanes. Transaction `i` runs with context id
    /// `start_context_id + i`.
    pub const fn new(
        executor: &'a TransactionExecutor,
        env: BlockEnv<'a>,
        start_context_id: u64,
    ) -> Self {
        Self {
            executor,
            env,
            start_context_id,
            lanes: Vec::new(),
            rotation: Vec::new(),
            quantum: 1,
            cancelled: None,
        }
    }

    /// Add a lane running `transactions`, given with their submission indices, over `storage`.
    /// Returns the lane index.
    pub fn add_lane(
        &mut self,
        storage: S,
        transactions: impl IntoIterator<Item = (usize, &'a Transaction)>,
    ) -> usize {
        self.lanes.push(Lane {
            storage: Some(storage),
            pending: transactions.into_iter().collect(),
            current: None,
        });
        self.lanes.len() - 1
    }

    /// Visit lanes in `rotation` order. Unknown indices are ignored and lanes missing from the
    /// rotation are visited last, in index order.
    pub fn with_rotation(mut self, rotation: Vec<usize>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Resume up to `quantum` steps per lane visit. `usize::MAX` drains a lane before moving on.
    pub fn with_quantum(mut self, quantum: usize) -> Self {
        self.quantum = quantum.max(1);
        self
    }

    /// Stop with [`ExecutorError::Cancelled`] once `flag` is set.
    pub fn with_cancellation(mut self, flag: &'a AtomicBool) -> Self {
        self.cancelled = Some(flag);
        self
    }

    fn rotation(&self) -> Vec<usize> {
        let mut rotation = Vec::with_capacity(self.lanes.len());
        for index in self.rotation.iter().copied().chain(0..self.lanes.len()) {
            if index < self.lanes.len() && !rotation.contains(&index) {
                rotation.push(index);
            }
        }
        rotation
    }

    /// Run every lane to completion.
    pub fn run(mut self) -> Result<DriverOutput<S>, ExecutorError> {
        let rotation = self.rotation();
        let total = self.lanes.iter().map(|lane| lane.pending.len()).sum();
        let mut receipts = Vec::with_capacity(total);

        let mut progressed = true;
        while progressed {
            progressed = false;
            for &index in &rotation {
                let lane = &mut self.lanes[index];
                for _ in 0..self.quantum {
                    if self.cancelled.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                        trace!(target: "txflow::executor", lane = index, "driver cancelled");
                        return Err(ExecutorError::Cancelled)
                    }
                    match lane.step(self.executor, self.env, self.start_context_id)? {
                        Progress::Idle => break,
                        Progress::Stepped => {}
                        Progress::Finalized(tx_index, receipt) => {
                            trace!(target: "txflow::executor", lane = index, tx_index, "lane finalized transaction");
                            receipts.push((tx_index, receipt));
                        }
                    }
                    progressed = true;
                }
            }
        }

        let storages = self
            .lanes
            .into_iter()
            .map(|lane| lane.storage.ok_or(ExecutorError::Poisoned))
            .collect::<Result<_, _>>()?;
        Ok(DriverOutput { receipts, storages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Address, Bytes, B256};
    use assert_matches::assert_matches;
    use rand::seq::SliceRandom;
    use std::sync::Arc;
    use txflow_primitives::{BlockHeader, DefaultReceiptFactory, LedgerConfig, ReceiptStatus};
    use txflow_storage::{MemoryStorage, Rollbackable, StateKey};
    use txflow_testing::{Script, ScriptInterpreter};
    use txflow_vm::PrecompiledRegistry;

    const SENDER: Address = address!("0x1000000000000000000000000000000000000001");

    fn contract(index: u8) -> Address {
        Address::with_last_byte(index)
    }

    fn executor() -> TransactionExecutor {
        TransactionExecutor::new(
            Arc::new(ScriptInterpreter::default()),
            PrecompiledRegistry::new(),
            Arc::new(DefaultReceiptFactory),
            Default::default(),
        )
    }

    /// Every contract increments slot 0 and returns its new value.
    fn genesis(contracts: u8) -> MemoryStorage {
        let code = Script::new().incr(0).sload(0).stop().build();
        (1..=contracts).map(|index| (StateKey::code(contract(index)), code.clone())).collect()
    }

    fn counter(storage: &MemoryStorage, index: u8) -> Option<Bytes> {
        storage.read(&StateKey::slot(contract(index), B256::ZERO)).unwrap()
    }

    #[test]
    fn lanes_complete_in_rotation_order() {
        let executor = executor();
        let header = BlockHeader::default();
        let ledger = LedgerConfig::default();
        let transactions: Vec<_> = (1..=4)
            .map(|index| Transaction::new(SENDER, Some(contract(index)), Bytes::new(), 0))
            .collect();

        let mut rotations: Vec<Vec<usize>> = vec![vec![0, 1, 2, 3], vec![3, 2, 1, 0]];
        let mut shuffled = vec![0, 1, 2, 3];
        shuffled.shuffle(&mut rand::thread_rng());
        rotations.push(shuffled);

        for rotation in rotations {
            let storage = genesis(4);
            let mut scopes: Vec<_> = (0..4).map(|_| Rollbackable::new(storage.clone())).collect();
            let mut driver = StepDriver::new(&executor, BlockEnv::new(&header, &ledger), 0)
                .with_rotation(rotation.clone());
            for (index, scope) in scopes.iter_mut().enumerate() {
                driver.add_lane(scope, [(index, &transactions[index])]);
            }
            let output = driver.run().unwrap();

            let order: Vec<_> = output.receipts.iter().map(|(index, _)| *index).collect();
            assert_eq!(order, rotation);
            assert!(output.receipts.iter().all(|(_, receipt)| receipt.status() == ReceiptStatus::Success));
            assert_eq!(output.storages.len(), 4);
            for index in 1..=4 {
                assert_eq!(counter(&storage, index), Some(Bytes::from_static(&[1])));
            }
        }
    }

    #[test]
    fn lane_runs_in_submission_order() {
        let executor = executor();
        let header = BlockHeader::default();
        let ledger = LedgerConfig::default();
        let storage = genesis(1);
        let transactions: Vec<_> =
            (0..3).map(|_| Transaction::new(SENDER, Some(contract(1)), Bytes::new(), 0)).collect();

        let mut driver = StepDriver::new(&executor, BlockEnv::new(&header, &ledger), 10)
            .with_quantum(usize::MAX);
        driver.add_lane(storage.clone(), transactions.iter().enumerate());
        let output = driver.run().unwrap();

        let outputs: Vec<_> = output.receipts.iter().map(|(_, receipt)| receipt.output().clone()).collect();
        assert_eq!(
            outputs,
            vec![Bytes::from_static(&[1]), Bytes::from_static(&[2]), Bytes::from_static(&[3])]
        );
        assert_eq!(counter(&storage, 1), Some(Bytes::from_static(&[3])));
    }

    #[test]
    fn cancellation_stops_between_steps() {
        let executor = executor();
        let header = BlockHeader::default();
        let ledger = LedgerConfig::default();
        let tx = Transaction::new(SENDER, Some(contract(1)), Bytes::new(), 0);
        let cancelled = AtomicBool::new(true);

        let mut driver = StepDriver::new(&executor, BlockEnv::new(&header, &ledger), 0)
            .with_cancellation(&cancelled);
        driver.add_lane(genesis(1), [(0, &tx)]);
        assert_matches!(driver.run(), Err(ExecutorError::Cancelled));
    }

    #[test]
    fn empty_driver() {
        let executor = executor();
        let header = BlockHeader::default();
        let ledger = LedgerConfig::default();
        let driver = StepDriver::<MemoryStorage>::new(&executor, BlockEnv::new(&header, &ledger), 0);
        let output = driver.run().unwrap();
        assert!(output.receipts.is_empty());
        assert!(output.storages.is_empty());
    }
}
