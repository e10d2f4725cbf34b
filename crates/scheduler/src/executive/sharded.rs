use super::{
    reassemble, sequential::execute_in_order, AbortHandle, BlockContext, BlockExecutionResult,
    BlockOutput, ExecuteBlock, ExecutiveKind, LanePool,
};
use crate::{
    SchedulerError, ShardCache, ShardExecutionMode, ShardId, ShardingConfig, UnknownAffinityPolicy,
};
use alloy_primitives::Address;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace, warn};
use txflow_executor::StepDriver;
use txflow_primitives::{Block, Receipt};
use txflow_storage::{AccessSet, ChangeSet, Rollbackable, StateStorage, TrackedStorage};

/// Grouping key of a lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum LaneKey {
    /// Destination pinned to a shard.
    Shard(ShardId),
    /// Destination without affinity, isolated in its own lane.
    Unknown(Address),
    /// Creations and destinations without affinity sharing one lane.
    Unassigned,
}

/// Transactions executed in submission order over one speculative overlay.
#[derive(Debug)]
struct Lane {
    key: LaneKey,
    transactions: Vec<usize>,
}

#[derive(Debug)]
struct LaneRun {
    receipts: Vec<(usize, Receipt)>,
    access: AccessSet,
    changes: ChangeSet,
}

/// Lanes of an execution and what each of them accessed.
#[derive(Debug)]
struct LearnInput {
    lanes: Vec<Lane>,
    accesses: Vec<AccessSet>,
    conflicting: BTreeSet<usize>,
}

/// Executes lanes of transactions grouped by shard affinity side by side.
///
/// Each lane runs over its own [`TrackedStorage`] overlay of the block state. Lanes whose
/// accesses do not conflict with any other lane are merged directly. Transactions of conflicting
/// lanes are then retried in submission order on top of the merged state; if the retry reads or
/// writes state the merged lanes wrote, the whole block is re-executed sequentially. Receipts
/// always equal those of executing the block in submission order.
///
/// After a successful execution the observed affinities are written back to the [`ShardCache`].
/// Contracts of conflicting lanes are pinned to a common shard so later blocks place them in the
/// same lane.
#[derive(Debug)]
pub struct ShardedExecutive {
    ctx: BlockContext,
    cache: ShardCache,
    config: ShardingConfig,
    pool: LanePool,
    rotation: Vec<usize>,
    quantum: usize,
}

impl ShardedExecutive {
    pub(crate) const fn new(
        ctx: BlockContext,
        cache: ShardCache,
        config: ShardingConfig,
        pool: LanePool,
    ) -> Self {
        Self { ctx, cache, config, pool, rotation: Vec::new(), quantum: 1 }
    }

    /// Shard cache consulted and updated by this executive.
    pub const fn cache(&self) -> &ShardCache {
        &self.cache
    }

    /// Lane visiting order and steps per visit in [`ShardExecutionMode::Interleaved`] mode.
    /// See [`StepDriver::with_rotation`] and [`StepDriver::with_quantum`].
    pub fn with_interleaving(mut self, rotation: Vec<usize>, quantum: usize) -> Self {
        self.rotation = rotation;
        self.quantum = quantum;
        self
    }

    /// Group transactions into lanes, in order of first appearance.
    fn plan(&self) -> Vec<Lane> {
        let table = self.cache.read();
        let mut lanes: Vec<Lane> = Vec::new();
        let mut positions = HashMap::new();
        for (index, transaction) in self.ctx.block.transactions.iter().enumerate() {
            let key = match transaction.to() {
                Some(to) => match table.get(&to) {
                    Some(shard) => LaneKey::Shard(shard),
                    None if self.config.unknown_affinity == UnknownAffinityPolicy::Isolate => {
                        LaneKey::Unknown(to)
                    }
                    None => LaneKey::Unassigned,
                },
                None => LaneKey::Unassigned,
            };
            let position = *positions.entry(key).or_insert_with(|| {
                lanes.push(Lane { key, transactions: Vec::new() });
                lanes.len() - 1
            });
            lanes[position].transactions.push(index);
        }
        lanes
    }

    fn run_parallel<S>(&self, base: &S, lanes: &[Lane]) -> Result<Vec<LaneRun>, SchedulerError>
    where
        S: StateStorage + Sync,
    {
        let ctx = &self.ctx;
        let env = ctx.env();
        let pool = self.pool.get(ctx.stack_size())?;
        pool.install(|| {
            lanes
                .par_iter()
                .map(|lane| -> Result<LaneRun, SchedulerError> {
                    let mut overlay = TrackedStorage::new(base);
                    let mut receipts = Vec::with_capacity(lane.transactions.len());
                    for &index in &lane.transactions {
                        ctx.check_abort()?;
                        let receipt = ctx.executor.execute_transaction(
                            env,
                            &ctx.block.transactions[index],
                            ctx.context_id(index),
                            &mut overlay,
                        )?;
                        receipts.push((index, receipt));
                    }
                    let (access, changes) = overlay.into_parts();
                    Ok(LaneRun { receipts, access, changes })
                })
                .collect()
        })
    }

    fn run_interleaved<S>(&self, base: &S, lanes: &[Lane]) -> Result<Vec<LaneRun>, SchedulerError>
    where
        S: StateStorage,
    {
        let ctx = &self.ctx;
        let mut lane_of = vec![0; ctx.block.transaction_count()];
        let mut driver = StepDriver::new(&ctx.executor, ctx.env(), ctx.start_context_id)
            .with_rotation(self.rotation.clone())
            .with_quantum(self.quantum)
            .with_cancellation(ctx.abort.flag());
        for (position, lane) in lanes.iter().enumerate() {
            for &index in &lane.transactions {
                lane_of[index] = position;
            }
            driver.add_lane(
                TrackedStorage::new(base),
                lane.transactions.iter().map(|&index| (index, &ctx.block.transactions[index])),
            );
        }

        let output = driver.run()?;
        let mut runs: Vec<LaneRun> = output
            .storages
            .into_iter()
            .map(|overlay| {
                let (access, changes) = overlay.into_parts();
                LaneRun { receipts: Vec::new(), access, changes }
            })
            .collect();
        for (index, receipt) in output.receipts {
            runs[lane_of[index]].receipts.push((index, receipt));
        }
        Ok(runs)
    }

    /// Run the lanes over `scope`, merge the independent ones and reconcile the conflicting ones.
    fn execute_lanes<S>(
        &self,
        scope: &mut Rollbackable<&mut S>,
        lanes: Vec<Lane>,
    ) -> Result<(BlockOutput, LearnInput), SchedulerError>
    where
        S: StateStorage + Sync,
    {
        let ctx = &self.ctx;
        let count = ctx.block.transaction_count();
        let checkpoint = scope.checkpoint();
        let runs = match self.config.mode {
            ShardExecutionMode::Parallel => self.run_parallel(&*scope, &lanes)?,
            ShardExecutionMode::Interleaved => self.run_interleaved(&*scope, &lanes)?,
        };

        let mut conflicting = BTreeSet::new();
        let mut shard_conflicts = 0;
        for ((left, a), (right, b)) in runs.iter().enumerate().tuple_combinations() {
            if a.access.conflicts_with(&b.access) {
                trace!(target: "txflow::scheduler", left = ?lanes[left].key, right = ?lanes[right].key, "lanes conflict");
                shard_conflicts += 1;
                conflicting.insert(left);
                conflicting.insert(right);
            }
        }

        let mut receipts = Vec::with_capacity(count);
        let mut merged = AccessSet::default();
        let mut accesses = Vec::with_capacity(runs.len());
        let mut retry = Vec::new();
        for (position, run) in runs.into_iter().enumerate() {
            if conflicting.contains(&position) {
                retry.extend(run.receipts.into_iter().map(|(index, _)| index));
            } else {
                run.changes.apply_to(&mut *scope)?;
                receipts.extend(run.receipts);
                merged.extend(run.access.clone());
            }
            accesses.push(run.access);
        }

        let mut output = BlockOutput { receipts: Vec::new(), shard_conflicts, sequential_fallback: false };
        if !retry.is_empty() {
            ctx.metrics.shard_conflicts.increment(shard_conflicts as u64);
            debug!(target: "txflow::scheduler", block_number = ctx.block.number(), shard_conflicts, retried = retry.len(), "retrying conflicting lanes");
            retry.sort_unstable();
            let (access, changes, retried) = self.retry(&*scope, &retry).map_err(escalate)?;

            if access.conflicts_with(&merged) {
                warn!(target: "txflow::scheduler", block_number = ctx.block.number(), shard_conflicts, "conflict retry overlaps merged lanes, executing block sequentially");
                ctx.metrics.sequential_fallbacks.increment(1);
                scope.rollback(checkpoint)?;
                output.receipts = execute_in_order(ctx, scope).map_err(escalate)?;
                output.sequential_fallback = true;
                return Ok((output, LearnInput { lanes, accesses, conflicting }))
            }

            changes.apply_to(&mut *scope)?;
            receipts.extend(retried);
        }

        output.receipts = reassemble(receipts, count)?;
        Ok((output, LearnInput { lanes, accesses, conflicting }))
    }

    /// Execute `transactions` in the given order over an overlay of `base`.
    fn retry<S: StateStorage>(
        &self,
        base: &S,
        transactions: &[usize],
    ) -> Result<(AccessSet, ChangeSet, Vec<(usize, Receipt)>), SchedulerError> {
        let ctx = &self.ctx;
        let mut overlay = TrackedStorage::new(base);
        let mut receipts = Vec::with_capacity(transactions.len());
        for &index in transactions {
            ctx.check_abort()?;
            let receipt = ctx.executor.execute_transaction(
                ctx.env(),
                &ctx.block.transactions[index],
                ctx.context_id(index),
                &mut overlay,
            )?;
            receipts.push((index, receipt));
        }
        let (access, changes) = overlay.into_parts();
        Ok((access, changes, receipts))
    }

    /// Record the affinities observed by a successful execution in the cache.
    fn learn(&self, input: LearnInput, receipts: &[Receipt]) {
        let LearnInput { lanes, accesses, conflicting } = input;
        let transactions = &self.ctx.block.transactions;
        let destination = |index: usize| -> Option<Address> {
            transactions[index].to().or_else(|| {
                let created: Address = receipts.get(index)?.contract_address().parse().ok()?;
                (!created.is_zero()).then_some(created)
            })
        };
        let touched = |position: usize| {
            let mut contracts = accesses[position].contracts();
            contracts.extend(lanes[position].transactions.iter().filter_map(|&index| destination(index)));
            contracts
        };

        let mut table = self.cache.write();
        let before = table.len();

        if !conflicting.is_empty() {
            let shard = conflicting
                .iter()
                .find_map(|&position| match lanes[position].key {
                    LaneKey::Shard(shard) => Some(shard),
                    _ => None,
                })
                .unwrap_or_else(|| table.allocate());
            for &position in &conflicting {
                for contract in touched(position) {
                    table.assign(contract, shard);
                }
            }
        }

        for (position, lane) in lanes.iter().enumerate() {
            if conflicting.contains(&position) {
                continue
            }
            match lane.key {
                LaneKey::Shard(shard) => {
                    for contract in touched(position) {
                        if table.get(&contract).is_none() {
                            table.assign(contract, shard);
                        }
                    }
                }
                LaneKey::Unknown(_) => {
                    let unmapped: Vec<_> = touched(position)
                        .into_iter()
                        .filter(|contract| table.get(contract).is_none())
                        .collect();
                    if !unmapped.is_empty() {
                        let shard = table.allocate();
                        for contract in unmapped {
                            table.assign(contract, shard);
                        }
                    }
                }
                LaneKey::Unassigned => {
                    for &index in &lane.transactions {
                        let Some(contract) = destination(index) else { continue };
                        if table.get(&contract).is_none() {
                            let shard = table.allocate();
                            table.assign(contract, shard);
                        }
                    }
                }
            }
        }

        trace!(target: "txflow::scheduler", pinned = table.len() - before, merged_lanes = conflicting.len(), "updated shard cache");
    }
}

/// Failures while reconciling conflicts are internal, except for aborts.
fn escalate(error: SchedulerError) -> SchedulerError {
    match error {
        SchedulerError::Aborted | SchedulerError::Internal(_) => error,
        error => SchedulerError::Internal(format!("shard conflict retry failed: {error}")),
    }
}

impl ExecuteBlock for ShardedExecutive {
    fn block(&self) -> &Block {
        &self.ctx.block
    }

    fn kind(&self) -> ExecutiveKind {
        ExecutiveKind::Sharded
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
        let mut learned = None;
        let result = self.ctx.run(self.kind(), storage, |scope| {
            let lanes = self.plan();
            debug!(target: "txflow::scheduler", block_number = self.ctx.block.number(), lanes = lanes.len(), mode = %self.config.mode, "planned lanes");
            let (output, input) = self.execute_lanes(scope, lanes)?;
            learned = Some(input);
            Ok(output)
        })?;
        if let Some(input) = learned {
            self.learn(input, &result.receipts);
        }
        Ok(result)
    }
}
