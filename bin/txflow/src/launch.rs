use crate::cli::TxflowArgs;
use eyre::eyre;
use std::sync::Arc;
use tracing::*;
use txflow_executor::TransactionExecutor;
use txflow_primitives::DefaultReceiptFactory;
use txflow_scheduler::{BlockExecutiveFactory, BuildOptions, ExecuteBlock};
use txflow_testing::{Fixture, ScriptInterpreter};
use txflow_vm::PrecompiledRegistry;

/// Executes the blocks of a fixture and prints their results as JSON.
#[derive(Debug)]
pub struct Launcher {
    args: TxflowArgs,
}

impl Launcher {
    /// Create new launcher.
    pub const fn new(args: TxflowArgs) -> Self {
        Self { args }
    }

    /// Run the command.
    pub async fn launch(self) -> eyre::Result<()> {
        if self.args.sample {
            println!("{}", serde_json::to_string_pretty(&Fixture::sample())?);
            return Ok(())
        }

        let path = self.args.fixture.ok_or_else(|| eyre!("no fixture given"))?;
        let fixture = Fixture::from_json(&tokio::fs::read_to_string(&path).await?)?;
        let state = fixture.genesis_state()?;
        info!(target: "txflow", path = %path.display(), contracts = fixture.genesis.len(), blocks = fixture.blocks.len(), "Loaded fixture");

        let executor = TransactionExecutor::new(
            Arc::new(ScriptInterpreter),
            PrecompiledRegistry::with_builtins(),
            Arc::new(DefaultReceiptFactory),
            self.args.scheduler.executor_config(),
        );
        let factory = BlockExecutiveFactory::new(executor, self.args.scheduler.scheduler_config());
        let execution = self.args.execution;

        let mut start_context_id = execution.start_context_id;
        let mut results = Vec::with_capacity(fixture.blocks.len());
        for block in fixture.blocks {
            let transactions = block.transaction_count();
            let options = BuildOptions {
                start_context_id,
                static_call: execution.static_call,
                sync_block: execution.verify_receipts && !block.receipts.is_empty(),
                temp_for_call: execution.static_call,
                ledger_config: fixture.ledger_config.clone(),
            };
            let executive = factory.build(block, options);
            let abort = executive.abort_handle();

            let mut storage = state.clone();
            let mut task = tokio::task::spawn_blocking(move || executive.execute(&mut storage));
            let result = tokio::select! {
                result = &mut task => result??,
                _ = tokio::signal::ctrl_c() => {
                    warn!(target: "txflow", "Received interrupt, aborting block");
                    abort.abort();
                    task.await??
                }
            };

            info!(
                target: "txflow",
                block_number = result.block_number,
                kind = %result.kind,
                transactions,
                gas_used = result.gas_used,
                shard_conflicts = result.shard_conflicts,
                sequential_fallback = result.sequential_fallback,
                "Executed block"
            );
            start_context_id += transactions as u64;
            results.push(result);
        }

        info!(target: "txflow", pinned_contracts = factory.cache().read().len(), state_entries = state.len(), "Finished");
        println!("{}", serde_json::to_string_pretty(&results)?);
        Ok(())
    }
}
