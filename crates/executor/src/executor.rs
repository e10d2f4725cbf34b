use crate::{metrics::ExecutorMetrics, BlockEnv, ExecutorConfig, ExecutorError, Step, TransactionSteps};
use std::sync::Arc;
use txflow_primitives::{Receipt, ReceiptFactory, Transaction};
use txflow_storage::StateStorage;
use txflow_vm::{Interpreter, PrecompiledRegistry};

/// Transaction executor.
///
/// Holds the capabilities every transaction needs: the interpreter, the precompiled registry and
/// the receipt factory. Cheap to clone; clones share the capabilities.
#[derive(Clone, Debug)]
pub struct TransactionExecutor {
    interpreter: Arc<dyn Interpreter>,
    precompiled: Arc<PrecompiledRegistry>,
    receipt_factory: Arc<dyn ReceiptFactory>,
    config: ExecutorConfig,
    metrics: ExecutorMetrics,
}

impl TransactionExecutor {
    /// Create new transaction executor.
    pub fn new(
        interpreter: Arc<dyn Interpreter>,
        precompiled: PrecompiledRegistry,
        receipt_factory: Arc<dyn ReceiptFactory>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            interpreter,
            precompiled: Arc::new(precompiled),
            receipt_factory,
            config,
            metrics: ExecutorMetrics::default(),
        }
    }

    /// Executable-code capability.
    pub fn interpreter(&self) -> &dyn Interpreter {
        &*self.interpreter
    }

    /// Precompiled contracts.
    pub fn precompiled(&self) -> &PrecompiledRegistry {
        &self.precompiled
    }

    /// Receipt constructors.
    pub fn receipt_factory(&self) -> &dyn ReceiptFactory {
        &*self.receipt_factory
    }

    /// Executor configuration.
    pub const fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub(crate) const fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }

    /// Start executing `transaction` over `storage`. Nothing runs until the returned state machine
    /// is resumed.
    pub fn steps<'a, S: StateStorage>(
        &'a self,
        env: BlockEnv<'a>,
        transaction: &'a Transaction,
        context_id: u64,
        storage: S,
    ) -> TransactionSteps<'a, S> {
        TransactionSteps::new(self, env, transaction, context_id, storage)
    }

    /// Run all three steps of `transaction` and return its receipt.
    pub fn execute_transaction<S: StateStorage>(
        &self,
        env: BlockEnv<'_>,
        transaction: &Transaction,
        context_id: u64,
        storage: S,
    ) -> Result<Receipt, ExecutorError> {
        let mut steps = self.steps(env, transaction, context_id, storage);
        loop {
            if let Step::Finalized(receipt) = steps.resume()? {
                return Ok(receipt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Address, Bytes, B256};
    use assert_matches::assert_matches;
    use txflow_primitives::{
        receipt::ReceiptVersion, BlockHeader, DefaultReceiptFactory, LedgerConfig, ReceiptStatus,
    };
    use txflow_storage::{MemoryStorage, StateKey};
    use txflow_testing::{FaultyStorage, Script, ScriptInterpreter};
    use txflow_vm::BOOTSTRAP_COMMITTEE_ADDRESS;

    const SENDER: Address = address!("0x1000000000000000000000000000000000000001");
    const CONTRACT: Address = address!("0x2000000000000000000000000000000000000002");

    fn executor() -> TransactionExecutor {
        TransactionExecutor::new(
            Arc::new(ScriptInterpreter::default()),
            PrecompiledRegistry::with_builtins(),
            Arc::new(DefaultReceiptFactory),
            ExecutorConfig::default(),
        )
    }

    fn header(number: u64) -> BlockHeader {
        BlockHeader { number, ..Default::default() }
    }

    fn storage() -> MemoryStorage {
        let code = Script::new().sstore(1, [0x2a]).log([0xbe, 0xef]).ret([0x01]).build();
        MemoryStorage::from_iter([(StateKey::code(CONTRACT), code)])
    }

    #[test]
    fn steps_walk_three_phases() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let tx = Transaction::new(SENDER, Some(CONTRACT), Bytes::new(), 0);
        let storage = storage();

        let mut steps = executor.steps(BlockEnv::new(&header, &ledger), &tx, 7, storage.clone());
        assert_eq!(steps.context_id(), 7);
        assert_eq!(steps.resume().unwrap(), Step::Prepared);
        assert_eq!(steps.resume().unwrap(), Step::Executed);
        let receipt = assert_matches!(steps.resume().unwrap(), Step::Finalized(receipt) => receipt);
        assert!(steps.is_finalized());
        assert_matches!(steps.resume(), Err(ExecutorError::AlreadyFinalized));

        assert_eq!(receipt.status(), ReceiptStatus::Success);
        assert_eq!(receipt.version(), ReceiptVersion::V0);
        assert_eq!(receipt.output(), &Bytes::from_static(&[0x01]));
        assert_eq!(receipt.logs().len(), 1);
        assert_eq!(receipt.block_number(), 1);
        assert!(receipt.gas_used() > 0);
        assert!(receipt.message().is_empty());
        assert_eq!(
            storage.read(&StateKey::slot(CONTRACT, B256::with_last_byte(1))).unwrap(),
            Some(Bytes::from_static(&[0x2a]))
        );
    }

    #[test]
    fn receipt_version_dispatch() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let env = BlockEnv::new(&header, &ledger);

        let v1 = Transaction::new(SENDER, Some(CONTRACT), Bytes::new(), 1);
        let receipt = executor.execute_transaction(env, &v1, 0, storage()).unwrap();
        assert_eq!(receipt.version(), ReceiptVersion::V1);

        let unknown = Transaction::new(SENDER, Some(CONTRACT), Bytes::new(), 9);
        assert_matches!(
            executor.execute_transaction(env, &unknown, 0, storage()),
            Err(ExecutorError::InvalidReceiptVersion(9))
        );
    }

    #[test]
    fn error_receipts_use_first_layout() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let env = BlockEnv::new(&header, &ledger);

        let missing = Transaction::new(SENDER, Some(Address::repeat_byte(0x77)), Bytes::new(), 1);
        let receipt = executor.execute_transaction(env, &missing, 0, storage()).unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Revert);
        assert_eq!(receipt.version(), ReceiptVersion::V0);

        let faulty = FaultyStorage::new(storage());
        faulty.fail_on(StateKey::slot(CONTRACT, B256::with_last_byte(1)));
        let v1 = Transaction::new(SENDER, Some(CONTRACT), Bytes::new(), 1);
        let receipt = executor.execute_transaction(env, &v1, 0, faulty).unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::InternalError);
        assert_eq!(receipt.version(), ReceiptVersion::V0);

        // an unknown version stays fatal even when execution failed
        let unknown = Transaction::new(SENDER, Some(SENDER), Bytes::new(), 9);
        assert_matches!(
            executor.execute_transaction(env, &unknown, 0, storage()),
            Err(ExecutorError::InvalidReceiptVersion(9))
        );
    }

    #[test]
    fn failed_create_reports_zero_address() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let tx = Transaction::new(SENDER, None, Script::new().sstore(1, [0x2a]).revert(b"").build(), 1);
        let storage = MemoryStorage::new();

        let receipt = executor
            .execute_transaction(BlockEnv::new(&header, &ledger), &tx, 0, storage.clone())
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Revert);
        assert_eq!(receipt.version(), ReceiptVersion::V1);
        assert_eq!(receipt.contract_address(), "0".repeat(40));
        assert_eq!(storage.len(), 0);
    }

    #[test]
    fn missing_code_reverts() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let tx = Transaction::new(SENDER, Some(SENDER), Bytes::from_static(&[1, 2]), 0);

        let receipt = executor
            .execute_transaction(BlockEnv::new(&header, &ledger), &tx, 0, MemoryStorage::new())
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Revert);
        assert_eq!(receipt.gas_used(), 0);
        assert!(receipt.output().is_empty());
        assert!(!receipt.message().is_empty());
    }

    #[test]
    fn out_of_gas_reverts_and_rolls_back() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default().with_gas_limit(1_000);
        let code = Script::new().sstore(1, [0x2a]).burn(10_000).build();
        let storage = MemoryStorage::from_iter([(StateKey::code(CONTRACT), code)]);
        let before = storage.snapshot();
        let tx = Transaction::new(SENDER, Some(CONTRACT), Bytes::new(), 0);

        let receipt = executor
            .execute_transaction(BlockEnv::new(&header, &ledger), &tx, 0, storage.clone())
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Revert);
        assert_eq!(receipt.gas_used(), 1_000);
        assert!(receipt.logs().is_empty());
        assert_eq!(storage.snapshot(), before);
    }

    #[test]
    fn create_reports_address() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let runtime = Script::new().ret([0x01]).build();
        let tx = Transaction::new(SENDER, None, Script::new().ret(runtime.clone()).build(), 0);
        let storage = MemoryStorage::new();

        let receipt = executor
            .execute_transaction(BlockEnv::new(&header, &ledger), &tx, 3, storage.clone())
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Success);
        assert!(receipt.output().is_empty());
        assert_eq!(receipt.contract_address().len(), 40);
        assert_eq!(receipt.contract_address(), receipt.contract_address().to_lowercase());

        let address: Address = receipt.contract_address().parse().unwrap();
        assert_eq!(storage.read(&StateKey::code(address)).unwrap(), Some(runtime));
    }

    #[test]
    fn bootstrap_creation_at_genesis() {
        let executor = executor();
        let ledger = LedgerConfig::default();
        let init = Script::new().ret(Script::new().stop().build()).build();
        let tx = Transaction::new(SENDER, Some(BOOTSTRAP_COMMITTEE_ADDRESS), init, 0);

        let genesis = header(0);
        let receipt = executor
            .execute_transaction(BlockEnv::new(&genesis, &ledger), &tx, 0, MemoryStorage::new())
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Success);
        assert_eq!(receipt.contract_address(), "0000000000000000000000000000000000010001");

        // a later block calls the committee instead
        let later = header(1);
        let receipt = executor
            .execute_transaction(BlockEnv::new(&later, &ledger), &tx, 0, MemoryStorage::new())
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::Revert);
    }

    #[test]
    fn storage_fault_is_internal_error() {
        let executor = executor();
        let header = header(1);
        let ledger = LedgerConfig::default();
        let storage = FaultyStorage::new(storage());
        storage.fail_on(StateKey::slot(CONTRACT, B256::with_last_byte(1)));
        let tx = Transaction::new(SENDER, Some(CONTRACT), Bytes::new(), 0);

        let receipt = executor
            .execute_transaction(BlockEnv::new(&header, &ledger), &tx, 0, storage)
            .unwrap();
        assert_eq!(receipt.status(), ReceiptStatus::InternalError);
        assert!(receipt.message().contains("unavailable"));
    }
}
