use crate::{ExecutorError, TransactionExecutor};
use alloy_primitives::{hex, Bytes, Log};
use tracing::{debug, trace};
use txflow_primitives::{
    BlockHeader, LedgerConfig, Receipt, ReceiptStatus, Transaction, TransactionVersion,
};
use txflow_storage::StateStorage;
use txflow_vm::{
    CallKind, ExecResult, HostContext, Message, VmError, BOOTSTRAP_COMMITTEE_ADDRESS,
};

/// Block-wide inputs shared by every transaction of a block.
#[derive(Clone, Copy, Debug)]
pub struct BlockEnv<'a> {
    /// Header of the executing block.
    pub header: &'a BlockHeader,
    /// Chain parameters.
    pub ledger_config: &'a LedgerConfig,
}

impl<'a> BlockEnv<'a> {
    /// Create new block environment.
    pub const fn new(header: &'a BlockHeader, ledger_config: &'a LedgerConfig) -> Self {
        Self { header, ledger_config }
    }
}

/// Phase reached by one call to [`TransactionSteps::resume`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Code was resolved. No receipt yet.
    Prepared,
    /// Code ran to completion. No receipt yet.
    Executed,
    /// The receipt was built. The state machine is terminal.
    Finalized(Receipt),
}

/// Everything the receipt is built from.
#[derive(Debug)]
struct Outcome {
    status: ReceiptStatus,
    gas_used: u64,
    contract_address: String,
    logs: Vec<Log>,
    output: Bytes,
    message: Option<String>,
}

impl Outcome {
    fn from_result(kind: CallKind, gas_limit: u64, result: ExecResult, logs: Vec<Log>) -> Self {
        let (contract_address, output) = match kind {
            CallKind::Create => {
                // a failed creation reports the zero address
                let address = result.create_address.unwrap_or_default();
                (hex::encode(address.as_slice()), Bytes::new())
            }
            CallKind::Call => (String::new(), result.output),
        };
        Self {
            status: result.status.receipt_status(),
            gas_used: gas_limit.saturating_sub(result.gas_left),
            contract_address,
            logs,
            output,
            message: None,
        }
    }

    fn from_error(error: &VmError) -> Self {
        let status = match error {
            VmError::CodeNotFound(_) => ReceiptStatus::Revert,
            _ => ReceiptStatus::InternalError,
        };
        Self {
            status,
            gas_used: 0,
            contract_address: String::new(),
            logs: Vec::new(),
            output: Bytes::new(),
            message: Some(error.to_string()),
        }
    }
}

enum State<'a, S> {
    Created(S),
    Prepared(HostContext<'a, S>),
    Failed { storage: S, outcome: Outcome },
    Executed { storage: S, outcome: Outcome },
    Finalized(S),
}

/// Resumable execution of one transaction.
///
/// Each [`resume`](Self::resume) advances exactly one phase, `Created → Prepared → Executed →
/// Finalized`, so callers can interleave transactions of different lanes between phases. A
/// transaction whose code is missing or whose execution hits an unexpected error still walks all
/// three phases and ends with a revert or internal-error receipt; only an unsupported receipt
/// version fails the state machine itself.
#[allow(missing_debug_implementations)]
pub struct TransactionSteps<'a, S> {
    executor: &'a TransactionExecutor,
    env: BlockEnv<'a>,
    transaction: &'a Transaction,
    context_id: u64,
    state: Option<State<'a, S>>,
}

impl<'a, S: StateStorage> TransactionSteps<'a, S> {
    pub(crate) fn new(
        executor: &'a TransactionExecutor,
        env: BlockEnv<'a>,
        transaction: &'a Transaction,
        context_id: u64,
        storage: S,
    ) -> Self {
        Self { executor, env, transaction, context_id, state: Some(State::Created(storage)) }
    }

    /// Context id the transaction runs with.
    pub const fn context_id(&self) -> u64 {
        self.context_id
    }

    /// Returns `true` once the receipt was produced.
    pub const fn is_finalized(&self) -> bool {
        matches!(self.state, Some(State::Finalized(_)))
    }

    /// Advance one phase.
    pub fn resume(&mut self) -> Result<Step, ExecutorError> {
        let state = self.state.take().ok_or(ExecutorError::Poisoned)?;
        let (next, step) = match state {
            State::Created(storage) => self.prepare(storage),
            State::Prepared(host) => self.execute(host),
            State::Failed { storage, outcome } => {
                (State::Executed { storage, outcome }, Step::Executed)
            }
            State::Executed { storage, outcome } => match self.finalize(outcome) {
                Ok(receipt) => (State::Finalized(storage), Step::Finalized(receipt)),
                Err(error) => {
                    self.state = Some(State::Finalized(storage));
                    return Err(error)
                }
            },
            State::Finalized(storage) => {
                self.state = Some(State::Finalized(storage));
                return Err(ExecutorError::AlreadyFinalized)
            }
        };
        self.state = Some(next);
        Ok(step)
    }

    /// Release the storage. Writes of a successful execution are kept.
    ///
    /// Returns `None` only if a previous step panicked.
    pub fn into_storage(self) -> Option<S> {
        match self.state? {
            State::Created(storage) |
            State::Failed { storage, .. } |
            State::Executed { storage, .. } |
            State::Finalized(storage) => Some(storage),
            State::Prepared(host) => Some(host.into_storage()),
        }
    }

    fn message(&self) -> Message {
        let transaction = self.transaction;
        let gas = self.env.ledger_config.gas_limit().0;
        let input = transaction.input().clone();
        match transaction.to() {
            None => Message::create(transaction.sender(), input, gas),
            Some(to) if self.env.header.number == 0 && to == BOOTSTRAP_COMMITTEE_ADDRESS => {
                Message { kind: CallKind::Create, ..Message::call(transaction.sender(), to, input, gas) }
            }
            Some(to) => Message::call(transaction.sender(), to, input, gas),
        }
    }

    fn prepare(&self, storage: S) -> (State<'a, S>, Step) {
        let executor = self.executor;
        let mut host = HostContext::new(
            storage,
            self.env.header,
            self.message(),
            self.context_id,
            executor.interpreter(),
            executor.precompiled(),
            executor.config().host_config(),
        );
        trace!(target: "txflow::executor", context_id = self.context_id, tx = %self.transaction.hash(), "preparing");
        match host.prepare() {
            Ok(()) => (State::Prepared(host), Step::Prepared),
            Err(error) => {
                debug!(target: "txflow::executor", context_id = self.context_id, %error, "prepare failed");
                let outcome = Outcome::from_error(&error);
                (State::Failed { storage: host.into_storage(), outcome }, Step::Prepared)
            }
        }
    }

    fn execute(&self, mut host: HostContext<'a, S>) -> (State<'a, S>, Step) {
        let kind = host.message().kind;
        let gas_limit = host.message().gas;
        trace!(target: "txflow::executor", context_id = self.context_id, ?kind, "executing");
        let outcome = match host.execute() {
            Ok(result) => {
                let logs = host.take_logs();
                Outcome::from_result(kind, gas_limit, result, logs)
            }
            Err(error) => {
                debug!(target: "txflow::executor", context_id = self.context_id, %error, "execution failed");
                Outcome::from_error(&error)
            }
        };
        (State::Executed { storage: host.into_storage(), outcome }, Step::Executed)
    }

    fn finalize(&self, outcome: Outcome) -> Result<Receipt, ExecutorError> {
        let version = TransactionVersion::try_from(self.transaction.version())
            .map_err(|error| ExecutorError::InvalidReceiptVersion(error.0))?;
        let factory = self.executor.receipt_factory();
        let Outcome { status, gas_used, contract_address, logs, output, message } = outcome;
        let number = self.env.header.number;
        let receipt = match (message, version) {
            // error receipts always use the first layout
            (Some(message), _) => factory
                .create_receipt(gas_used, contract_address, logs, status, output, number)
                .with_message(message),
            (None, TransactionVersion::V0) => {
                factory.create_receipt(gas_used, contract_address, logs, status, output, number)
            }
            (None, TransactionVersion::V1) => {
                factory.create_receipt2(gas_used, contract_address, logs, status, output, number)
            }
        };

        self.executor.metrics().record(status, gas_used);
        trace!(target: "txflow::executor", context_id = self.context_id, %status, gas_used, "finalized");
        Ok(receipt)
    }
}
