use crate::{CallKind, ExecResult, ExecStatus, Interpreter, Message, Precompiled, PrecompiledRegistry, VmError};
use alloy_primitives::{address, Address, BlockNumber, Bytes, Keccak256, Log, B256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};
use txflow_primitives::BlockHeader;
use txflow_storage::{Rollbackable, StateKey, StateStorage};

/// Committee contract deployed by the bootstrap transaction of block 0.
pub const BOOTSTRAP_COMMITTEE_ADDRESS: Address =
    address!("0x0000000000000000000000000000000000010001");

/// Default maximum nesting depth of calls.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 1024;

/// Host context configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HostConfig {
    /// Calls nested deeper than this fail with [`ExecStatus::CallDepthExceeded`].
    ///
    /// Nested calls recurse on the native stack, so the executing thread's stack must hold this
    /// many frames.
    pub max_call_depth: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self { max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }
}

/// Interface the interpreter uses to reach state and issue nested calls.
pub trait Host {
    /// Read storage `slot` of `address`.
    fn storage(&self, address: Address, slot: B256) -> Result<Option<Bytes>, VmError>;

    /// Write storage `slot` of `address`. An empty value clears the slot.
    fn set_storage(&mut self, address: Address, slot: B256, value: Bytes) -> Result<(), VmError>;

    /// Code deployed at `address`.
    fn code(&self, address: Address) -> Result<Option<Bytes>, VmError>;

    /// Append a log entry.
    fn emit_log(&mut self, log: Log);

    /// Execute a nested call or creation.
    fn call(&mut self, message: Message) -> Result<ExecResult, VmError>;

    /// Number of the executing block.
    fn block_number(&self) -> BlockNumber;

    /// Timestamp of the executing block.
    fn block_timestamp(&self) -> u64;
}

#[derive(Debug)]
enum Executable {
    Code(Bytes),
    Precompiled(Arc<dyn Precompiled>),
    Create(Bytes),
}

/// Per-transaction execution environment.
///
/// Owns the transaction's rollback scope, the call depth counter and the log accumulator. Each
/// frame takes a checkpoint before running; a frame that does not succeed is rolled back to it
/// together with the logs it emitted, so failures surface as a status to the caller instead of
/// aborting the transaction.
#[derive(Debug)]
pub struct HostContext<'a, S> {
    storage: Rollbackable<S>,
    header: &'a BlockHeader,
    message: Message,
    context_id: u64,
    seq: u64,
    interpreter: &'a dyn Interpreter,
    precompiled: &'a PrecompiledRegistry,
    config: HostConfig,
    logs: Vec<Log>,
    depth: u32,
    executable: Option<Executable>,
}

impl<'a, S: StateStorage> HostContext<'a, S> {
    /// Create new host context for the top-level `message`.
    pub fn new(
        storage: S,
        header: &'a BlockHeader,
        message: Message,
        context_id: u64,
        interpreter: &'a dyn Interpreter,
        precompiled: &'a PrecompiledRegistry,
        config: HostConfig,
    ) -> Self {
        Self {
            storage: Rollbackable::new(storage),
            header,
            message,
            context_id,
            seq: 0,
            interpreter,
            precompiled,
            config,
            logs: Vec::new(),
            depth: 0,
            executable: None,
        }
    }

    /// Resolve the code the top-level message runs.
    ///
    /// Fails with [`VmError::CodeNotFound`] if a call targets an address without code.
    pub fn prepare(&mut self) -> Result<(), VmError> {
        if self.executable.is_some() {
            return Err(VmError::InvalidState("fresh"))
        }
        let executable = self
            .resolve(&self.message)?
            .ok_or(VmError::CodeNotFound(self.message.code_address))?;
        trace!(target: "txflow::vm", context_id = self.context_id, ?executable, "prepared");
        self.executable = Some(executable);
        Ok(())
    }

    /// Run the prepared code to completion.
    pub fn execute(&mut self) -> Result<ExecResult, VmError> {
        let executable = self.executable.take().ok_or(VmError::InvalidState("prepared"))?;
        let message = self.message.clone();
        let result = self.run_frame(&message, executable)?;
        if !result.status.is_success() {
            debug!(target: "txflow::vm", context_id = self.context_id, status = ?result.status, "execution reverted");
        }
        Ok(result)
    }

    /// Logs emitted by successful frames, in order.
    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    /// Move the logs out of the context.
    pub fn take_logs(&mut self) -> Vec<Log> {
        std::mem::take(&mut self.logs)
    }

    /// Top-level message.
    pub const fn message(&self) -> &Message {
        &self.message
    }

    /// Release the storage, keeping every surviving write.
    pub fn into_storage(self) -> S {
        self.storage.into_inner()
    }

    fn resolve(&self, message: &Message) -> Result<Option<Executable>, VmError> {
        if message.kind == CallKind::Create {
            return Ok(Some(Executable::Create(message.input.clone())))
        }
        if let Some(contract) = self.precompiled.get(&message.code_address) {
            return Ok(Some(Executable::Precompiled(contract)))
        }
        Ok(self
            .storage
            .read(&StateKey::code(message.code_address))?
            .filter(|code| !code.is_empty())
            .map(Executable::Code))
    }

    fn run_frame(&mut self, message: &Message, executable: Executable) -> Result<ExecResult, VmError> {
        let checkpoint = self.storage.checkpoint();
        let logs_len = self.logs.len();
        match self.dispatch(message, executable) {
            Ok(result) if result.status.is_success() => Ok(result),
            Ok(result) => {
                self.storage.rollback(checkpoint)?;
                self.logs.truncate(logs_len);
                Ok(ExecResult { create_address: None, ..result })
            }
            Err(error) => {
                self.storage.rollback(checkpoint)?;
                self.logs.truncate(logs_len);
                Err(error)
            }
        }
    }

    fn dispatch(&mut self, message: &Message, executable: Executable) -> Result<ExecResult, VmError> {
        match executable {
            Executable::Code(code) => {
                let interpreter = self.interpreter;
                interpreter.execute(self, message, &code)
            }
            Executable::Precompiled(contract) => {
                let cost = contract.gas_cost(&message.input);
                let Some(gas_left) = message.gas.checked_sub(cost) else {
                    return Ok(ExecResult::failure(ExecStatus::OutOfGas, 0))
                };
                match contract.execute(&message.input) {
                    Ok(output) => Ok(ExecResult::success(gas_left, output)),
                    Err(error) => {
                        debug!(target: "txflow::vm", address = %message.code_address, %error, "precompiled contract failed");
                        Ok(ExecResult::failure(ExecStatus::Failure, gas_left))
                    }
                }
            }
            Executable::Create(init_code) => self.create(message, init_code),
        }
    }

    fn create(&mut self, message: &Message, init_code: Bytes) -> Result<ExecResult, VmError> {
        // the bootstrap transaction deploys at its own destination
        let address = if message.depth == 0 && message.recipient != Address::ZERO {
            message.recipient
        } else {
            self.new_contract_address(message.sender)
        };
        let code_key = StateKey::code(address);
        if self.storage.read(&code_key)?.is_some_and(|code| !code.is_empty()) {
            debug!(target: "txflow::vm", %address, "contract address collision");
            return Ok(ExecResult::failure(ExecStatus::Failure, message.gas))
        }

        let frame = Message { recipient: address, code_address: address, ..message.clone() };
        let interpreter = self.interpreter;
        let mut result = interpreter.execute(self, &frame, &init_code)?;
        if result.status.is_success() {
            if !result.output.is_empty() {
                self.storage.write(code_key, result.output.clone())?;
            }
            result.create_address = Some(address);
            trace!(target: "txflow::vm", %address, code_len = result.output.len(), "contract created");
        }
        Ok(result)
    }

    fn new_contract_address(&mut self, sender: Address) -> Address {
        let mut hasher = Keccak256::new();
        hasher.update(sender);
        hasher.update(self.header.number.to_be_bytes());
        hasher.update(self.context_id.to_be_bytes());
        hasher.update(self.seq.to_be_bytes());
        self.seq += 1;
        Address::from_word(hasher.finalize())
    }
}

impl<S: StateStorage> Host for HostContext<'_, S> {
    fn storage(&self, address: Address, slot: B256) -> Result<Option<Bytes>, VmError> {
        Ok(self.storage.read(&StateKey::slot(address, slot))?)
    }

    fn set_storage(&mut self, address: Address, slot: B256, value: Bytes) -> Result<(), VmError> {
        let key = StateKey::slot(address, slot);
        if value.is_empty() {
            self.storage.remove(&key)?;
        } else {
            self.storage.write(key, value)?;
        }
        Ok(())
    }

    fn code(&self, address: Address) -> Result<Option<Bytes>, VmError> {
        Ok(self.storage.read(&StateKey::code(address))?)
    }

    fn emit_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    fn call(&mut self, message: Message) -> Result<ExecResult, VmError> {
        if self.depth >= self.config.max_call_depth {
            trace!(target: "txflow::vm", depth = self.depth, "call depth exceeded");
            return Ok(ExecResult::failure(ExecStatus::CallDepthExceeded, message.gas))
        }
        let message = Message { depth: self.depth + 1, ..message };
        let Some(executable) = self.resolve(&message)? else {
            trace!(target: "txflow::vm", address = %message.code_address, "nested call to address without code");
            return Ok(ExecResult::failure(ExecStatus::Revert, message.gas))
        };

        self.depth += 1;
        let result = self.run_frame(&message, executable);
        self.depth -= 1;
        result
    }

    fn block_number(&self) -> BlockNumber {
        self.header.number
    }

    fn block_timestamp(&self) -> u64 {
        self.header.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precompiled::IDENTITY_ADDRESS;
    use alloy_primitives::{bytes, LogData};
    use assert_matches::assert_matches;
    use txflow_storage::MemoryStorage;

    type Program = fn(&mut dyn Host, &Message, &Bytes) -> Result<ExecResult, VmError>;

    /// Interpreter running a single native function regardless of code.
    #[derive(Debug)]
    struct FnInterpreter(Program);

    impl Interpreter for FnInterpreter {
        fn execute(
            &self,
            host: &mut dyn Host,
            message: &Message,
            code: &Bytes,
        ) -> Result<ExecResult, VmError> {
            (self.0)(host, message, code)
        }
    }

    const SENDER: Address = address!("0x1000000000000000000000000000000000000001");
    const CONTRACT: Address = address!("0x2000000000000000000000000000000000000002");
    const OTHER: Address = address!("0x3000000000000000000000000000000000000003");

    fn slot(index: u8) -> B256 {
        B256::with_last_byte(index)
    }

    fn log(address: Address) -> Log {
        Log { address, data: LogData::new_unchecked(vec![], bytes!("01")) }
    }

    fn storage_with_code() -> MemoryStorage {
        MemoryStorage::from_iter([
            (StateKey::code(CONTRACT), bytes!("01")),
            (StateKey::code(OTHER), bytes!("02")),
        ])
    }

    fn run(
        storage: &MemoryStorage,
        message: Message,
        program: Program,
        config: HostConfig,
    ) -> (Result<ExecResult, VmError>, Vec<Log>) {
        let header = BlockHeader { number: 1, ..Default::default() };
        let interpreter = FnInterpreter(program);
        let precompiled = PrecompiledRegistry::with_builtins();
        let mut host =
            HostContext::new(storage.clone(), &header, message, 0, &interpreter, &precompiled, config);
        let result = host.prepare().and_then(|_| host.execute());
        let logs = host.take_logs();
        (result, logs)
    }

    #[test]
    fn call_without_code_is_not_found() {
        let storage = MemoryStorage::new();
        let (result, _) = run(
            &storage,
            Message::call(SENDER, CONTRACT, Bytes::new(), 100),
            |_, message, _| Ok(ExecResult::success(message.gas, Bytes::new())),
            HostConfig::default(),
        );
        assert_matches!(result, Err(VmError::CodeNotFound(address)) if address == CONTRACT);
    }

    #[test]
    fn execute_requires_prepare() {
        let storage = storage_with_code();
        let header = BlockHeader::default();
        let interpreter = FnInterpreter(|_, message, _| Ok(ExecResult::success(message.gas, Bytes::new())));
        let precompiled = PrecompiledRegistry::new();
        let mut host = HostContext::new(
            storage,
            &header,
            Message::call(SENDER, CONTRACT, Bytes::new(), 100),
            0,
            &interpreter,
            &precompiled,
            HostConfig::default(),
        );
        assert_matches!(host.execute(), Err(VmError::InvalidState(_)));
        host.prepare().unwrap();
        assert_matches!(host.prepare(), Err(VmError::InvalidState(_)));
        assert!(host.execute().is_ok());
    }

    #[test]
    fn create_deploys_returned_code() {
        let storage = MemoryStorage::new();
        let (result, _) = run(
            &storage,
            Message::create(SENDER, bytes!("aa"), 100),
            |host, message, code| {
                host.set_storage(message.recipient, slot(0), code.clone())?;
                Ok(ExecResult::success(message.gas - 10, bytes!("c0de")))
            },
            HostConfig::default(),
        );
        let result = result.unwrap();
        let address = result.create_address.unwrap();
        assert_ne!(address, Address::ZERO);
        assert_eq!(result.gas_left, 90);
        assert_eq!(storage.read(&StateKey::code(address)).unwrap(), Some(bytes!("c0de")));
        assert_eq!(storage.read(&StateKey::slot(address, slot(0))).unwrap(), Some(bytes!("aa")));
    }

    #[test]
    fn bootstrap_create_deploys_at_destination() {
        let storage = MemoryStorage::new();
        let message = Message {
            kind: CallKind::Create,
            ..Message::call(SENDER, BOOTSTRAP_COMMITTEE_ADDRESS, bytes!("aa"), 100)
        };
        let (result, _) = run(
            &storage,
            message,
            |_, message, _| Ok(ExecResult::success(message.gas, bytes!("c0de"))),
            HostConfig::default(),
        );
        assert_eq!(result.unwrap().create_address, Some(BOOTSTRAP_COMMITTEE_ADDRESS));
        assert_eq!(
            storage.read(&StateKey::code(BOOTSTRAP_COMMITTEE_ADDRESS)).unwrap(),
            Some(bytes!("c0de"))
        );
    }

    #[test]
    fn failed_nested_call_rolls_back_only_the_child() {
        let storage = storage_with_code();
        let (result, logs) = run(
            &storage,
            Message::call(SENDER, CONTRACT, Bytes::new(), 100),
            |host, message, code| {
                if message.code_address == OTHER {
                    host.set_storage(OTHER, slot(1), bytes!("ff"))?;
                    host.emit_log(log(OTHER));
                    return Ok(ExecResult::failure(ExecStatus::Revert, message.gas))
                }
                assert_eq!(code, &bytes!("01"));
                host.set_storage(CONTRACT, slot(1), bytes!("01"))?;
                host.emit_log(log(CONTRACT));
                let child = host.call(Message::call(CONTRACT, OTHER, Bytes::new(), 50))?;
                assert_eq!(child.status, ExecStatus::Revert);
                Ok(ExecResult::success(message.gas, Bytes::new()))
            },
            HostConfig::default(),
        );
        assert_eq!(result.unwrap().status, ExecStatus::Success);
        assert_eq!(logs, vec![log(CONTRACT)]);
        assert_eq!(storage.read(&StateKey::slot(CONTRACT, slot(1))).unwrap(), Some(bytes!("01")));
        assert_eq!(storage.read(&StateKey::slot(OTHER, slot(1))).unwrap(), None);
    }

    #[test]
    fn top_level_revert_discards_writes_and_logs() {
        let storage = storage_with_code();
        let before = storage.snapshot();
        let (result, logs) = run(
            &storage,
            Message::call(SENDER, CONTRACT, Bytes::new(), 100),
            |host, message, _| {
                host.set_storage(CONTRACT, slot(1), bytes!("01"))?;
                host.emit_log(log(CONTRACT));
                Ok(ExecResult::failure(ExecStatus::OutOfGas, 0))
            },
            HostConfig::default(),
        );
        assert_eq!(result.unwrap().status, ExecStatus::OutOfGas);
        assert!(logs.is_empty());
        assert_eq!(storage.snapshot(), before);
    }

    #[test]
    fn call_depth_is_bounded() {
        let storage = storage_with_code();
        let (result, _) = run(
            &storage,
            Message::call(SENDER, CONTRACT, Bytes::new(), 100),
            |host, message, _| {
                // recurse until the host refuses
                let child = host.call(Message::call(CONTRACT, CONTRACT, Bytes::new(), message.gas))?;
                if message.depth == 2 {
                    assert_eq!(child.status, ExecStatus::CallDepthExceeded);
                }
                Ok(ExecResult { status: child.status, ..ExecResult::success(message.gas, Bytes::new()) })
            },
            HostConfig { max_call_depth: 2 },
        );
        assert_eq!(result.unwrap().status, ExecStatus::CallDepthExceeded);
    }

    #[test]
    fn precompiled_dispatch_and_gas() {
        let storage = MemoryStorage::new();
        let never: Program = |_, _, _| Err(VmError::Interpreter("interpreter must not run".into()));

        let (result, _) = run(
            &storage,
            Message::call(SENDER, IDENTITY_ADDRESS, bytes!("cafe"), 100),
            never,
            HostConfig::default(),
        );
        assert_eq!(result.unwrap(), ExecResult::success(82, bytes!("cafe")));

        let (result, _) = run(
            &storage,
            Message::call(SENDER, IDENTITY_ADDRESS, bytes!("cafe"), 10),
            never,
            HostConfig::default(),
        );
        assert_eq!(result.unwrap().status, ExecStatus::OutOfGas);
    }

    #[test]
    fn interpreter_error_rolls_back() {
        let storage = storage_with_code();
        let before = storage.snapshot();
        let (result, _) = run(
            &storage,
            Message::call(SENDER, CONTRACT, Bytes::new(), 100),
            |host, _, _| {
                host.set_storage(CONTRACT, slot(3), bytes!("03"))?;
                Err(VmError::Interpreter("boom".into()))
            },
            HostConfig::default(),
        );
        assert_matches!(result, Err(VmError::Interpreter(_)));
        assert_eq!(storage.snapshot(), before);
    }
}
