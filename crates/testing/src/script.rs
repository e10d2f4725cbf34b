use alloy_primitives::{Address, Bytes, LogData, B256};
use tracing::trace;
use txflow_vm::{ExecResult, ExecStatus, Host, Interpreter, Message, VmError};

const STOP: u8 = 0x00;
const SSTORE: u8 = 0x01;
const SLOAD: u8 = 0x02;
const LOG: u8 = 0x03;
const CALL: u8 = 0x04;
const RETURN: u8 = 0x05;
const REVERT: u8 = 0x06;
const BURN: u8 = 0x07;
const CREATE: u8 = 0x08;
const INPUT: u8 = 0x09;
const INCR: u8 = 0x0a;
const STORE_INPUT: u8 = 0x0b;
const CALL_STORED: u8 = 0x0c;

/// One script instruction.
///
/// Variable-length operands are encoded with a big-endian `u16` length prefix. Slots are the last
/// byte of a zero-padded 32 byte storage slot. Instructions that produce data append it to the
/// frame's return buffer, which `Stop` and `Return` hand back as output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Succeed with the return buffer.
    Stop,
    /// Store a value in a slot of the executing contract. An empty value clears the slot.
    Sstore(u8, Bytes),
    /// Append the value of a slot to the return buffer.
    Sload(u8),
    /// Emit a log without topics.
    Log(Bytes),
    /// Call a contract with all remaining gas and append its output if it succeeds.
    Call(Address, Bytes),
    /// Succeed with the return buffer followed by the data.
    Return(Bytes),
    /// Revert with the data.
    Revert(Bytes),
    /// Consume gas.
    Burn(u32),
    /// Create a contract from init code and append its address if it succeeds.
    Create(Bytes),
    /// Append the call input to the return buffer.
    Input,
    /// Increment the big-endian counter held in a slot.
    Incr(u8),
    /// Store the call input in a slot.
    StoreInput(u8),
    /// Call the address held in a slot, if any, without input and append its output if it
    /// succeeds.
    CallStored(u8),
}

impl Instruction {
    /// Gas charged before the instruction runs.
    pub const fn cost(&self) -> u64 {
        match self {
            Self::Stop | Self::Return(_) | Self::Revert(_) | Self::Input => 3,
            Self::Sload(_) => 50,
            Self::Sstore(..) | Self::StoreInput(_) => 100,
            Self::Incr(_) => 150,
            Self::Log(_) => 20,
            Self::Call(..) => 100,
            Self::CallStored(_) => 150,
            Self::Create(_) => 200,
            Self::Burn(amount) => *amount as u64,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        fn data(out: &mut Vec<u8>, data: &[u8]) {
            out.extend_from_slice(&(data.len() as u16).to_be_bytes());
            out.extend_from_slice(data);
        }

        match self {
            Self::Stop => out.push(STOP),
            Self::Sstore(slot, value) => {
                out.extend_from_slice(&[SSTORE, *slot]);
                data(out, value);
            }
            Self::Sload(slot) => out.extend_from_slice(&[SLOAD, *slot]),
            Self::Log(value) => {
                out.push(LOG);
                data(out, value);
            }
            Self::Call(address, input) => {
                out.push(CALL);
                out.extend_from_slice(address.as_slice());
                data(out, input);
            }
            Self::Return(value) => {
                out.push(RETURN);
                data(out, value);
            }
            Self::Revert(value) => {
                out.push(REVERT);
                data(out, value);
            }
            Self::Burn(amount) => {
                out.push(BURN);
                out.extend_from_slice(&amount.to_be_bytes());
            }
            Self::Create(init_code) => {
                out.push(CREATE);
                data(out, init_code);
            }
            Self::Input => out.push(INPUT),
            Self::Incr(slot) => out.extend_from_slice(&[INCR, *slot]),
            Self::StoreInput(slot) => out.extend_from_slice(&[STORE_INPUT, *slot]),
            Self::CallStored(slot) => out.extend_from_slice(&[CALL_STORED, *slot]),
        }
    }

    /// Decode the instruction at `pc`, advancing it. Returns `None` for unknown opcodes and
    /// truncated operands.
    pub fn decode(code: &[u8], pc: &mut usize) -> Option<Self> {
        let mut reader = Reader { code, pc: *pc };
        let instruction = match reader.u8()? {
            STOP => Self::Stop,
            SSTORE => Self::Sstore(reader.u8()?, reader.data()?),
            SLOAD => Self::Sload(reader.u8()?),
            LOG => Self::Log(reader.data()?),
            CALL => Self::Call(Address::from_slice(reader.take(20)?), reader.data()?),
            RETURN => Self::Return(reader.data()?),
            REVERT => Self::Revert(reader.data()?),
            BURN => Self::Burn(u32::from_be_bytes(reader.take(4)?.try_into().ok()?)),
            CREATE => Self::Create(reader.data()?),
            INPUT => Self::Input,
            INCR => Self::Incr(reader.u8()?),
            STORE_INPUT => Self::StoreInput(reader.u8()?),
            CALL_STORED => Self::CallStored(reader.u8()?),
            _ => return None,
        };
        *pc = reader.pc;
        Some(instruction)
    }
}

struct Reader<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let slice = self.code.get(self.pc..self.pc.checked_add(len)?)?;
        self.pc += len;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|bytes| bytes[0])
    }

    fn data(&mut self) -> Option<Bytes> {
        let len = u16::from_be_bytes(self.take(2)?.try_into().ok()?);
        self.take(len as usize).map(Bytes::copy_from_slice)
    }
}

/// Script assembler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    instructions: Vec<Instruction>,
}

impl Script {
    /// Create an empty script. Running it succeeds with empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction.
    pub fn push(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// See [`Instruction::Stop`].
    pub fn stop(self) -> Self {
        self.push(Instruction::Stop)
    }

    /// See [`Instruction::Sstore`].
    pub fn sstore(self, slot: u8, value: impl AsRef<[u8]>) -> Self {
        self.push(Instruction::Sstore(slot, Bytes::copy_from_slice(value.as_ref())))
    }

    /// See [`Instruction::Sload`].
    pub fn sload(self, slot: u8) -> Self {
        self.push(Instruction::Sload(slot))
    }

    /// See [`Instruction::Log`].
    pub fn log(self, data: impl AsRef<[u8]>) -> Self {
        self.push(Instruction::Log(Bytes::copy_from_slice(data.as_ref())))
    }

    /// See [`Instruction::Call`].
    pub fn call(self, address: Address, input: impl AsRef<[u8]>) -> Self {
        self.push(Instruction::Call(address, Bytes::copy_from_slice(input.as_ref())))
    }

    /// See [`Instruction::Return`].
    pub fn ret(self, data: impl AsRef<[u8]>) -> Self {
        self.push(Instruction::Return(Bytes::copy_from_slice(data.as_ref())))
    }

    /// See [`Instruction::Revert`].
    pub fn revert(self, data: impl AsRef<[u8]>) -> Self {
        self.push(Instruction::Revert(Bytes::copy_from_slice(data.as_ref())))
    }

    /// See [`Instruction::Burn`].
    pub fn burn(self, amount: u32) -> Self {
        self.push(Instruction::Burn(amount))
    }

    /// See [`Instruction::Create`].
    pub fn create(self, init_code: impl AsRef<[u8]>) -> Self {
        self.push(Instruction::Create(Bytes::copy_from_slice(init_code.as_ref())))
    }

    /// See [`Instruction::Input`].
    pub fn input(self) -> Self {
        self.push(Instruction::Input)
    }

    /// See [`Instruction::Incr`].
    pub fn incr(self, slot: u8) -> Self {
        self.push(Instruction::Incr(slot))
    }

    /// See [`Instruction::StoreInput`].
    pub fn store_input(self, slot: u8) -> Self {
        self.push(Instruction::StoreInput(slot))
    }

    /// See [`Instruction::CallStored`].
    pub fn call_stored(self, slot: u8) -> Self {
        self.push(Instruction::CallStored(slot))
    }

    /// Encode the script.
    pub fn build(&self) -> Bytes {
        let mut out = Vec::new();
        for instruction in &self.instructions {
            instruction.encode(&mut out);
        }
        out.into()
    }
}

/// Interpreter for [`Script`] code.
///
/// Deterministic and gas-metered: every instruction is charged before it runs and the frame ends
/// with [`ExecStatus::OutOfGas`] as soon as the charge exceeds what is left.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScriptInterpreter;

impl Interpreter for ScriptInterpreter {
    fn execute(
        &self,
        host: &mut dyn Host,
        message: &Message,
        code: &Bytes,
    ) -> Result<ExecResult, VmError> {
        Frame { host, message, gas: message.gas, buffer: Vec::new() }.run(code)
    }
}

struct Frame<'a> {
    host: &'a mut dyn Host,
    message: &'a Message,
    gas: u64,
    buffer: Vec<u8>,
}

impl Frame<'_> {
    fn run(mut self, code: &[u8]) -> Result<ExecResult, VmError> {
        let mut pc = 0;
        while pc < code.len() {
            let Some(instruction) = Instruction::decode(code, &mut pc) else {
                trace!(target: "txflow::testing", pc, "malformed script");
                return Ok(ExecResult::failure(ExecStatus::Failure, self.gas))
            };
            let Some(gas) = self.gas.checked_sub(instruction.cost()) else {
                return Ok(ExecResult::failure(ExecStatus::OutOfGas, 0))
            };
            self.gas = gas;
            if let Some(result) = self.step(instruction)? {
                return Ok(result)
            }
        }
        Ok(self.success())
    }

    fn success(self) -> ExecResult {
        ExecResult::success(self.gas, self.buffer.into())
    }

    fn call(&mut self, address: Address, input: Bytes) -> Result<(), VmError> {
        let message = Message::call(self.message.recipient, address, input, self.gas);
        let result = self.host.call(message)?;
        self.gas = result.gas_left;
        if result.status.is_success() {
            self.buffer.extend_from_slice(&result.output);
        }
        Ok(())
    }

    fn step(&mut self, instruction: Instruction) -> Result<Option<ExecResult>, VmError> {
        let recipient = self.message.recipient;
        match instruction {
            Instruction::Stop => {
                return Ok(Some(ExecResult::success(self.gas, std::mem::take(&mut self.buffer).into())))
            }
            Instruction::Sstore(slot, value) => self.host.set_storage(recipient, key(slot), value)?,
            Instruction::Sload(slot) => {
                if let Some(value) = self.host.storage(recipient, key(slot))? {
                    self.buffer.extend_from_slice(&value);
                }
            }
            Instruction::Log(data) => self.host.emit_log(alloy_primitives::Log {
                address: recipient,
                data: LogData::new_unchecked(Vec::new(), data),
            }),
            Instruction::Call(address, input) => self.call(address, input)?,
            Instruction::CallStored(slot) => {
                let stored = self.host.storage(recipient, key(slot))?.unwrap_or_default();
                if stored.len() == 20 {
                    self.call(Address::from_slice(&stored), Bytes::new())?;
                }
            }
            Instruction::Return(data) => {
                self.buffer.extend_from_slice(&data);
                return Ok(Some(ExecResult::success(self.gas, std::mem::take(&mut self.buffer).into())))
            }
            Instruction::Revert(data) => {
                return Ok(Some(ExecResult {
                    output: data,
                    ..ExecResult::failure(ExecStatus::Revert, self.gas)
                }))
            }
            Instruction::Burn(_) => {}
            Instruction::Create(init_code) => {
                let result = self.host.call(Message::create(recipient, init_code, self.gas))?;
                self.gas = result.gas_left;
                if let Some(address) = result.create_address {
                    self.buffer.extend_from_slice(address.as_slice());
                }
            }
            Instruction::Input => self.buffer.extend_from_slice(&self.message.input),
            Instruction::Incr(slot) => {
                let current = self.host.storage(recipient, key(slot))?.unwrap_or_default();
                let Some(next) = decode_counter(&current).and_then(|value| value.checked_add(1))
                else {
                    return Ok(Some(ExecResult::failure(ExecStatus::Failure, self.gas)))
                };
                self.host.set_storage(recipient, key(slot), encode_counter(next))?;
            }
            Instruction::StoreInput(slot) => {
                self.host.set_storage(recipient, key(slot), self.message.input.clone())?
            }
        }
        Ok(None)
    }
}

fn key(slot: u8) -> B256 {
    B256::with_last_byte(slot)
}

fn decode_counter(bytes: &[u8]) -> Option<u64> {
    if bytes.len() > 8 {
        return None
    }
    Some(bytes.iter().fold(0, |value, byte| (value << 8) | *byte as u64))
}

/// Minimal big-endian encoding, at least one byte.
fn encode_counter(value: u64) -> Bytes {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|byte| *byte != 0).unwrap_or(bytes.len() - 1);
    Bytes::copy_from_slice(&bytes[start..])
}
