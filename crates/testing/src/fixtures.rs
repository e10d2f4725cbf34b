use crate::Script;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use txflow_primitives::{
    Block, BlockHeader, BlockNumber, BlockVersion, LedgerConfig, Transaction, DEFAULT_TX_GAS_LIMIT,
};
use txflow_storage::{MemoryStorage, StateKey, StateStorage, StorageError};

/// Contract present in the genesis state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisContract {
    /// Contract address.
    pub address: Address,
    /// Deployed code.
    pub code: Bytes,
    /// Initial storage slots.
    #[serde(default)]
    pub storage: BTreeMap<B256, Bytes>,
}

/// Genesis state and the blocks to execute on top of it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Chain parameters.
    #[serde(default)]
    pub ledger_config: LedgerConfig,
    /// Genesis contracts.
    #[serde(default)]
    pub genesis: Vec<GenesisContract>,
    /// Blocks in execution order.
    #[serde(default)]
    pub blocks: Vec<Block>,
}

impl Fixture {
    /// Parse a JSON fixture.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Build the genesis state.
    pub fn genesis_state(&self) -> Result<MemoryStorage, StorageError> {
        let mut state = MemoryStorage::new();
        for contract in &self.genesis {
            state.write(StateKey::code(contract.address), contract.code.clone())?;
            for (slot, value) in &contract.storage {
                state.write(StateKey::slot(contract.address, *slot), value.clone())?;
            }
        }
        Ok(state)
    }

    /// Fixture exercising every receipt outcome: a creation, successful calls, a call to an
    /// address without code and a call running out of gas.
    pub fn sample() -> Self {
        let genesis = vec![
            GenesisContract { address: contract(1), code: counter_code(), ..Default::default() },
            GenesisContract { address: contract(2), code: counter_code(), ..Default::default() },
            GenesisContract {
                address: contract(3),
                code: Script::new().burn(u32::MAX).build(),
                ..Default::default()
            },
        ];
        let transactions = vec![
            Transaction::new(sender(1), None, Script::new().ret(counter_code()).build(), 0),
            call(sender(1), contract(1)),
            call(sender(2), contract(2)),
            call(sender(1), contract(1)),
            call(sender(3), contract(9)),
            call(sender(3), contract(3)),
        ];
        Self {
            ledger_config: LedgerConfig::default().with_gas_limit(1_000_000),
            genesis,
            blocks: vec![Block::new(header(1, BlockVersion::V3_3), transactions)],
        }
    }
}

/// Externally owned sender account.
pub fn sender(index: u8) -> Address {
    Address::repeat_byte(index)
}

/// Contract address, disjoint from [`sender`] addresses.
pub fn contract(index: u8) -> Address {
    let mut bytes = [0; 20];
    bytes[18] = 0xc0;
    bytes[19] = index;
    Address::new(bytes)
}

/// Code incrementing the counter in slot 0 and returning its new value.
pub fn counter_code() -> Bytes {
    Script::new().incr(0).sload(0).stop().build()
}

/// Value of the counter kept by [`counter_code`] at `address`.
pub fn counter(state: &impl StateStorage, address: Address) -> Result<Option<Bytes>, StorageError> {
    state.read(&StateKey::slot(address, B256::ZERO))
}

/// Version 0 call without input.
pub fn call(sender: Address, to: Address) -> Transaction {
    Transaction::new(sender, Some(to), Bytes::new(), 0)
}

/// Header of block `number` declaring `version`.
pub fn header(number: BlockNumber, version: BlockVersion) -> BlockHeader {
    BlockHeader { number, version: version.into(), gas_limit: DEFAULT_TX_GAS_LIMIT, ..Default::default() }
}
