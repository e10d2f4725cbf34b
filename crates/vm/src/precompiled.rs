use alloy_primitives::{address, keccak256, Address, Bytes};
use std::{collections::HashMap, fmt, sync::Arc};

/// Address of the [`Identity`] built-in.
pub const IDENTITY_ADDRESS: Address = address!("0x0000000000000000000000000000000000000004");

/// Address of the [`Keccak256Hash`] built-in.
pub const KECCAK256_ADDRESS: Address = address!("0x000000000000000000000000000000000000100a");

/// Failure of a precompiled contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrecompiledError {
    /// The input could not be processed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Contract implemented natively instead of being interpreted.
pub trait Precompiled: Send + Sync + fmt::Debug {
    /// Gas charged for `input`.
    fn gas_cost(&self, input: &[u8]) -> u64;

    /// Run the contract.
    fn execute(&self, input: &Bytes) -> Result<Bytes, PrecompiledError>;
}

/// Dispatch table from address to precompiled contract.
#[derive(Clone, Debug, Default)]
pub struct PrecompiledRegistry {
    contracts: HashMap<Address, Arc<dyn Precompiled>>,
}

impl PrecompiledRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in contracts.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(IDENTITY_ADDRESS, Arc::new(Identity));
        registry.register(KECCAK256_ADDRESS, Arc::new(Keccak256Hash));
        registry
    }

    /// Register `contract` at `address`, replacing any previous one.
    pub fn register(&mut self, address: Address, contract: Arc<dyn Precompiled>) {
        self.contracts.insert(address, contract);
    }

    /// Contract registered at `address`.
    pub fn get(&self, address: &Address) -> Option<Arc<dyn Precompiled>> {
        self.contracts.get(address).cloned()
    }

    /// Returns `true` if `address` is a precompiled contract.
    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }
}

const fn words(len: usize) -> u64 {
    len.div_ceil(32) as u64
}

/// Returns the input unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Precompiled for Identity {
    fn gas_cost(&self, input: &[u8]) -> u64 {
        15 + 3 * words(input.len())
    }

    fn execute(&self, input: &Bytes) -> Result<Bytes, PrecompiledError> {
        Ok(input.clone())
    }
}

/// Returns the keccak256 hash of the input.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak256Hash;

impl Precompiled for Keccak256Hash {
    fn gas_cost(&self, input: &[u8]) -> u64 {
        30 + 6 * words(input.len())
    }

    fn execute(&self, input: &Bytes) -> Result<Bytes, PrecompiledError> {
        if input.is_empty() {
            return Err(PrecompiledError::InvalidInput("empty input".to_string()))
        }
        Ok(Bytes::copy_from_slice(keccak256(input).as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::bytes;

    #[test]
    fn builtins() {
        let registry = PrecompiledRegistry::with_builtins();
        assert!(registry.contains(&IDENTITY_ADDRESS));
        assert!(!registry.contains(&Address::ZERO));

        let identity = registry.get(&IDENTITY_ADDRESS).unwrap();
        assert_eq!(identity.execute(&bytes!("cafe")).unwrap(), bytes!("cafe"));
        assert_eq!(identity.gas_cost(&[0; 33]), 21);

        let hash = registry.get(&KECCAK256_ADDRESS).unwrap();
        assert_eq!(hash.execute(&bytes!("cafe")).unwrap().len(), 32);
        assert!(hash.execute(&Bytes::new()).is_err());
    }
}
