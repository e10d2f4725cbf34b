//! Core types shared by the txflow execution stack.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod version;
pub use version::*;

mod transaction;
pub use transaction::Transaction;

mod block;
pub use block::{Block, BlockHeader};

mod ledger;
pub use ledger::{LedgerConfig, DEFAULT_TX_GAS_LIMIT};

/// Receipts and the receipt factory.
pub mod receipt;
pub use receipt::{DefaultReceiptFactory, Receipt, ReceiptFactory, ReceiptStatus};

pub use alloy_primitives::{Address, BlockNumber, Bytes, Log, B256};
