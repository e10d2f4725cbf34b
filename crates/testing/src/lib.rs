//! Txflow test utilities.
//!
//! [`ScriptInterpreter`] runs a tiny deterministic instruction set so tests and the CLI can
//! execute real transactions without a bytecode VM. [`Script`] assembles programs for it.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod script;
pub use script::{Instruction, Script, ScriptInterpreter};

mod storage;
pub use storage::FaultyStorage;

/// Block and state fixtures.
pub mod fixtures;
pub use fixtures::Fixture;
