//! Execution environment bridging executable code to world state.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// VM error types.
pub mod errors;
pub use errors::VmError;

mod message;
pub use message::{CallKind, ExecResult, ExecStatus, Message};

mod interpreter;
pub use interpreter::Interpreter;

/// Precompiled contracts.
pub mod precompiled;
pub use precompiled::{Precompiled, PrecompiledRegistry};

mod host;
pub use host::{Host, HostConfig, HostContext, BOOTSTRAP_COMMITTEE_ADDRESS, DEFAULT_MAX_CALL_DEPTH};
