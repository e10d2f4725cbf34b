//! Transaction executor.
//!
//! Every transaction runs as a [`TransactionSteps`] state machine advancing through prepare,
//! execute and finalize. [`StepDriver`] interleaves the steps of several lanes of transactions on
//! one thread.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// Executor error types.
pub mod errors;
pub use errors::ExecutorError;

mod config;
pub use config::ExecutorConfig;

mod metrics;

mod steps;
pub use steps::{BlockEnv, Step, TransactionSteps};

mod executor;
pub use executor::TransactionExecutor;

mod driver;
pub use driver::{DriverOutput, StepDriver};
