//! Block execution over JSON fixtures.

/// Txflow CLI arguments.
pub mod cli;

/// Fixture execution.
pub mod launch;
