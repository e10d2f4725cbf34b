use serde::{Deserialize, Serialize};
use txflow_vm::{HostConfig, DEFAULT_MAX_CALL_DEPTH};

/// Transaction executor configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Maximum nesting depth of calls.
    pub max_call_depth: u32,
}

impl ExecutorConfig {
    /// Host context configuration derived from this config.
    pub const fn host_config(&self) -> HostConfig {
        HostConfig { max_call_depth: self.max_call_depth }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }
}
