//! Selector script engine configuration.

use crate::scripting::DEFAULT_MAX_OPERATIONS;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptingConfig {
    /// Operation budget for a single selector evaluation
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
}

fn default_max_operations() -> u64 {
    DEFAULT_MAX_OPERATIONS
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
        }
    }
}
