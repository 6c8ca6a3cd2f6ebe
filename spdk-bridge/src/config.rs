//! Bridge configuration types
//!
//! The bridge itself has very little to configure: how the `log` crate adapter
//! filters records, and how large a loopback channel's slot pool is. Buffer
//! capacities are compile-time parameters of the trampoline and live there.

use crate::types::{BridgeError, LogLevel, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the bridge library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Most verbose level the `log` adapter forwards to the engine logger
    #[serde(default = "default_level")]
    pub max_level: LogLevel,

    /// Only forward records whose target is one of these modules (or a
    /// submodule of one). Empty means forward everything.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Number of request slots in each loopback channel's pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_level() -> LogLevel {
    LogLevel::Notice
}

fn default_pool_size() -> usize {
    32
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_level: default_level(),
            modules: Vec::new(),
            pool_size: default_pool_size(),
        }
    }
}

impl BridgeConfig {
    /// Create a new bridge configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the most verbose level forwarded by the adapter
    pub fn with_max_level(mut self, level: LogLevel) -> Self {
        self.max_level = level;
        self
    }

    /// Builder method: add a module to the adapter's allow-list
    pub fn add_module(mut self, module: impl Into<String>) -> Self {
        self.modules.push(module.into());
        self
    }

    /// Builder method: set the loopback channel pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Validate settings that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(BridgeError::Config(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if let Some(bad) = self.modules.iter().find(|m| m.is_empty()) {
            return Err(BridgeError::Config(format!(
                "empty module name in allow-list: {:?}",
                bad
            )));
        }
        Ok(())
    }
}
