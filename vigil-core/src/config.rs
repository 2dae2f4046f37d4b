//! Configuration
//!
//! Knobs for the engine and the reference update queue. Both structs
//! deserialize with defaults for every missing field, so a partial JSON
//! document is enough:
//!
//! ```rust
//! use vigil_core::config::EngineConfig;
//!
//! let config: EngineConfig = serde_json::from_str(r#"{ "sweep_interval": 16 }"#).unwrap();
//! assert_eq!(config.sweep_interval, 16);
//! ```

use serde::{Deserialize, Serialize};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sweep the observer registry for dropped containers after this many
    /// new observers have been created. Zero disables automatic sweeps.
    pub sweep_interval: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { sweep_interval: 256 }
    }
}

/// Settings for [`UpdateQueue`](crate::scheduler::UpdateQueue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How many times a single watcher may run during one flush before the
    /// queue reports a circular update.
    pub max_update_count: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_update_count: 100,
        }
    }
}
