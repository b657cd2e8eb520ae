//! Listener tuning loaded from JSON. Every field has a default, so an
//! empty object (or no file at all) yields the stock behavior.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Pause required between wake phrase and command.
    pub min_post_trigger_gap_ms: u64,
    /// Delay before restarting a failed recognition stream.
    pub restart_backoff_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            min_post_trigger_gap_ms: 450,
            restart_backoff_ms: 700,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ListenerConfig {
    /// Load config from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn min_post_trigger_gap(&self) -> Duration {
        Duration::from_millis(self.min_post_trigger_gap_ms)
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }
}
