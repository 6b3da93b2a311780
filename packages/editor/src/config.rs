use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "wedge.config.json";

/// When pending triggers are drained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrainPolicy {
    /// Once the edit that scheduled them has completed
    #[default]
    AfterEdit,
    /// Only on an explicit `process_immediately`
    Deferred,
}

/// Change dispatcher configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    #[serde(default)]
    pub drain_policy: DrainPolicy,

    /// Upper bound on trigger cascade rounds in one drain
    #[serde(default = "default_max_drain_rounds")]
    pub max_drain_rounds: usize,

    /// Whether a new dispatcher starts listening right away
    #[serde(default)]
    pub start_listening: bool,
}

fn default_max_drain_rounds() -> usize {
    1000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            drain_policy: DrainPolicy::default(),
            max_drain_rounds: default_max_drain_rounds(),
            start_listening: false,
        }
    }
}

impl DispatcherConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Load config from a directory, falling back to defaults
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let config_path = dir.join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(Self::from_json(&content)?)
        } else {
            Ok(Self::default())
        }
    }
}
