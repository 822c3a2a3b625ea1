//! Registry configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a registry instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Identity of the host running this registry. Excluded from bootstrap fan-out.
    pub host_id: String,
    /// Byte length of a freshly generated cluster id.
    pub cluster_id_bytes: usize,
    /// Interval between periodic syncs.
    pub sync_interval_secs: u64,
    /// Capacity of the registry actor's command channel.
    pub mailbox_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host_id: "local".to_string(),
            cluster_id_bytes: 16,
            sync_interval_secs: 15,
            mailbox_size: 256,
        }
    }
}

impl RegistryConfig {
    pub fn new(host_id: impl Into<String>) -> Self {
        Self {
            host_id: host_id.into(),
            ..Self::default()
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
