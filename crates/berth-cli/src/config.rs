use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use berth_registry::RegistryConfig;
use berth_state::SnapshotStore;

const STORE_FILE: &str = "berth.redb";

/// Configuration file for the `berth` binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BerthConfig {
    pub data_dir: PathBuf,
    pub registry: RegistryConfig,
}

impl Default for BerthConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/berth"),
            registry: RegistryConfig::default(),
        }
    }
}

impl BerthConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    /// Open the persisted registry state. Never creates a new store.
    pub fn open_store(&self) -> anyhow::Result<SnapshotStore> {
        let path = self.store_path();
        if !path.exists() {
            bail!("no registry state at {}", path.display());
        }
        debug!(path = %path.display(), "opening registry state");
        Ok(SnapshotStore::open(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_registry_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("berth.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/srv/berth"

[registry]
host_id = "leader-1"
sync_interval_secs = 30
"#,
        )
        .unwrap();

        let config = BerthConfig::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/berth"));
        assert_eq!(config.registry.host_id, "leader-1");
        assert_eq!(config.registry.sync_interval_secs, 30);
        assert_eq!(config.registry.mailbox_size, 256);
        assert_eq!(config.store_path(), PathBuf::from("/srv/berth/berth.redb"));
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = BerthConfig {
            data_dir: dir.path().to_path_buf(),
            ..BerthConfig::default()
        };

        assert!(config.open_store().is_err());
        assert!(!config.store_path().exists());
    }
}
