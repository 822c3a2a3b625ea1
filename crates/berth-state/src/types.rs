//! Domain types for the Berth snapshot store.
//!
//! These types describe the registry exactly as it is persisted and
//! broadcast: a mapping of application name to application record, each
//! owning an ordered list of container records. They also carry the host
//! inventory entries used for cluster fan-out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Unique application name (registry key).
pub type ApplicationName = String;

/// Container identifier, unique within its application.
pub type ContainerId = String;

/// Identifier of a cluster host.
pub type HostId = String;

// ── Container ─────────────────────────────────────────────────────

/// Placement status of a container.
///
/// `Unloaded` means desired but not placed, `Loading` means a load command
/// was sent and confirmation is pending, `Loaded` means a host confirmed it
/// is running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    #[default]
    Unloaded,
    Loading,
    Loaded,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
        };
        f.write_str(s)
    }
}

/// Desired and observed state of one container.
///
/// A `Loading` or `Loaded` container always has a `host`; an `Unloaded`
/// one never does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: ContainerId,
    #[serde(default)]
    pub host: Option<HostId>,
    #[serde(default)]
    pub host_port: Option<u16>,
    #[serde(default)]
    pub container_port: Option<u16>,
    /// True when `host_port` was picked by the scheduler rather than requested.
    #[serde(default)]
    pub random_host_port: bool,
    #[serde(default)]
    pub status: ContainerStatus,
    /// Unix timestamp (milliseconds) of the last load command.
    #[serde(default)]
    pub start_time: Option<u64>,
    /// Variables injected into the container's runtime environment.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

impl ContainerRecord {
    /// A fresh, unplaced container.
    pub fn unloaded(id: impl Into<ContainerId>) -> Self {
        Self {
            id: id.into(),
            host: None,
            host_port: None,
            container_port: None,
            random_host_port: false,
            status: ContainerStatus::Unloaded,
            start_time: None,
            env_vars: BTreeMap::new(),
        }
    }

    /// Drop any host ownership and mark the container as not placed.
    pub fn unload(&mut self) {
        self.status = ContainerStatus::Unloaded;
        self.host = None;
    }

    /// Whether the host/status pairing holds.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            ContainerStatus::Unloaded => self.host.is_none(),
            ContainerStatus::Loading | ContainerStatus::Loaded => self.host.is_some(),
        }
    }
}

// ── Application ───────────────────────────────────────────────────

/// Serialized application record (snapshot and broadcast shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSnapshot {
    pub id: ApplicationName,
    /// Service port requested at creation.
    #[serde(default)]
    pub port: Option<u16>,
    /// Load-balancer-facing port, assigned once at creation.
    pub discovery_port: u16,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cpus: Option<f64>,
    /// Memory limit in megabytes.
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub container_port: Option<u16>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub containers: Vec<ContainerRecord>,
}

/// Everything read back from the store at process start.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub applications: BTreeMap<ApplicationName, ApplicationSnapshot>,
}

// ── Host ──────────────────────────────────────────────────────────

/// Role of a host in the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMode {
    Leader,
    #[default]
    Follower,
}

/// Information about a host in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostInfo {
    pub id: HostId,
    pub host_name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub mode: HostMode,
    /// Arbitrary labels (region, zone, ...).
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Unix timestamp of last heartbeat.
    #[serde(default)]
    pub last_heartbeat: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ContainerStatus::Loading).unwrap();
        assert_eq!(json, "\"loading\"");
        assert_eq!(ContainerStatus::Loaded.to_string(), "loaded");
    }

    #[test]
    fn unload_clears_host() {
        let mut container = ContainerRecord::unloaded("c-1");
        container.host = Some("h1".to_string());
        container.status = ContainerStatus::Loaded;
        assert!(container.is_consistent());

        container.unload();
        assert_eq!(container.status, ContainerStatus::Unloaded);
        assert!(container.host.is_none());
        assert!(container.is_consistent());
    }

    #[test]
    fn loading_without_host_is_inconsistent() {
        let mut container = ContainerRecord::unloaded("c-1");
        container.status = ContainerStatus::Loading;
        assert!(!container.is_consistent());
    }

    #[test]
    fn container_defaults_missing_fields() {
        let container: ContainerRecord = serde_json::from_str(r#"{"id":"abc"}"#).unwrap();
        assert_eq!(container, ContainerRecord::unloaded("abc"));
    }

    #[test]
    fn snapshot_without_fields_is_empty() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.cluster_id.is_none());
        assert!(snapshot.applications.is_empty());
    }
}
