//! Cluster messages exchanged between the registry and hosts.
//!
//! Messages are fire-and-forget: issuing one through the transport says
//! nothing about whether the target has received or applied it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use berth_state::{
    ApplicationName, ApplicationSnapshot, ContainerId, ContainerRecord, ContainerStatus, HostId,
};

/// A message carried by the cluster transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClusterMessage {
    /// Ask a host to report the containers it is running.
    #[serde(rename = "applications.reconcile")]
    ReconcileRequest { requester: HostId },

    /// Push the cluster identity to a host.
    #[serde(rename = "cluster.state")]
    ClusterState { id: String },

    /// Start a container on the target host.
    #[serde(rename = "container.load")]
    ContainerLoad {
        application: ApplicationName,
        container: ContainerRecord,
    },

    /// Stop a container on the target host.
    #[serde(rename = "container.unload")]
    ContainerUnload {
        application: ApplicationName,
        container: ContainerRecord,
    },

    /// Full registry broadcast.
    #[serde(rename = "applications.sync")]
    ApplicationsSync {
        applications: BTreeMap<ApplicationName, ApplicationSnapshot>,
    },

    /// A host's answer to [`ClusterMessage::ReconcileRequest`].
    #[serde(rename = "applications.report")]
    ContainersReport {
        host: HostId,
        applications: BTreeMap<ApplicationName, Vec<ContainerRecord>>,
    },

    /// A host confirming (or abandoning) a container it was told to load.
    #[serde(rename = "container.status")]
    ContainerStatusChanged {
        application: ApplicationName,
        container_id: ContainerId,
        status: ContainerStatus,
        host: HostId,
    },
}

impl ClusterMessage {
    /// Wire name of this message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReconcileRequest { .. } => "applications.reconcile",
            Self::ClusterState { .. } => "cluster.state",
            Self::ContainerLoad { .. } => "container.load",
            Self::ContainerUnload { .. } => "container.unload",
            Self::ApplicationsSync { .. } => "applications.sync",
            Self::ContainersReport { .. } => "applications.report",
            Self::ContainerStatusChanged { .. } => "container.status",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_wire_tag() {
        let messages = vec![
            ClusterMessage::ClusterState {
                id: "abc".to_string(),
            },
            ClusterMessage::ContainerUnload {
                application: "web".to_string(),
                container: ContainerRecord::unloaded("c-1"),
            },
            ClusterMessage::ApplicationsSync {
                applications: BTreeMap::new(),
            },
            ClusterMessage::ContainerStatusChanged {
                application: "web".to_string(),
                container_id: "c-1".to_string(),
                status: ContainerStatus::Loaded,
                host: "h1".to_string(),
            },
        ];

        for message in messages {
            let value: serde_json::Value =
                serde_json::from_str(&message.to_json().unwrap()).unwrap();
            assert_eq!(value["type"], message.kind());
            assert!(value.get("payload").is_some());
        }
    }

    #[test]
    fn parses_host_report() {
        let raw = r#"{
            "type": "applications.report",
            "payload": {
                "host": "h2",
                "applications": {
                    "web": [{"id": "c-1", "host": "h2", "host_port": 9000, "status": "loaded"}]
                }
            }
        }"#;

        let message = ClusterMessage::from_json(raw).unwrap();
        let ClusterMessage::ContainersReport { host, applications } = message else {
            panic!("expected a containers report");
        };
        assert_eq!(host, "h2");
        assert_eq!(applications["web"][0].host_port, Some(9000));
    }
}
