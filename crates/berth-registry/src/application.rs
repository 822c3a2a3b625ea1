//! Application records and container placement requests.
//!
//! An [`Application`] owns an ordered list of container records keyed by
//! container id. It is the only place containers are stored; the registry
//! mutates them exclusively through the methods here.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use berth_state::{ApplicationSnapshot, ContainerId, ContainerRecord, HostId};

/// Operator-supplied application definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    pub id: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub cpus: Option<f64>,
    /// Memory limit in megabytes.
    #[serde(default)]
    pub memory: Option<u64>,
    /// Default port exposed inside each container.
    #[serde(default)]
    pub container_port: Option<u16>,
    /// Defaults for every container's environment.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

impl ApplicationConfig {
    pub fn new(id: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            id: id.into(),
            port,
            ..Self::default()
        }
    }
}

/// A request to place a container.
///
/// `id` is absent for containers that do not exist yet. `host` is a
/// preference passed to the scheduler, not a guarantee.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    #[serde(default)]
    pub id: Option<ContainerId>,
    #[serde(default)]
    pub host: Option<HostId>,
    #[serde(default)]
    pub host_port: Option<u16>,
    #[serde(default)]
    pub container_port: Option<u16>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// A brand-new container with a host preference only.
    pub fn prefer_host(host: Option<HostId>) -> Self {
        Self {
            host,
            ..Self::default()
        }
    }
}

impl From<&ContainerRecord> for ContainerSpec {
    /// Re-placement request for an existing container.
    ///
    /// A scheduler-assigned port is not carried over once the container has
    /// been loaded; a container never loaded still holds the requested port.
    fn from(record: &ContainerRecord) -> Self {
        let requested = !record.random_host_port || record.start_time.is_none();
        Self {
            id: Some(record.id.clone()),
            host: record.host.clone(),
            host_port: requested.then_some(record.host_port).flatten(),
            container_port: record.container_port,
            env_vars: record.env_vars.clone(),
        }
    }
}

/// One application and its containers.
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    config: ApplicationConfig,
    discovery_port: u16,
    containers: Vec<ContainerRecord>,
}

impl Application {
    pub fn new(config: ApplicationConfig, discovery_port: u16) -> Self {
        Self {
            config,
            discovery_port,
            containers: Vec::new(),
        }
    }

    /// Rebuild an application from its serialized form.
    pub fn from_snapshot(snapshot: ApplicationSnapshot) -> Self {
        let config = ApplicationConfig {
            id: snapshot.id,
            port: snapshot.port,
            image: snapshot.image,
            command: snapshot.command,
            cpus: snapshot.cpus,
            memory: snapshot.memory,
            container_port: snapshot.container_port,
            env_vars: snapshot.env_vars,
        };
        let mut application = Self::new(config, snapshot.discovery_port);
        application.replace_containers(snapshot.containers);
        application
    }

    pub fn name(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn discovery_port(&self) -> u16 {
        self.discovery_port
    }

    /// Apply a new definition. The name, discovery port and containers are kept.
    pub fn update(&mut self, config: ApplicationConfig) {
        let id = std::mem::take(&mut self.config.id);
        self.config = ApplicationConfig { id, ..config };
    }

    pub fn containers(&self) -> &[ContainerRecord] {
        &self.containers
    }

    pub fn container(&self, id: &str) -> Option<&ContainerRecord> {
        self.containers.iter().find(|c| c.id == id)
    }

    pub(crate) fn container_mut(&mut self, id: &str) -> Option<&mut ContainerRecord> {
        self.containers.iter_mut().find(|c| c.id == id)
    }

    /// Insert a container, replacing any existing record with the same id
    /// in place.
    pub fn add_container(&mut self, container: ContainerRecord) -> &ContainerRecord {
        let index = match self.containers.iter().position(|c| c.id == container.id) {
            Some(index) => {
                self.containers[index] = container;
                index
            }
            None => {
                self.containers.push(container);
                self.containers.len() - 1
            }
        };
        &self.containers[index]
    }

    pub fn remove_container(&mut self, id: &str) -> Option<ContainerRecord> {
        let index = self.containers.iter().position(|c| c.id == id)?;
        Some(self.containers.remove(index))
    }

    /// Replace the whole container list. Later records with an id already
    /// seen, or with an empty id, are dropped.
    pub fn replace_containers(&mut self, containers: Vec<ContainerRecord>) {
        let mut seen = HashSet::new();
        self.containers = containers
            .into_iter()
            .filter(|c| !c.id.is_empty() && seen.insert(c.id.clone()))
            .collect();
    }

    /// Force every container to `Unloaded`.
    pub fn unload_containers(&mut self) {
        for container in &mut self.containers {
            container.unload();
        }
    }

    pub fn serialize(&self) -> ApplicationSnapshot {
        ApplicationSnapshot {
            id: self.config.id.clone(),
            port: self.config.port,
            discovery_port: self.discovery_port,
            image: self.config.image.clone(),
            command: self.config.command.clone(),
            cpus: self.config.cpus,
            memory: self.config.memory,
            container_port: self.config.container_port,
            env_vars: self.config.env_vars.clone(),
            containers: self.containers.clone(),
        }
    }

    /// Allocate an id for a container that does not have one yet.
    pub fn new_container_id() -> ContainerId {
        uuid::Uuid::new_v4().to_string()
    }
}
