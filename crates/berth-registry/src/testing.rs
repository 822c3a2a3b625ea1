//! In-process fakes for the registry's collaborators.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use berth_state::{ContainerId, ContainerRecord, HostId, HostInfo, HostMode, SnapshotStore};

use crate::application::ContainerSpec;
use crate::cluster::{
    ClusterTransport, HostRegistry, IdGenerator, LeaderFuture, Placement, SchedulerLeader,
};
use crate::config::RegistryConfig;
use crate::error::TransportError;
use crate::message::ClusterMessage;
use crate::registry::{Collaborators, Registry};

pub fn host(id: &str) -> HostInfo {
    HostInfo {
        id: id.to_string(),
        host_name: format!("{id}.cluster.local"),
        address: "10.0.0.1".to_string(),
        port: 2666,
        mode: HostMode::Follower,
        labels: BTreeMap::new(),
        last_heartbeat: 1000,
    }
}

/// A container as a host would report it.
pub fn running(id: &str, host: &str, host_port: u16) -> ContainerRecord {
    let mut container = ContainerRecord::unloaded(id);
    container.host = Some(host.to_string());
    container.host_port = Some(host_port);
    container.container_port = Some(80);
    container.start_time = Some(1_700_000_000_000);
    container
}

/// Scheduler leader answering from a script.
///
/// Placements are popped in order; once the script is empty every request
/// is answered with "no capacity". Releases only succeed for containers
/// registered with [`FakeLeader::track`].
#[derive(Default)]
pub struct FakeLeader {
    placements: Mutex<VecDeque<Placement>>,
    tracked: Mutex<HashMap<(String, ContainerId), ContainerRecord>>,
    requests: Mutex<Vec<ContainerSpec>>,
    next_port: AtomicU16,
    no_ports: AtomicBool,
}

impl FakeLeader {
    pub fn new() -> Self {
        Self {
            next_port: AtomicU16::new(11000),
            ..Self::default()
        }
    }

    pub fn push_placement(&self, placement: Placement) {
        self.placements.lock().unwrap().push_back(placement);
    }

    pub fn place_on(&self, host_id: &str, host_port: u16) {
        self.push_placement(Placement::on(host(host_id), Some(host_port)));
    }

    pub fn track(&self, application: &str, container: ContainerRecord) {
        self.tracked
            .lock()
            .unwrap()
            .insert((application.to_string(), container.id.clone()), container);
    }

    pub fn exhaust_ports(&self) {
        self.no_ports.store(true, Ordering::SeqCst);
    }

    /// Every placement request seen so far.
    pub fn requests(&self) -> Vec<ContainerSpec> {
        self.requests.lock().unwrap().clone()
    }
}

impl SchedulerLeader for FakeLeader {
    fn discovery_port(&self, _application_port: Option<u16>) -> LeaderFuture<'_, Option<u16>> {
        let port = if self.no_ports.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.next_port.fetch_add(1, Ordering::SeqCst))
        };
        Box::pin(async move { port })
    }

    fn place_container<'a>(
        &'a self,
        _application: &'a str,
        spec: &'a ContainerSpec,
    ) -> LeaderFuture<'a, Placement> {
        self.requests.lock().unwrap().push(spec.clone());
        let placement = self
            .placements
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Placement::unplaced(spec.host_port));
        Box::pin(async move { placement })
    }

    fn release_container<'a>(
        &'a self,
        application: &'a str,
        container_id: &'a str,
    ) -> LeaderFuture<'a, Option<ContainerRecord>> {
        let released = self
            .tracked
            .lock()
            .unwrap()
            .remove(&(application.to_string(), container_id.to_string()));
        Box::pin(async move { released })
    }
}

/// Transport that records every message instead of delivering it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Option<HostId>, ClusterMessage)>>,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// `(target, message)` pairs; broadcasts have no target.
    pub fn sent(&self) -> Vec<(Option<HostId>, ClusterMessage)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// `(host, container id)` for every unload issued.
    pub fn unloads(&self) -> Vec<(HostId, ContainerId)> {
        self.sent()
            .into_iter()
            .filter_map(|(target, message)| match message {
                ClusterMessage::ContainerUnload { container, .. } => {
                    Some((target.unwrap_or_default(), container.id))
                }
                _ => None,
            })
            .collect()
    }

    /// `(host, container)` for every load issued.
    pub fn loads(&self) -> Vec<(HostId, ContainerRecord)> {
        self.sent()
            .into_iter()
            .filter_map(|(target, message)| match message {
                ClusterMessage::ContainerLoad { container, .. } => {
                    Some((target.unwrap_or_default(), container))
                }
                _ => None,
            })
            .collect()
    }

    pub fn broadcasts(&self) -> Vec<ClusterMessage> {
        self.sent()
            .into_iter()
            .filter_map(|(target, message)| target.is_none().then_some(message))
            .collect()
    }
}

impl ClusterTransport for RecordingTransport {
    fn send(&self, message: ClusterMessage, target: &HostInfo) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent
            .lock()
            .unwrap()
            .push((Some(target.id.clone()), message));
        Ok(())
    }

    fn broadcast(&self, message: ClusterMessage) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().unwrap().push((None, message));
        Ok(())
    }
}

/// Fixed host inventory.
pub struct StaticHosts(pub Vec<HostInfo>);

impl HostRegistry for StaticHosts {
    fn get_host(&self, host_id: &str) -> anyhow::Result<Option<HostInfo>> {
        Ok(self.0.iter().find(|h| h.id == host_id).cloned())
    }

    fn all_hosts(&self) -> anyhow::Result<Vec<HostInfo>> {
        Ok(self.0.clone())
    }
}

pub struct FixedId(pub &'static str);

impl IdGenerator for FixedId {
    fn new_id(&self, _byte_length: usize) -> String {
        self.0.to_string()
    }
}

/// A registry running as host `leader` in a cluster of `leader`, `h1`, `h2`, `h3`.
pub struct Harness {
    pub registry: Registry,
    pub leader: Arc<FakeLeader>,
    pub transport: Arc<RecordingTransport>,
    pub store: SnapshotStore,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(SnapshotStore::open_in_memory().unwrap())
    }

    pub fn with_store(store: SnapshotStore) -> Self {
        let leader = Arc::new(FakeLeader::new());
        let transport = Arc::new(RecordingTransport::default());
        let hosts = StaticHosts(vec![host("leader"), host("h1"), host("h2"), host("h3")]);
        let registry = Registry::new(
            RegistryConfig::new("leader"),
            store.clone(),
            Collaborators {
                leader: leader.clone(),
                transport: transport.clone(),
                hosts: Arc::new(hosts),
                ids: Arc::new(FixedId("cluster-0001")),
            },
        );
        Self {
            registry,
            leader,
            transport,
            store,
        }
    }
}
