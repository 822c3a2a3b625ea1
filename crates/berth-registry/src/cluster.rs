//! Collaborator contracts consumed by the registry.
//!
//! The registry never talks to the network, the scheduler, or the host
//! inventory directly. It goes through these traits so the gossip layer,
//! the elected scheduler leader, and the host store can be swapped (or
//! faked in tests) without touching reconciliation logic.

use std::future::Future;
use std::pin::Pin;

use rand::RngCore;

use berth_state::{ContainerRecord, HostInfo};

use crate::application::ContainerSpec;
use crate::error::TransportError;
use crate::message::ClusterMessage;

/// Boxed future alias for scheduler leader queries.
pub type LeaderFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A placement decision returned by the scheduler leader.
///
/// `host` is `None` when no host currently has capacity; `host_port` is
/// reported either way so the registry can tell whether the port was
/// requested or assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub host: Option<HostInfo>,
    pub host_port: Option<u16>,
}

impl Placement {
    pub fn on(host: HostInfo, host_port: Option<u16>) -> Self {
        Self {
            host: Some(host),
            host_port,
        }
    }

    pub fn unplaced(host_port: Option<u16>) -> Self {
        Self {
            host: None,
            host_port,
        }
    }
}

/// The elected scheduler leader.
///
/// Every call is a suspension point for the registry; implementations
/// may be remote and slow.
pub trait SchedulerLeader: Send + Sync {
    /// Allocate a load-balancer port for a new application.
    fn discovery_port(&self, application_port: Option<u16>) -> LeaderFuture<'_, Option<u16>>;

    /// Decide where a container should run.
    fn place_container<'a>(
        &'a self,
        application: &'a str,
        spec: &'a ContainerSpec,
    ) -> LeaderFuture<'a, Placement>;

    /// Drop the leader's bookkeeping for a container.
    ///
    /// Returns the leader's view of the container, or `None` when it has
    /// no record of it.
    fn release_container<'a>(
        &'a self,
        application: &'a str,
        container_id: &'a str,
    ) -> LeaderFuture<'a, Option<ContainerRecord>>;
}

/// At-most-once, unacknowledged cluster messaging.
///
/// A successful return only means the message was handed off.
pub trait ClusterTransport: Send + Sync {
    fn send(&self, message: ClusterMessage, target: &HostInfo) -> Result<(), TransportError>;

    fn broadcast(&self, message: ClusterMessage) -> Result<(), TransportError>;
}

/// The host inventory.
pub trait HostRegistry: Send + Sync {
    fn get_host(&self, host_id: &str) -> anyhow::Result<Option<HostInfo>>;

    /// Every live host, including the caller's own.
    fn all_hosts(&self) -> anyhow::Result<Vec<HostInfo>>;
}

/// Cluster identity generator.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self, byte_length: usize) -> String;
}

/// Hex-encoded random bytes from the thread-local CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_id(&self, byte_length: usize) -> String {
        let mut bytes = vec![0u8; byte_length];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
