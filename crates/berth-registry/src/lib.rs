//! berth-registry — the application registry at the heart of Berth.
//!
//! Owns the map of application name to application record and keeps it
//! converged with what hosts actually run:
//!
//! - **Bootstrap**: restores the persisted snapshot, forces every container
//!   to `unloaded`, and asks peers to report their running containers.
//! - **Reconciliation**: claims reported containers and unloads duplicates
//!   and strays so at most one host owns a container id.
//! - **Deployment**: asks the scheduler leader for a placement and pushes
//!   load commands with the `CS_*` runtime environment.
//! - **Sync**: broadcasts the registry and persists it.
//!
//! The [`Registry`] is a plain owned aggregate; [`handle::spawn`] moves it
//! onto a task and hands back a cloneable [`RegistryHandle`].

pub mod application;
pub mod cluster;
pub mod config;
pub mod env;
pub mod error;
pub mod handle;
pub mod message;
pub mod registry;

#[cfg(test)]
mod testing;

pub use application::{Application, ApplicationConfig, ContainerSpec};
pub use cluster::{
    ClusterTransport, HostRegistry, IdGenerator, LeaderFuture, Placement, RandomIdGenerator,
    SchedulerLeader,
};
pub use config::RegistryConfig;
pub use error::{RegistryError, RegistryResult, TransportError};
pub use handle::{RegistryHandle, run_sync_loop, spawn};
pub use message::ClusterMessage;
pub use registry::{
    BootstrapReport, Collaborators, DeployOutcome, ReconcileOutcome, RedeployReport, Registry,
};
