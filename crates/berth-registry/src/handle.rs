//! Registry actor.
//!
//! The [`Registry`] is owned by a single task; every operation is a
//! command sent over a bounded mailbox and answered on a oneshot channel.
//! Commands run one at a time, so no caller ever observes a half-updated
//! container list.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use berth_state::{ApplicationName, ApplicationSnapshot, ContainerId, ContainerRecord};

use crate::application::{ApplicationConfig, ContainerSpec};
use crate::error::{RegistryError, RegistryResult};
use crate::message::ClusterMessage;
use crate::registry::{
    BootstrapReport, DeployOutcome, ReconcileOutcome, RedeployReport, Registry,
};

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Bootstrap {
        reply: Reply<RegistryResult<BootstrapReport>>,
    },
    Add {
        config: ApplicationConfig,
        reply: Reply<RegistryResult<ApplicationSnapshot>>,
    },
    Deploy {
        application: ApplicationName,
        spec: ContainerSpec,
        reply: Reply<RegistryResult<DeployOutcome>>,
    },
    RedeployAll {
        application: ApplicationName,
        reply: Reply<RegistryResult<RedeployReport>>,
    },
    RemoveContainer {
        application: ApplicationName,
        container_id: ContainerId,
        reply: Reply<RegistryResult<Option<ContainerId>>>,
    },
    RemoveApplication {
        application: ApplicationName,
        reply: Reply<RegistryResult<Vec<ContainerId>>>,
    },
    Reconcile {
        application: ApplicationName,
        reported: Vec<ContainerRecord>,
        reply: Reply<RegistryResult<ReconcileOutcome>>,
    },
    Deliver {
        message: ClusterMessage,
        reply: Reply<RegistryResult<()>>,
    },
    Sync {
        reply: Reply<RegistryResult<()>>,
    },
    Snapshot {
        reply: Reply<RegistryResult<()>>,
    },
    Get {
        application: ApplicationName,
        reply: Reply<Option<ApplicationSnapshot>>,
    },
    Serialize {
        reply: Reply<BTreeMap<ApplicationName, ApplicationSnapshot>>,
    },
    ClusterId {
        reply: Reply<Option<String>>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Bootstrap { .. } => "bootstrap",
            Self::Add { .. } => "add",
            Self::Deploy { .. } => "deploy",
            Self::RedeployAll { .. } => "redeploy_all",
            Self::RemoveContainer { .. } => "remove_container",
            Self::RemoveApplication { .. } => "remove_application",
            Self::Reconcile { .. } => "reconcile",
            Self::Deliver { .. } => "deliver",
            Self::Sync { .. } => "sync",
            Self::Snapshot { .. } => "snapshot",
            Self::Get { .. } => "get",
            Self::Serialize { .. } => "serialize",
            Self::ClusterId { .. } => "cluster_id",
        }
    }
}

/// Cloneable handle to a running registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Command>,
}

/// Move `registry` onto its own task.
///
/// The actor stops once every handle is dropped.
pub fn spawn(registry: Registry) -> (RegistryHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(registry.config().mailbox_size.max(1));
    let task = tokio::spawn(run(registry, rx));
    (RegistryHandle { tx }, task)
}

async fn run(mut registry: Registry, mut rx: mpsc::Receiver<Command>) {
    info!(host_id = %registry.config().host_id, "registry actor started");
    while let Some(command) = rx.recv().await {
        debug!(command = command.name(), "registry command");
        execute(&mut registry, command).await;
    }
    info!("registry actor stopped");
}

// A dropped reply receiver only means the caller stopped waiting.
async fn execute(registry: &mut Registry, command: Command) {
    match command {
        Command::Bootstrap { reply } => {
            let _ = reply.send(registry.bootstrap().await);
        }
        Command::Add { config, reply } => {
            let result = registry.add(config).await.map(|app| app.serialize());
            let _ = reply.send(result);
        }
        Command::Deploy {
            application,
            spec,
            reply,
        } => {
            let _ = reply.send(registry.deploy(&application, spec).await);
        }
        Command::RedeployAll { application, reply } => {
            let _ = reply.send(registry.redeploy_all(&application).await);
        }
        Command::RemoveContainer {
            application,
            container_id,
            reply,
        } => {
            let _ = reply.send(registry.remove_container(&application, &container_id).await);
        }
        Command::RemoveApplication { application, reply } => {
            let _ = reply.send(registry.remove_application(&application).await);
        }
        Command::Reconcile {
            application,
            reported,
            reply,
        } => {
            let _ = reply.send(registry.reconcile(&application, reported));
        }
        Command::Deliver { message, reply } => {
            let _ = reply.send(registry.handle_message(message));
        }
        Command::Sync { reply } => {
            let _ = reply.send(registry.sync());
        }
        Command::Snapshot { reply } => {
            let _ = reply.send(registry.snapshot());
        }
        Command::Get { application, reply } => {
            let _ = reply.send(registry.application(&application).map(|app| app.serialize()));
        }
        Command::Serialize { reply } => {
            let _ = reply.send(registry.serialize());
        }
        Command::ClusterId { reply } => {
            let _ = reply.send(registry.cluster_id().map(str::to_string));
        }
    }
}

impl RegistryHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> RegistryResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| RegistryError::ActorStopped)?;
        rx.await.map_err(|_| RegistryError::ActorStopped)
    }

    pub async fn bootstrap(&self) -> RegistryResult<BootstrapReport> {
        self.request(|reply| Command::Bootstrap { reply }).await?
    }

    /// Create or update an application; returns its serialized record.
    pub async fn add(&self, config: ApplicationConfig) -> RegistryResult<ApplicationSnapshot> {
        self.request(|reply| Command::Add { config, reply }).await?
    }

    pub async fn deploy(
        &self,
        application: impl Into<ApplicationName>,
        spec: ContainerSpec,
    ) -> RegistryResult<DeployOutcome> {
        let application = application.into();
        self.request(|reply| Command::Deploy {
            application,
            spec,
            reply,
        })
        .await?
    }

    pub async fn redeploy_all(
        &self,
        application: impl Into<ApplicationName>,
    ) -> RegistryResult<RedeployReport> {
        let application = application.into();
        self.request(|reply| Command::RedeployAll { application, reply })
            .await?
    }

    pub async fn remove_container(
        &self,
        application: impl Into<ApplicationName>,
        container_id: impl Into<ContainerId>,
    ) -> RegistryResult<Option<ContainerId>> {
        let application = application.into();
        let container_id = container_id.into();
        self.request(|reply| Command::RemoveContainer {
            application,
            container_id,
            reply,
        })
        .await?
    }

    pub async fn remove_application(
        &self,
        application: impl Into<ApplicationName>,
    ) -> RegistryResult<Vec<ContainerId>> {
        let application = application.into();
        self.request(|reply| Command::RemoveApplication { application, reply })
            .await?
    }

    pub async fn reconcile(
        &self,
        application: impl Into<ApplicationName>,
        reported: Vec<ContainerRecord>,
    ) -> RegistryResult<ReconcileOutcome> {
        let application = application.into();
        self.request(|reply| Command::Reconcile {
            application,
            reported,
            reply,
        })
        .await?
    }

    /// Hand an inbound cluster message to the registry.
    pub async fn deliver(&self, message: ClusterMessage) -> RegistryResult<()> {
        self.request(|reply| Command::Deliver { message, reply })
            .await?
    }

    pub async fn sync(&self) -> RegistryResult<()> {
        self.request(|reply| Command::Sync { reply }).await?
    }

    pub async fn snapshot(&self) -> RegistryResult<()> {
        self.request(|reply| Command::Snapshot { reply }).await?
    }

    pub async fn get(
        &self,
        application: impl Into<ApplicationName>,
    ) -> RegistryResult<Option<ApplicationSnapshot>> {
        let application = application.into();
        self.request(|reply| Command::Get { application, reply })
            .await
    }

    pub async fn serialize(
        &self,
    ) -> RegistryResult<BTreeMap<ApplicationName, ApplicationSnapshot>> {
        self.request(|reply| Command::Serialize { reply }).await
    }

    pub async fn cluster_id(&self) -> RegistryResult<Option<String>> {
        self.request(|reply| Command::ClusterId { reply }).await
    }
}

/// Broadcast and persist the registry every `interval` until shutdown.
///
/// The first sync happens one full interval after start. Failed syncs are
/// logged and retried on the next tick.
pub async fn run_sync_loop(
    handle: RegistryHandle,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match handle.sync().await {
                    Ok(()) => debug!("periodic sync complete"),
                    Err(RegistryError::ActorStopped) => {
                        warn!("registry actor gone, stopping sync loop");
                        break;
                    }
                    Err(e) => warn!(error = %e, "periodic sync failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("sync loop stopped");
}
