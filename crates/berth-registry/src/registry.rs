//! Registry — the authoritative map of applications to containers.
//!
//! The `Registry` is the control loop that:
//! - Restores the persisted snapshot at startup and asks every peer to
//!   report what it is actually running
//! - Reconciles those reports against desired state, unloading duplicates
//! - Drives container placement through the scheduler leader and pushes
//!   load/unload commands to hosts
//! - Broadcasts and persists the registry on sync
//!
//! All methods take `&mut self`; the only suspension points are scheduler
//! leader queries. Transport sends are fire-and-forget and never awaited.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use berth_state::{
    ApplicationName, ApplicationSnapshot, ContainerId, ContainerRecord, ContainerStatus, HostId,
    SnapshotStore,
};

use crate::application::{Application, ApplicationConfig, ContainerSpec};
use crate::cluster::{ClusterTransport, HostRegistry, IdGenerator, SchedulerLeader};
use crate::config::RegistryConfig;
use crate::env;
use crate::error::{RegistryError, RegistryResult};
use crate::message::ClusterMessage;

/// External services the registry talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub leader: Arc<dyn SchedulerLeader>,
    pub transport: Arc<dyn ClusterTransport>,
    pub hosts: Arc<dyn HostRegistry>,
    pub ids: Arc<dyn IdGenerator>,
}

/// What `bootstrap` restored and who it asked for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub cluster_id: String,
    pub restored: Vec<ApplicationName>,
    /// Peers that were sent a reconciliation request. Issuance only.
    pub peers_notified: Vec<HostId>,
}

/// Result of reconciling one host report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Desired containers matched by the report, now `Loaded`.
    pub claimed: Vec<ContainerId>,
    /// Records that already had an owner on another host when claimed.
    pub duplicates: Vec<ContainerRecord>,
    /// Every container an unload was issued for (leftovers and duplicates).
    pub unloaded: Vec<ContainerRecord>,
}

/// Result of a deployment that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// A load command was sent to `host`.
    Loading {
        container_id: ContainerId,
        host: HostId,
    },
    /// No capacity; the container waits as `Unloaded`.
    Pending { container_id: ContainerId },
}

impl DeployOutcome {
    pub fn container_id(&self) -> &str {
        match self {
            Self::Loading { container_id, .. } | Self::Pending { container_id } => container_id,
        }
    }
}

/// Result of `redeploy_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedeployReport {
    /// Containers swapped, as `(original, replacement)`.
    pub replaced: Vec<(ContainerId, ContainerId)>,
    /// Originals the scheduler leader had no record of, as
    /// `(original, replacement)`. Both stay in the registry.
    pub kept: Vec<(ContainerId, ContainerId)>,
}

/// The application registry.
pub struct Registry {
    config: RegistryConfig,
    store: SnapshotStore,
    leader: Arc<dyn SchedulerLeader>,
    transport: Arc<dyn ClusterTransport>,
    hosts: Arc<dyn HostRegistry>,
    ids: Arc<dyn IdGenerator>,
    applications: HashMap<ApplicationName, Application>,
    cluster_id: Option<String>,
}

impl Registry {
    /// Create an empty registry. Call [`Registry::bootstrap`] before use.
    pub fn new(config: RegistryConfig, store: SnapshotStore, collaborators: Collaborators) -> Self {
        Self {
            config,
            store,
            leader: collaborators.leader,
            transport: collaborators.transport,
            hosts: collaborators.hosts,
            ids: collaborators.ids,
            applications: HashMap::new(),
            cluster_id: None,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn cluster_id(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    pub fn application(&self, name: &str) -> Option<&Application> {
        self.applications.get(name)
    }

    pub fn application_names(&self) -> Vec<ApplicationName> {
        let mut names: Vec<_> = self.applications.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn containers(&self, application: &str) -> RegistryResult<&[ContainerRecord]> {
        self.applications
            .get(application)
            .map(Application::containers)
            .ok_or_else(|| RegistryError::ApplicationNotFound(application.to_string()))
    }

    // ── Bootstrap ──────────────────────────────────────────────────

    /// Restore the registry from the persisted snapshot.
    ///
    /// Every restored container is forced to `Unloaded`; hosts re-establish
    /// ownership by answering the reconciliation requests sent here. The
    /// report is returned as soon as those requests are issued.
    pub async fn bootstrap(&mut self) -> RegistryResult<BootstrapReport> {
        let snapshot = self.store.read_snapshot()?;

        let cluster_id = match snapshot.cluster_id {
            Some(id) => id,
            None => {
                let id = self.ids.new_id(self.config.cluster_id_bytes);
                self.store.put_cluster_id(&id)?;
                info!(cluster_id = %id, "generated new cluster id");
                id
            }
        };
        self.cluster_id = Some(cluster_id.clone());

        if snapshot.applications.is_empty() {
            info!(%cluster_id, "no applications in snapshot, starting fresh");
            return Ok(BootstrapReport {
                cluster_id,
                restored: Vec::new(),
                peers_notified: Vec::new(),
            });
        }

        info!(
            applications = snapshot.applications.len(),
            "applications restored from disk snapshot"
        );
        let restored = self.restore(snapshot.applications);
        for application in self.applications.values_mut() {
            application.unload_containers();
        }

        let peers: Vec<_> = self
            .hosts
            .all_hosts()
            .map_err(RegistryError::Hosts)?
            .into_iter()
            .filter(|host| host.id != self.config.host_id)
            .collect();

        let mut peers_notified = Vec::with_capacity(peers.len());
        let mut first_error = None;
        for peer in &peers {
            let request = ClusterMessage::ReconcileRequest {
                requester: self.config.host_id.clone(),
            };
            let identity = ClusterMessage::ClusterState {
                id: cluster_id.clone(),
            };
            let sent = self
                .transport
                .send(request, peer)
                .and_then(|()| self.transport.send(identity, peer));
            match sent {
                Ok(()) => peers_notified.push(peer.id.clone()),
                Err(e) => {
                    warn!(host = %peer.id, error = %e, "failed to request reconciliation");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }

        info!(
            %cluster_id,
            peers = peers_notified.len(),
            "reconciliation requested from peers"
        );
        Ok(BootstrapReport {
            cluster_id,
            restored,
            peers_notified,
        })
    }

    /// Insert (or overwrite) applications from their serialized form.
    fn restore(
        &mut self,
        applications: BTreeMap<ApplicationName, ApplicationSnapshot>,
    ) -> Vec<ApplicationName> {
        let mut restored = Vec::with_capacity(applications.len());
        for snapshot in applications.into_values() {
            let application = Application::from_snapshot(snapshot);
            let name = application.name().to_string();
            debug!(
                application = %name,
                containers = application.containers().len(),
                "application restored"
            );
            self.applications.insert(name.clone(), application);
            restored.push(name);
        }
        restored
    }

    // ── Reconciliation ─────────────────────────────────────────────

    /// Reconcile desired state against containers a host reports running.
    ///
    /// Each reported container must carry the reporting host. A desired
    /// container matched by the report becomes `Loaded` on that host; if it
    /// was already owned by a different host, the previous owner is told to
    /// unload it. Reported containers that match nothing are unloaded on
    /// the reporting host.
    pub fn reconcile(
        &mut self,
        application: &str,
        reported: Vec<ContainerRecord>,
    ) -> RegistryResult<ReconcileOutcome> {
        let mut running: HashMap<ContainerId, ContainerRecord> = reported
            .into_iter()
            .map(|container| (container.id.clone(), container))
            .collect();
        if running.is_empty() {
            return Ok(ReconcileOutcome::default());
        }

        let app = self
            .applications
            .get_mut(application)
            .ok_or_else(|| RegistryError::ApplicationNotFound(application.to_string()))?;

        let mut outcome = ReconcileOutcome::default();
        let mut containers = app.containers().to_vec();
        for container in &mut containers {
            let Some(report) = running.remove(&container.id) else {
                continue;
            };
            let Some(host) = report.host else {
                warn!(%application, container_id = %container.id, "report without host ignored");
                continue;
            };

            if container.status != ContainerStatus::Unloaded
                && container.host.as_deref() != Some(host.as_str())
            {
                warn!(
                    %application,
                    container_id = %container.id,
                    previous = ?container.host,
                    %host,
                    "container running on more than one host"
                );
                outcome.duplicates.push(container.clone());
            }

            container.host = Some(host);
            container.host_port = report.host_port;
            container.container_port = report.container_port;
            container.start_time = report.start_time;
            container.status = ContainerStatus::Loaded;
            outcome.claimed.push(container.id.clone());
        }
        app.replace_containers(containers);

        let mut leftovers: Vec<_> = running.into_values().collect();
        leftovers.sort_by(|a, b| a.id.cmp(&b.id));
        let extraneous: Vec<_> = leftovers
            .into_iter()
            .chain(outcome.duplicates.iter().cloned())
            .collect();

        let mut first_error = None;
        for container in extraneous {
            let Some(host_id) = container.host.clone() else {
                continue;
            };
            let message = ClusterMessage::ContainerUnload {
                application: application.to_string(),
                container: container.clone(),
            };
            match self.send_to(message, &host_id) {
                Ok(true) => outcome.unloaded.push(container),
                Ok(false) => {}
                Err(e) => {
                    warn!(%application, host = %host_id, error = %e, "failed to unload extraneous container");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        debug!(
            %application,
            claimed = outcome.claimed.len(),
            unloaded = outcome.unloaded.len(),
            "host report reconciled"
        );
        Ok(outcome)
    }

    // ── Applications ───────────────────────────────────────────────

    /// Create an application, or update it in place if it already exists.
    ///
    /// Creation asks the scheduler leader for a discovery port; when none
    /// can be allocated no record is created.
    pub async fn add(&mut self, config: ApplicationConfig) -> RegistryResult<&Application> {
        let name = config.id.clone();
        if self.applications.contains_key(&name) {
            let application = self
                .applications
                .get_mut(&name)
                .ok_or_else(|| RegistryError::ApplicationNotFound(name.clone()))?;
            application.update(config);
            debug!(application = %name, "application updated");
            return Ok(application);
        }

        let discovery_port = self
            .leader
            .discovery_port(config.port)
            .await
            .ok_or_else(|| RegistryError::DiscoveryPortUnavailable(name.clone()))?;

        info!(application = %name, discovery_port, "application created");
        Ok(self
            .applications
            .entry(name)
            .or_insert_with(|| Application::new(config, discovery_port)))
    }

    // ── Deployment ─────────────────────────────────────────────────

    /// Place one container.
    ///
    /// - placement found: the container is recorded as `Loading` on the
    ///   chosen host and a load command is sent
    /// - no placement, new container: recorded as `Unloaded` (pending)
    /// - no placement, existing container: [`RegistryError::PlacementFailed`],
    ///   nothing is recorded
    pub async fn deploy(
        &mut self,
        application: &str,
        spec: ContainerSpec,
    ) -> RegistryResult<DeployOutcome> {
        if !self.applications.contains_key(application) {
            return Err(RegistryError::ApplicationNotFound(application.to_string()));
        }

        let placement = self.leader.place_container(application, &spec).await;

        let app = self
            .applications
            .get(application)
            .ok_or_else(|| RegistryError::ApplicationNotFound(application.to_string()))?;
        let random_host_port = placement.host_port != spec.host_port;
        let container_port = spec.container_port.or(app.config().container_port);
        let mut env_vars = app.config().env_vars.clone();
        env_vars.extend(spec.env_vars);

        let (container, target) = match (placement.host, spec.id) {
            (Some(host), id) => {
                let container_id = id.unwrap_or_else(Application::new_container_id);
                env::apply_identity(
                    &mut env_vars,
                    &container_id,
                    application,
                    self.cluster_id.as_deref().unwrap_or_default(),
                );
                env::apply_discovery_ports(
                    &mut env_vars,
                    self.applications
                        .values()
                        .map(|a| (a.name(), a.discovery_port())),
                );
                let container = ContainerRecord {
                    id: container_id,
                    host: Some(host.id.clone()),
                    host_port: placement.host_port,
                    container_port,
                    random_host_port,
                    status: ContainerStatus::Loading,
                    start_time: Some(epoch_millis()),
                    env_vars,
                };
                (container, Some(host))
            }
            (None, None) => {
                let container = ContainerRecord {
                    id: Application::new_container_id(),
                    host: None,
                    host_port: spec.host_port,
                    container_port,
                    random_host_port,
                    status: ContainerStatus::Unloaded,
                    start_time: None,
                    env_vars,
                };
                (container, None)
            }
            (None, Some(container_id)) => {
                warn!(%application, %container_id, "no host available to re-place container");
                return Err(RegistryError::PlacementFailed {
                    application: application.to_string(),
                    container_id,
                });
            }
        };

        let outcome = match &target {
            Some(host) => {
                self.transport.send(
                    ClusterMessage::ContainerLoad {
                        application: application.to_string(),
                        container: container.clone(),
                    },
                    host,
                )?;
                info!(
                    %application,
                    container_id = %container.id,
                    host = %host.host_name,
                    "attempting to deploy container"
                );
                DeployOutcome::Loading {
                    container_id: container.id.clone(),
                    host: host.id.clone(),
                }
            }
            None => {
                warn!(%application, container_id = %container.id, "no host available, container pending");
                DeployOutcome::Pending {
                    container_id: container.id.clone(),
                }
            }
        };

        if let Some(app) = self.applications.get_mut(application) {
            app.add_container(container);
        }
        Ok(outcome)
    }

    /// Replace every container of an application.
    ///
    /// Each replacement is deployed with the original's host as a hint;
    /// the original is removed only after its replacement deployed.
    pub async fn redeploy_all(&mut self, application: &str) -> RegistryResult<RedeployReport> {
        let originals = self.containers(application)?.to_vec();
        info!(%application, containers = originals.len(), "redeploying containers");

        let mut report = RedeployReport::default();
        let mut failed = Vec::new();
        for original in originals {
            let spec = ContainerSpec::prefer_host(original.host.clone());
            match self.deploy(application, spec).await {
                Ok(outcome) => {
                    let replacement = outcome.container_id().to_string();
                    match self.remove_container(application, &original.id).await? {
                        Some(_) => report.replaced.push((original.id, replacement)),
                        None => {
                            warn!(
                                %application,
                                container_id = %original.id,
                                %replacement,
                                "leader has no record of original, keeping both"
                            );
                            report.kept.push((original.id, replacement));
                        }
                    }
                }
                Err(e) => {
                    warn!(%application, container_id = %original.id, error = %e, "replacement failed, keeping original");
                    failed.push(original.id);
                }
            }
        }

        if !failed.is_empty() {
            return Err(RegistryError::RedeployIncomplete {
                application: application.to_string(),
                failed,
            });
        }
        Ok(report)
    }

    // ── Removal ────────────────────────────────────────────────────

    /// Remove one container and unload it from its host.
    ///
    /// Returns `None` when the scheduler leader has no record of it.
    pub async fn remove_container(
        &mut self,
        application: &str,
        container_id: &str,
    ) -> RegistryResult<Option<ContainerId>> {
        let Some(released) = self
            .leader
            .release_container(application, container_id)
            .await
        else {
            debug!(%application, %container_id, "leader has no record of container");
            return Ok(None);
        };

        let removed = self
            .applications
            .get_mut(application)
            .and_then(|app| app.remove_container(&released.id));
        let host = released
            .host
            .clone()
            .or_else(|| removed.as_ref().and_then(|c| c.host.clone()));

        if let Some(host_id) = host {
            let message = ClusterMessage::ContainerUnload {
                application: application.to_string(),
                container: removed.unwrap_or_else(|| released.clone()),
            };
            self.send_to(message, &host_id)?;
        }

        info!(%application, container_id = %released.id, "container removed");
        Ok(Some(released.id))
    }

    /// Remove every container of an application, then the application.
    ///
    /// Unknown applications are a no-op.
    pub async fn remove_application(
        &mut self,
        application: &str,
    ) -> RegistryResult<Vec<ContainerId>> {
        let Some(app) = self.applications.get(application) else {
            debug!(%application, "application not registered, nothing to remove");
            return Ok(Vec::new());
        };
        let ids: Vec<_> = app.containers().iter().map(|c| c.id.clone()).collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(id) = self.remove_container(application, &id).await? {
                removed.push(id);
            }
        }
        self.applications.remove(application);

        info!(%application, containers = removed.len(), "application removed");
        Ok(removed)
    }

    // ── Host status ────────────────────────────────────────────────

    /// Apply a host's confirmation for one container.
    ///
    /// `Loaded` goes through reconciliation so a confirmation from a second
    /// host is treated as a duplicate. `Unloaded` only counts when it comes
    /// from the current owner. Returns whether the record changed.
    pub fn record_container_status(
        &mut self,
        application: &str,
        container_id: &str,
        status: ContainerStatus,
        host: &str,
    ) -> RegistryResult<bool> {
        let app = self
            .applications
            .get_mut(application)
            .ok_or_else(|| RegistryError::ApplicationNotFound(application.to_string()))?;
        let Some(current) = app.container_mut(container_id) else {
            debug!(%application, %container_id, %host, "status for unknown container");
            return Ok(false);
        };

        match status {
            ContainerStatus::Loaded => {
                let mut report = current.clone();
                report.host = Some(host.to_string());
                let outcome = self.reconcile(application, vec![report])?;
                Ok(!outcome.claimed.is_empty())
            }
            ContainerStatus::Unloaded if current.host.as_deref() == Some(host) => {
                current.unload();
                info!(%application, %container_id, %host, "container unloaded by host");
                Ok(true)
            }
            ContainerStatus::Unloaded | ContainerStatus::Loading => Ok(false),
        }
    }

    // ── Inbound messages ───────────────────────────────────────────

    /// Dispatch a message received from the cluster.
    pub fn handle_message(&mut self, message: ClusterMessage) -> RegistryResult<()> {
        match message {
            ClusterMessage::ContainersReport { host, applications } => {
                let mut first_error = None;
                for (application, mut containers) in applications {
                    if !self.applications.contains_key(&application) {
                        warn!(%application, %host, "report for unknown application ignored");
                        continue;
                    }
                    for container in &mut containers {
                        container.host = Some(host.clone());
                    }
                    if let Err(e) = self.reconcile(&application, containers) {
                        warn!(%application, %host, error = %e, "failed to reconcile host report");
                        first_error.get_or_insert(e);
                    }
                }
                if let Some(e) = first_error {
                    return Err(e);
                }
            }
            ClusterMessage::ApplicationsSync { applications } => self.apply_sync(applications),
            ClusterMessage::ContainerStatusChanged {
                application,
                container_id,
                status,
                host,
            } => {
                self.record_container_status(&application, &container_id, status, &host)?;
            }
            ClusterMessage::ClusterState { id } => match &self.cluster_id {
                None => {
                    info!(cluster_id = %id, "adopted cluster id from leader");
                    self.cluster_id = Some(id);
                }
                Some(current) if *current != id => {
                    warn!(%current, pushed = %id, "ignoring conflicting cluster id");
                }
                Some(_) => {}
            },
            other => debug!(kind = other.kind(), "ignoring outbound message kind"),
        }
        Ok(())
    }

    /// Replace the whole registry with a broadcast from the leader.
    pub fn apply_sync(&mut self, applications: BTreeMap<ApplicationName, ApplicationSnapshot>) {
        self.applications.clear();
        let restored = self.restore(applications);
        debug!(applications = restored.len(), "applied registry sync");
    }

    // ── Sync & snapshot ────────────────────────────────────────────

    /// Broadcast the serialized registry, then persist it.
    ///
    /// The snapshot is written even when the broadcast could not be issued;
    /// the broadcast error is returned afterwards.
    pub fn sync(&self) -> RegistryResult<()> {
        info!("requesting application sync");
        let applications = self.serialize();
        let broadcast = self.transport.broadcast(ClusterMessage::ApplicationsSync {
            applications: applications.clone(),
        });
        self.store.write_snapshot(&applications)?;
        broadcast?;
        Ok(())
    }

    /// Persist the registry without broadcasting.
    pub fn snapshot(&self) -> RegistryResult<()> {
        self.store.write_snapshot(&self.serialize())?;
        Ok(())
    }

    pub fn serialize(&self) -> BTreeMap<ApplicationName, ApplicationSnapshot> {
        self.applications
            .iter()
            .map(|(name, application)| (name.clone(), application.serialize()))
            .collect()
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Send to a host by id. Returns `false` if the host is unknown.
    fn send_to(&self, message: ClusterMessage, host_id: &str) -> RegistryResult<bool> {
        match self.hosts.get_host(host_id).map_err(RegistryError::Hosts)? {
            Some(host) => {
                self.transport.send(message, &host)?;
                Ok(true)
            }
            None => {
                warn!(%host_id, kind = message.kind(), "unknown host, message dropped");
                Ok(false)
            }
        }
    }
}

/// Current Unix epoch in milliseconds.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
