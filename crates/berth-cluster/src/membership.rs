//! Membership manager — tracks which hosts are in the cluster.
//!
//! Hosts are persisted in the `SnapshotStore` so a restarted registry can
//! resolve the owners recorded in its snapshot. A host that misses
//! heartbeats for longer than the dead timeout is reported `Dead` and is
//! invisible to the registry until it heartbeats again or is reaped.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use berth_registry::HostRegistry;
use berth_state::{HostId, HostInfo, HostMode, SnapshotStore, StateResult};

/// Liveness of a cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Ready,
    Dead,
}

/// A persisted host together with its derived liveness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub host: HostInfo,
    pub status: MemberStatus,
}

/// Manages cluster membership state.
#[derive(Clone)]
pub struct MembershipManager {
    store: SnapshotStore,
    /// Dead host detection threshold.
    dead_timeout: Duration,
}

impl MembershipManager {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            dead_timeout: Duration::from_secs(30),
        }
    }

    /// Set the dead host detection timeout.
    pub fn with_dead_timeout(mut self, timeout: Duration) -> Self {
        self.dead_timeout = timeout;
        self
    }

    /// Register a host, or refresh it if it joined before.
    ///
    /// The id is derived from name, address and port, so a host that
    /// restarts and rejoins keeps ownership of its containers.
    pub fn join(
        &self,
        host_name: &str,
        address: &str,
        port: u16,
        mode: HostMode,
        labels: BTreeMap<String, String>,
    ) -> StateResult<HostId> {
        let host_id = host_id_for(host_name, address, port);
        let host = HostInfo {
            id: host_id.clone(),
            host_name: host_name.to_string(),
            address: address.to_string(),
            port,
            mode,
            labels,
            last_heartbeat: epoch_secs(),
        };

        self.store.put_host(&host)?;
        info!(%host_id, %host_name, %address, port, "host joined cluster");
        Ok(host_id)
    }

    /// Record a heartbeat. Returns `false` for unknown hosts.
    pub fn heartbeat(&self, host_id: &str) -> StateResult<bool> {
        match self.store.get_host(host_id)? {
            Some(mut host) => {
                host.last_heartbeat = epoch_secs();
                self.store.put_host(&host)?;
                debug!(%host_id, "heartbeat received");
                Ok(true)
            }
            None => {
                warn!(%host_id, "heartbeat from unknown host");
                Ok(false)
            }
        }
    }

    pub fn leave(&self, host_id: &str) -> StateResult<bool> {
        let existed = self.store.delete_host(host_id)?;
        if existed {
            info!(%host_id, "host left cluster");
        }
        Ok(existed)
    }

    pub fn list_members(&self) -> StateResult<Vec<Member>> {
        let now = epoch_secs();
        Ok(self
            .store
            .list_hosts()?
            .into_iter()
            .map(|host| self.member(host, now))
            .collect())
    }

    pub fn get_member(&self, host_id: &str) -> StateResult<Option<Member>> {
        let now = epoch_secs();
        Ok(self
            .store
            .get_host(host_id)?
            .map(|host| self.member(host, now)))
    }

    /// Remove hosts that stopped heartbeating. Returns the removed ids.
    pub fn reap_dead_hosts(&self) -> StateResult<Vec<HostId>> {
        let mut reaped = Vec::new();
        for member in self.list_members()? {
            if member.status == MemberStatus::Dead {
                self.store.delete_host(&member.host.id)?;
                warn!(host_id = %member.host.id, "reaped dead host");
                reaped.push(member.host.id);
            }
        }
        Ok(reaped)
    }

    pub fn ready_count(&self) -> StateResult<usize> {
        Ok(self
            .list_members()?
            .iter()
            .filter(|m| m.status == MemberStatus::Ready)
            .count())
    }

    fn member(&self, host: HostInfo, now: u64) -> Member {
        let status = if now.saturating_sub(host.last_heartbeat) > self.dead_timeout.as_secs() {
            MemberStatus::Dead
        } else {
            MemberStatus::Ready
        };
        Member { host, status }
    }
}

impl HostRegistry for MembershipManager {
    fn get_host(&self, host_id: &str) -> anyhow::Result<Option<HostInfo>> {
        Ok(self
            .get_member(host_id)?
            .filter(|m| m.status == MemberStatus::Ready)
            .map(|m| m.host))
    }

    fn all_hosts(&self) -> anyhow::Result<Vec<HostInfo>> {
        Ok(self
            .list_members()?
            .into_iter()
            .filter(|m| m.status == MemberStatus::Ready)
            .map(|m| m.host)
            .collect())
    }
}

/// Reap dead hosts every `interval` until shutdown.
pub async fn run_reaper(
    membership: MembershipManager,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match membership.reap_dead_hosts() {
                    Ok(reaped) if !reaped.is_empty() => {
                        info!(count = reaped.len(), "reaped dead hosts");
                    }
                    Err(e) => warn!(error = %e, "dead host reaper error"),
                    _ => {}
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Stable host id from the host's network identity.
fn host_id_for(host_name: &str, address: &str, port: u16) -> HostId {
    let key = format!("{host_name}/{address}:{port}");
    let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes());
    format!("host-{}", &uuid.simple().to_string()[..12])
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> MembershipManager {
        MembershipManager::new(SnapshotStore::open_in_memory().unwrap())
    }

    fn join(mgr: &MembershipManager, name: &str, address: &str) -> HostId {
        mgr.join(name, address, 2666, HostMode::Follower, BTreeMap::new())
            .unwrap()
    }

    fn make_dead(store: &SnapshotStore, host_id: &str) {
        let mut host = store.get_host(host_id).unwrap().unwrap();
        host.last_heartbeat = 1000;
        store.put_host(&host).unwrap();
    }

    #[test]
    fn join_creates_host() {
        let mgr = manager();
        let host_id = join(&mgr, "worker-1", "10.0.0.1");

        assert!(host_id.starts_with("host-"));
        let member = mgr.get_member(&host_id).unwrap().unwrap();
        assert_eq!(member.host.address, "10.0.0.1");
        assert_eq!(member.host.port, 2666);
        assert_eq!(member.status, MemberStatus::Ready);
    }

    #[test]
    fn rejoin_keeps_host_id() {
        let mgr = manager();
        let first = join(&mgr, "worker-1", "10.0.0.1");
        let second = join(&mgr, "worker-1", "10.0.0.1");
        let other = join(&mgr, "worker-2", "10.0.0.2");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(mgr.list_members().unwrap().len(), 2);
    }

    #[test]
    fn heartbeat_revives_host() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let mgr = MembershipManager::new(store.clone());
        let host_id = join(&mgr, "worker-1", "10.0.0.1");
        make_dead(&store, &host_id);
        assert_eq!(mgr.ready_count().unwrap(), 0);

        assert!(mgr.heartbeat(&host_id).unwrap());
        assert_eq!(mgr.ready_count().unwrap(), 1);
    }

    #[test]
    fn heartbeat_unknown_host_returns_false() {
        assert!(!manager().heartbeat("unknown").unwrap());
    }

    #[test]
    fn leave_removes_host() {
        let mgr = manager();
        let host_id = join(&mgr, "worker-1", "10.0.0.1");

        assert!(mgr.leave(&host_id).unwrap());
        assert!(!mgr.leave(&host_id).unwrap());
        assert!(mgr.get_member(&host_id).unwrap().is_none());
    }

    #[test]
    fn dead_hosts_are_hidden_from_registry() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let mgr = MembershipManager::new(store.clone());
        let alive = join(&mgr, "worker-1", "10.0.0.1");
        let dead = join(&mgr, "worker-2", "10.0.0.2");
        make_dead(&store, &dead);

        let ids: Vec<_> = mgr.all_hosts().unwrap().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![alive.clone()]);
        assert!(HostRegistry::get_host(&mgr, &dead).unwrap().is_none());
        assert!(HostRegistry::get_host(&mgr, &alive).unwrap().is_some());
    }

    #[test]
    fn reap_dead_hosts_deletes_them() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let mgr = MembershipManager::new(store.clone()).with_dead_timeout(Duration::from_secs(60));
        let host_id = join(&mgr, "worker-1", "10.0.0.1");
        join(&mgr, "worker-2", "10.0.0.2");
        make_dead(&store, &host_id);

        let reaped = mgr.reap_dead_hosts().unwrap();
        assert_eq!(reaped, vec![host_id]);
        assert_eq!(mgr.list_members().unwrap().len(), 1);
    }

    #[test]
    fn labels_and_mode_preserved() {
        let mgr = manager();
        let mut labels = BTreeMap::new();
        labels.insert("region".to_string(), "us-east-1".to_string());

        let host_id = mgr
            .join("leader-1", "10.0.0.9", 2666, HostMode::Leader, labels)
            .unwrap();

        let member = mgr.get_member(&host_id).unwrap().unwrap();
        assert_eq!(member.host.mode, HostMode::Leader);
        assert_eq!(member.host.labels["region"], "us-east-1");
    }

    #[tokio::test]
    async fn reaper_stops_on_shutdown() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let mgr = MembershipManager::new(store.clone());
        let host_id = join(&mgr, "worker-1", "10.0.0.1");
        make_dead(&store, &host_id);

        let (tx, rx) = watch::channel(false);
        let reaper = tokio::spawn(run_reaper(mgr.clone(), Duration::from_millis(10), rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        reaper.await.unwrap();

        assert!(mgr.list_members().unwrap().is_empty());
    }
}
