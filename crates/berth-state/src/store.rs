//! SnapshotStore — redb-backed persistence for the Berth registry.
//!
//! Holds the registry snapshot (applications with their containers), the
//! cluster id, and the host inventory. Values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe snapshot store backed by redb.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Arc<Database>,
}

impl SnapshotStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "snapshot store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory snapshot store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        txn.open_table(HOSTS).map_err(map_err!(Table))?;
        txn.open_table(METADATA).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Snapshot ───────────────────────────────────────────────────

    /// Read the full persisted snapshot: cluster id plus every application.
    pub fn read_snapshot(&self) -> StateResult<Snapshot> {
        let cluster_id = self.cluster_id()?;
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        let mut applications = BTreeMap::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let application: ApplicationSnapshot =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            applications.insert(key.value().to_string(), application);
        }
        debug!(applications = applications.len(), "snapshot read");
        Ok(Snapshot {
            cluster_id,
            applications,
        })
    }

    /// Replace the persisted applications with `applications`.
    ///
    /// Applications absent from the map are deleted in the same
    /// transaction, so the table always mirrors exactly one registry state.
    pub fn write_snapshot(
        &self,
        applications: &BTreeMap<ApplicationName, ApplicationSnapshot>,
    ) -> StateResult<()> {
        let mut encoded = Vec::with_capacity(applications.len());
        for (name, application) in applications {
            let value = serde_json::to_vec(application).map_err(map_err!(Serialize))?;
            encoded.push((name.as_str(), value));
        }

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
            let stale: Vec<String> = table
                .iter()
                .map_err(map_err!(Read))?
                .filter_map(|entry| {
                    let (key, _) = entry.ok()?;
                    let k = key.value().to_string();
                    (!applications.contains_key(&k)).then_some(k)
                })
                .collect();
            for key in &stale {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            for (name, value) in &encoded {
                table
                    .insert(*name, value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(applications = applications.len(), "snapshot written");
        Ok(())
    }

    /// Get a single persisted application by name.
    pub fn get_application(&self, name: &str) -> StateResult<Option<ApplicationSnapshot>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APPLICATIONS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let application: ApplicationSnapshot =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(application))
            }
            None => Ok(None),
        }
    }

    // ── Cluster id ─────────────────────────────────────────────────

    /// The persisted cluster id, if one was ever written.
    pub fn cluster_id(&self) -> StateResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
        let id = table
            .get(CLUSTER_ID_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string());
        Ok(id)
    }

    /// Persist the cluster id.
    pub fn put_cluster_id(&self, id: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METADATA).map_err(map_err!(Table))?;
            table.insert(CLUSTER_ID_KEY, id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster_id = %id, "cluster id stored");
        Ok(())
    }

    // ── Hosts ──────────────────────────────────────────────────────

    /// Insert or update a host.
    pub fn put_host(&self, host: &HostInfo) -> StateResult<()> {
        let value = serde_json::to_vec(host).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            table
                .insert(host.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a host by id.
    pub fn get_host(&self, host_id: &str) -> StateResult<Option<HostInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        match table.get(host_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let host: HostInfo =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(host))
            }
            None => Ok(None),
        }
    }

    /// List all hosts.
    pub fn list_hosts(&self) -> StateResult<Vec<HostInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let host: HostInfo =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(host);
        }
        Ok(results)
    }

    /// Delete a host by id. Returns true if it existed.
    pub fn delete_host(&self, host_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(HOSTS).map_err(map_err!(Table))?;
            existed = table.remove(host_id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%host_id, existed, "host deleted");
        Ok(existed)
    }
}
