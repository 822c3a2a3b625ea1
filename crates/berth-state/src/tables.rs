//! redb table definitions for the Berth snapshot store.

use redb::TableDefinition;

/// Serialized applications keyed by application name.
pub const APPLICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("applications");

/// Host inventory keyed by host id.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Cluster-wide scalar values (cluster id).
pub const METADATA: TableDefinition<&str, &str> = TableDefinition::new("metadata");

/// Key of the cluster id row in [`METADATA`].
pub const CLUSTER_ID_KEY: &str = "cluster_id";
