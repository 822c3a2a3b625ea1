//! berth-state — persisted registry state for Berth.
//!
//! Backed by [redb](https://docs.rs/redb), holds the durable snapshot of
//! the application registry (applications and their containers), the
//! cluster identity, and the host inventory.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Applications are keyed by name, hosts by host id. The cluster id lives
//! in a small string-valued metadata table.
//!
//! The `SnapshotStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::SnapshotStore;
pub use types::*;
