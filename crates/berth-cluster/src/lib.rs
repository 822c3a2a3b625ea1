//! berth-cluster — cluster plumbing around the Berth registry.
//!
//! # Architecture
//!
//! ```text
//! Registry actor
//!   ├── MembershipManager   (HostRegistry)
//!   │   ├── join / heartbeat / leave
//!   │   ├── Detects dead hosts (missed heartbeats)
//!   │   └── Persists to SnapshotStore
//!   ├── QueuedTransport     (ClusterTransport)
//!   │   └── Envelope queue drained by the gossip layer
//!   └── run_inbox
//!       └── JSON frames → RegistryHandle::deliver
//! ```

pub mod inbox;
pub mod membership;
pub mod transport;

pub use inbox::run_inbox;
pub use membership::{Member, MemberStatus, MembershipManager, run_reaper};
pub use transport::{Envelope, QueuedTransport, Target};
