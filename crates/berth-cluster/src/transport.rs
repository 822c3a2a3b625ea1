//! Queue-backed cluster transport.
//!
//! `QueuedTransport` hands every outgoing message to an unbounded channel
//! as an [`Envelope`]. Whatever drains the receiver (a gossip layer, a
//! socket writer, a test) owns delivery; the registry only learns whether
//! the hand-off succeeded.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use berth_registry::{ClusterMessage, ClusterTransport, TransportError};
use berth_state::{HostId, HostInfo};

/// Where an envelope should go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Host(HostId),
    Broadcast,
}

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub target: Target,
    pub message: ClusterMessage,
}

impl Envelope {
    /// JSON frame for the wire.
    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Encode(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct QueuedTransport {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl QueuedTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn enqueue(&self, target: Target, message: ClusterMessage) -> Result<(), TransportError> {
        trace!(kind = message.kind(), ?target, "message queued");
        self.tx
            .send(Envelope { target, message })
            .map_err(|_| TransportError::Closed)
    }
}

impl ClusterTransport for QueuedTransport {
    fn send(&self, message: ClusterMessage, target: &HostInfo) -> Result<(), TransportError> {
        self.enqueue(Target::Host(target.id.clone()), message)
    }

    fn broadcast(&self, message: ClusterMessage) -> Result<(), TransportError> {
        self.enqueue(Target::Broadcast, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use berth_state::HostMode;

    fn host(id: &str) -> HostInfo {
        HostInfo {
            id: id.to_string(),
            host_name: id.to_string(),
            address: "127.0.0.1".to_string(),
            port: 2666,
            mode: HostMode::Follower,
            labels: BTreeMap::new(),
            last_heartbeat: 0,
        }
    }

    #[tokio::test]
    async fn queues_targeted_and_broadcast_messages() {
        let (transport, mut rx) = QueuedTransport::new();

        transport
            .send(
                ClusterMessage::ClusterState {
                    id: "abc".to_string(),
                },
                &host("h1"),
            )
            .unwrap();
        transport
            .broadcast(ClusterMessage::ApplicationsSync {
                applications: BTreeMap::new(),
            })
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.target, Target::Host("h1".to_string()));
        assert_eq!(first.message.kind(), "cluster.state");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.target, Target::Broadcast);
    }

    #[test]
    fn send_after_receiver_dropped_is_closed() {
        let (transport, rx) = QueuedTransport::new();
        drop(rx);

        let result = transport.broadcast(ClusterMessage::ClusterState {
            id: "abc".to_string(),
        });
        assert!(matches!(result, Err(TransportError::Closed)));
    }

    #[test]
    fn envelope_encodes_target_and_message() {
        let envelope = Envelope {
            target: Target::Host("h1".to_string()),
            message: ClusterMessage::ClusterState {
                id: "abc".to_string(),
            },
        };

        let value: serde_json::Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(value["target"]["host"], "h1");
        assert_eq!(value["message"]["type"], "cluster.state");
        assert_eq!(value["message"]["payload"]["id"], "abc");
    }
}
