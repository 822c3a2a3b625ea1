//! Inbound dispatch from the cluster to the registry.

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use berth_registry::{ClusterMessage, RegistryError, RegistryHandle};

/// Decode JSON frames from `frames` and deliver them to the registry.
///
/// Malformed frames and per-message registry errors are logged and
/// skipped. Stops on shutdown, when the sender side closes, or when the
/// registry actor is gone.
pub async fn run_inbox(
    handle: RegistryHandle,
    mut frames: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                let message = match ClusterMessage::from_json(&frame) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed cluster frame");
                        continue;
                    }
                };
                let kind = message.kind();
                match handle.deliver(message).await {
                    Ok(()) => debug!(kind, "cluster message applied"),
                    Err(RegistryError::ActorStopped) => break,
                    Err(e) => warn!(kind, error = %e, "cluster message rejected"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("cluster inbox stopped");
}
