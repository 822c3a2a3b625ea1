//! Registry error types.

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("application not found: {0}")]
    ApplicationNotFound(String),

    #[error("no discovery port available for application: {0}")]
    DiscoveryPortUnavailable(String),

    /// An existing container could not be re-placed on any host.
    #[error("failed to launch container {container_id} for {application}")]
    PlacementFailed {
        application: String,
        container_id: String,
    },

    #[error("redeploy of {application} left {} container(s) in place", failed.len())]
    RedeployIncomplete {
        application: String,
        failed: Vec<String>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("host registry error: {0}")]
    Hosts(#[source] anyhow::Error),

    #[error("state store error: {0}")]
    State(#[from] berth_state::StateError),

    #[error("registry actor stopped")]
    ActorStopped,
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised when a message cannot be handed to the cluster transport.
///
/// Delivery itself is never confirmed; this only covers issuance.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport channel closed")]
    Closed,

    #[error("failed to encode message: {0}")]
    Encode(String),
}
