/// Errors that can occur in mesh transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The addressed peer has no live session with the local endpoint.
    #[error("peer {peer} is not connected")]
    NotConnected { peer: String },

    /// The transport was asked to send before discovery started.
    #[error("transport not started")]
    NotStarted,

    /// Discovery could not be started in the requested role.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// The underlying session rejected the payload.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
