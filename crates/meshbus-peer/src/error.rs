use meshbus_dispatch::{BodyError, DispatchError};

/// Errors surfaced by bus operations.
///
/// Malformed inbound frames and undecodable bodies never appear here; they
/// are logged and dropped on the receive path.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] meshbus_transport::TransportError),

    /// Registration or subscription error.
    #[error("dispatch error: {0}")]
    Dispatch(DispatchError),

    /// The body encoder rejected an outgoing message. Nothing was sent.
    #[error("failed to encode {type_name} for tag {tag}: {source}")]
    Encode {
        tag: u8,
        type_name: &'static str,
        source: BodyError,
    },

    /// No tag is registered for the message type.
    #[error("no tag registered for {type_name}")]
    UnregisteredType { type_name: &'static str },

    /// The bus was stopped and cannot be used for this operation.
    #[error("message bus stopped")]
    Stopped,

    /// `start` was asked to neither advertise nor browse.
    #[error("start requires advertising, browsing, or both")]
    InvalidRole,
}

impl From<DispatchError> for BusError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Encode {
                tag,
                type_name,
                source,
            } => Self::Encode {
                tag,
                type_name,
                source,
            },
            DispatchError::UnregisteredType { type_name } => Self::UnregisteredType { type_name },
            DispatchError::Closed => Self::Stopped,
            other => Self::Dispatch(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
