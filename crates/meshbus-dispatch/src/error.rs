use std::fmt;

/// A message body could not be encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BodyError(String);

impl BodyError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

impl From<serde_json::Error> for BodyError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err)
    }
}

/// Errors raised by type registration, encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Tag 0 carries raw payloads and cannot be bound to a type.
    #[error("tag {0} is reserved for raw payloads")]
    ReservedTag(u8),

    /// The tag is already bound to a different message type.
    #[error("tag {tag} already registered for {existing} (requested {requested})")]
    DuplicateTag {
        tag: u8,
        existing: &'static str,
        requested: &'static str,
    },

    /// The message type is already bound to a different tag.
    #[error("{type_name} already registered under tag {tag}")]
    DuplicateType { type_name: &'static str, tag: u8 },

    /// No tag is registered for the message type.
    #[error("no tag registered for {type_name}")]
    UnregisteredType { type_name: &'static str },

    /// The body encoder rejected the message.
    #[error("failed to encode {type_name} for tag {tag}: {source}")]
    Encode {
        tag: u8,
        type_name: &'static str,
        source: BodyError,
    },

    /// The body bytes do not match the registered type.
    #[error("failed to decode tag {tag} as {type_name}: {source}")]
    Decode {
        tag: u8,
        type_name: &'static str,
        source: BodyError,
    },

    /// The registry was closed; no new subscriptions are accepted.
    #[error("dispatch registry closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Non-blocking receive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryRecvError {
    #[error("subscription queue empty")]
    Empty,
    #[error("subscription closed")]
    Closed,
}

/// Receive with a deadline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvTimeoutError {
    #[error("timed out waiting for a message")]
    Timeout,
    #[error("subscription closed")]
    Closed,
}
