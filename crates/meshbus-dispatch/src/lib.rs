//! Type-tag registry and subscription fan-out for meshbus.
//!
//! Each non-zero type tag maps to exactly one message type and its
//! encode/decode pair. Inbound frames are decoded once and a copy is queued
//! on every live subscription for that type. Tag 0 payloads go, undecoded,
//! to raw subscriptions.
//!
//! Subscription queues are bounded (6 entries by default) and drop the
//! oldest entry on overflow, so delivery never blocks the receive path.

pub mod body;
pub mod config;
pub mod error;
pub mod registry;
pub mod subscription;

pub use body::{BodyCodec, JsonCodec};
pub use config::{DispatchConfig, DEFAULT_QUEUE_CAPACITY};
pub use error::{BodyError, DispatchError, RecvTimeoutError, Result, TryRecvError};
pub use registry::{DispatchOutcome, DispatchRegistry, MeshMessage};
pub use subscription::Subscription;
