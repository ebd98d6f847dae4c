//! Typed publish/subscribe messaging over peer-to-peer mesh transports.
//!
//! Applications register message types under one-byte tags, subscribe to
//! them, and send values to every connected peer. The bus handles framing,
//! peer tracking and fan-out; a pluggable transport handles discovery and
//! byte delivery.
//!
//! # Crate Structure
//!
//! - [`transport`]: transport boundary, peer identity, in-process `LocalMesh`
//! - [`frame`]: length-prefixed, type-tagged framing
//! - [`dispatch`]: tag registry, body codecs, bounded subscriptions
//! - [`peer`]: peer registry and the `MessageBus` facade (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use meshbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use meshbus_frame::*;
}

/// Re-export dispatch types.
pub mod dispatch {
    pub use meshbus_dispatch::*;
}

/// Re-export peer and bus types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use meshbus_peer::*;
}

#[cfg(feature = "peer")]
pub use meshbus_peer::{BusConfig, BusError, MessageBus};
