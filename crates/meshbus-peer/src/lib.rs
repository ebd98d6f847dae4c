//! Peer state tracking and the typed message bus.
//!
//! This is the "just works" layer. Hand a [`MessageBus`] a transport,
//! register message types, subscribe, and send: the bus frames every
//! message, addresses it to every connected peer and fans inbound frames out
//! to subscribers.

pub mod bus;
pub mod config;
pub mod error;
pub mod registry;

pub use bus::MessageBus;
pub use config::{BusConfig, DEFAULT_SERVICE_NAME};
pub use error::{BusError, Result};
pub use registry::PeerRegistry;
