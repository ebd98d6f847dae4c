//! Mesh transport boundary for meshbus.
//!
//! The bus never talks to radios or sockets directly. It consumes a
//! [`MeshTransport`] that discovers peers, moves opaque byte blobs between
//! them and reports session state changes back through [`TransportEvents`].
//!
//! This is the lowest layer of meshbus. It also ships [`LocalMesh`], an
//! in-process transport used by tests, demos and the CLI simulator.

pub mod error;
pub mod identity;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use identity::PeerId;
pub use memory::{LocalMesh, LocalTransport};
pub use traits::{DiscoveryRole, MeshTransport, PeerState, SendMode, TransportEvents};
