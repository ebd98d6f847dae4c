use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::identity::PeerId;

/// Session state of a remote peer as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    NotConnected,
    Connecting,
    Connected,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeerState::NotConnected => "not-connected",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Delivery guarantee requested for a single send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SendMode {
    /// Delivered in order or the session fails.
    #[default]
    Reliable,
    /// Best effort; may be dropped silently.
    Unreliable,
}

/// Which discovery roles an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscoveryRole {
    /// Make this endpoint visible to browsers.
    pub advertise: bool,
    /// Look for advertising endpoints and invite them.
    pub browse: bool,
}

impl DiscoveryRole {
    pub const ADVERTISE: Self = Self {
        advertise: true,
        browse: false,
    };
    pub const BROWSE: Self = Self {
        advertise: false,
        browse: true,
    };
    pub const BOTH: Self = Self {
        advertise: true,
        browse: true,
    };

    pub fn new(advertise: bool, browse: bool) -> Self {
        Self { advertise, browse }
    }

    /// True when neither role is requested.
    pub fn is_empty(&self) -> bool {
        !self.advertise && !self.browse
    }

    /// True if an endpoint in this role will pair with one in `other`.
    pub fn pairs_with(&self, other: &DiscoveryRole) -> bool {
        (self.browse && other.advertise) || (self.advertise && other.browse)
    }
}

/// Callbacks a transport raises into the bus.
///
/// Transports may call these from any thread, concurrently for different
/// peers. Implementations must not block.
pub trait TransportEvents: Send + Sync {
    /// A remote peer's session state changed.
    fn on_peer_state_changed(&self, peer: PeerId, state: PeerState);

    /// One complete message blob arrived from `peer`.
    fn on_bytes_received(&self, peer: PeerId, bytes: Bytes);
}

/// The session transport consumed by the bus.
///
/// Each `send_bytes` call must reach `on_bytes_received` on the remote side
/// as one whole message, or not at all.
pub trait MeshTransport: Send + Sync {
    /// Start discovery for `local` in the given role(s) within `service`.
    fn discover(
        &self,
        local: &PeerId,
        service: &str,
        role: DiscoveryRole,
        events: Arc<dyn TransportEvents>,
    ) -> Result<()>;

    /// Stop advertising and browsing. Sessions still mid-handshake may
    /// complete or fail afterwards.
    fn stop_discovery(&self);

    /// Hand one message blob to the transport for every peer in `to`.
    fn send_bytes(&self, bytes: Bytes, to: &[PeerId], mode: SendMode) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str {
        "unknown"
    }
}

impl<T: MeshTransport + ?Sized> MeshTransport for Arc<T> {
    fn discover(
        &self,
        local: &PeerId,
        service: &str,
        role: DiscoveryRole,
        events: Arc<dyn TransportEvents>,
    ) -> Result<()> {
        (**self).discover(local, service, role, events)
    }

    fn stop_discovery(&self) {
        (**self).stop_discovery()
    }

    fn send_bytes(&self, bytes: Bytes, to: &[PeerId], mode: SendMode) -> Result<()> {
        (**self).send_bytes(bytes, to, mode)
    }

    fn transport_name(&self) -> &'static str {
        (**self).transport_name()
    }
}
