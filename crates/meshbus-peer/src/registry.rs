use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use meshbus_transport::{PeerId, PeerState};
use tracing::debug;

/// Connection-state cache for remote peers.
///
/// Only transport events write here. A peer moving to `NotConnected` is
/// forgotten entirely, so the key set is always the set of known peers.
/// Reconnection is the transport's business.
pub struct PeerRegistry {
    local: PeerId,
    states: RwLock<HashMap<PeerId, PeerState>>,
}

impl PeerRegistry {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local
    }

    /// Apply a state change reported by the transport.
    pub fn on_state_change(&self, peer: PeerId, state: PeerState) {
        if peer == self.local {
            debug!(peer = %peer, %state, "ignoring state change for local identity");
            return;
        }

        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        let previous = match state {
            PeerState::NotConnected => states.remove(&peer),
            PeerState::Connecting | PeerState::Connected => states.insert(peer.clone(), state),
        };
        drop(states);

        debug!(
            peer = %peer,
            from = %previous.unwrap_or(PeerState::NotConnected),
            to = %state,
            "peer state changed"
        );
    }

    /// Peers that can be sent to right now.
    pub fn connected_peers(&self) -> HashSet<PeerId> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(peer, state)| **state == PeerState::Connected && **peer != self.local)
            .map(|(peer, _)| peer.clone())
            .collect()
    }

    /// Current state of `peer`; unknown peers are `NotConnected`.
    pub fn state_of(&self, peer: &PeerId) -> PeerState {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer)
            .copied()
            .unwrap_or(PeerState::NotConnected)
    }

    /// Every known peer and its state, ordered by identity.
    pub fn known_peers(&self) -> Vec<(PeerId, PeerState)> {
        let mut peers: Vec<(PeerId, PeerState)> = self
            .states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(peer, state)| (peer.clone(), *state))
            .collect();
        peers.sort_by(|a, b| a.0.cmp(&b.0));
        peers
    }

    pub fn len(&self) -> usize {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
