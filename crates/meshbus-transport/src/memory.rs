use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::identity::PeerId;
use crate::traits::{DiscoveryRole, MeshTransport, PeerState, SendMode, TransportEvents};

/// In-process mesh shared by any number of [`LocalTransport`] endpoints.
///
/// Endpoints are grouped by service name. A browsing endpoint links with
/// every advertising endpoint of the same service, and each new link is
/// reported to both sides as `Connecting` followed by `Connected`.
/// Deliveries are synchronous and never run under the hub lock.
#[derive(Clone, Default)]
pub struct LocalMesh {
    hub: Arc<Mutex<Hub>>,
}

#[derive(Default)]
struct Hub {
    endpoints: HashMap<PeerId, Endpoint>,
    links: HashSet<Link>,
}

struct Endpoint {
    service: String,
    role: DiscoveryRole,
    events: Arc<dyn TransportEvents>,
}

/// Unordered pair of linked endpoints, stored smallest id first.
#[derive(Clone, PartialEq, Eq, Hash)]
struct Link(PeerId, PeerId);

impl Link {
    fn new(a: &PeerId, b: &PeerId) -> Self {
        if a <= b {
            Self(a.clone(), b.clone())
        } else {
            Self(b.clone(), a.clone())
        }
    }

    fn other(&self, peer: &PeerId) -> Option<&PeerId> {
        if &self.0 == peer {
            Some(&self.1)
        } else if &self.1 == peer {
            Some(&self.0)
        } else {
            None
        }
    }
}

struct Notice {
    events: Arc<dyn TransportEvents>,
    peer: PeerId,
    state: PeerState,
}

fn fire(notices: Vec<Notice>) {
    for notice in notices {
        notice
            .events
            .on_peer_state_changed(notice.peer, notice.state);
    }
}

fn lock_hub(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LocalMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new, unbound endpoint on this mesh.
    pub fn transport(&self) -> LocalTransport {
        LocalTransport {
            hub: Arc::clone(&self.hub),
            local: Mutex::new(None),
        }
    }

    /// Drop the link between two endpoints, as if the radio link failed.
    ///
    /// Both sides observe `NotConnected`. Returns false if they were not linked.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) -> bool {
        let notices = {
            let mut hub = lock_hub(&self.hub);
            if !hub.links.remove(&Link::new(a, b)) {
                return false;
            }
            let mut notices = Vec::with_capacity(2);
            if let Some(endpoint) = hub.endpoints.get(a) {
                notices.push(Notice {
                    events: Arc::clone(&endpoint.events),
                    peer: b.clone(),
                    state: PeerState::NotConnected,
                });
            }
            if let Some(endpoint) = hub.endpoints.get(b) {
                notices.push(Notice {
                    events: Arc::clone(&endpoint.events),
                    peer: a.clone(),
                    state: PeerState::NotConnected,
                });
            }
            notices
        };
        debug!(a = %a, b = %b, "local mesh link dropped");
        fire(notices);
        true
    }

    /// True if the two endpoints currently share a link.
    pub fn is_linked(&self, a: &PeerId, b: &PeerId) -> bool {
        lock_hub(&self.hub).links.contains(&Link::new(a, b))
    }

    /// Number of endpoints currently discovering.
    pub fn endpoint_count(&self) -> usize {
        lock_hub(&self.hub).endpoints.len()
    }
}

/// One endpoint of a [`LocalMesh`].
pub struct LocalTransport {
    hub: Arc<Mutex<Hub>>,
    local: Mutex<Option<PeerId>>,
}

impl LocalTransport {
    /// Identity this endpoint is bound to, once discovery started.
    pub fn local_id(&self) -> Option<PeerId> {
        self.local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MeshTransport for LocalTransport {
    fn discover(
        &self,
        local: &PeerId,
        service: &str,
        role: DiscoveryRole,
        events: Arc<dyn TransportEvents>,
    ) -> Result<()> {
        if role.is_empty() {
            return Err(TransportError::Discovery(
                "no discovery role requested".to_string(),
            ));
        }

        let notices = {
            let mut bound = self.local.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = bound.as_ref() {
                if existing != local {
                    return Err(TransportError::Discovery(format!(
                        "endpoint already bound to {existing}"
                    )));
                }
            }
            *bound = Some(local.clone());

            let mut hub = lock_hub(&self.hub);
            hub.endpoints.insert(
                local.clone(),
                Endpoint {
                    service: service.to_string(),
                    role,
                    events: Arc::clone(&events),
                },
            );

            let candidates: Vec<(PeerId, Arc<dyn TransportEvents>)> = hub
                .endpoints
                .iter()
                .filter(|(id, endpoint)| {
                    *id != local && endpoint.service == service && role.pairs_with(&endpoint.role)
                })
                .map(|(id, endpoint)| (id.clone(), Arc::clone(&endpoint.events)))
                .collect();

            let mut notices = Vec::new();
            for (remote, remote_events) in candidates {
                if !hub.links.insert(Link::new(local, &remote)) {
                    continue;
                }
                for state in [PeerState::Connecting, PeerState::Connected] {
                    notices.push(Notice {
                        events: Arc::clone(&events),
                        peer: remote.clone(),
                        state,
                    });
                    notices.push(Notice {
                        events: Arc::clone(&remote_events),
                        peer: local.clone(),
                        state,
                    });
                }
            }
            notices
        };

        info!(
            peer = %local,
            service,
            advertise = role.advertise,
            browse = role.browse,
            "local mesh discovery started"
        );
        fire(notices);
        Ok(())
    }

    fn stop_discovery(&self) {
        let Some(local) = self
            .local
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        let notices = {
            let mut hub = lock_hub(&self.hub);
            let local_events = hub
                .endpoints
                .remove(&local)
                .map(|endpoint| endpoint.events);

            let mut dropped = Vec::new();
            hub.links.retain(|link| match link.other(&local) {
                Some(remote) => {
                    dropped.push(remote.clone());
                    false
                }
                None => true,
            });

            let mut notices = Vec::with_capacity(dropped.len() * 2);
            for remote in dropped {
                if let Some(endpoint) = hub.endpoints.get(&remote) {
                    notices.push(Notice {
                        events: Arc::clone(&endpoint.events),
                        peer: local.clone(),
                        state: PeerState::NotConnected,
                    });
                }
                if let Some(events) = &local_events {
                    notices.push(Notice {
                        events: Arc::clone(events),
                        peer: remote,
                        state: PeerState::NotConnected,
                    });
                }
            }
            notices
        };

        info!(peer = %local, "local mesh discovery stopped");
        fire(notices);
    }

    fn send_bytes(&self, bytes: Bytes, to: &[PeerId], mode: SendMode) -> Result<()> {
        let local = self.local_id().ok_or(TransportError::NotStarted)?;

        let (targets, missing) = {
            let hub = lock_hub(&self.hub);
            let mut targets = Vec::with_capacity(to.len());
            let mut missing = None;
            for peer in to {
                let linked = hub.links.contains(&Link::new(&local, peer));
                match hub.endpoints.get(peer) {
                    Some(endpoint) if linked => targets.push(Arc::clone(&endpoint.events)),
                    _ => {
                        missing.get_or_insert_with(|| peer.clone());
                    }
                }
            }
            (targets, missing)
        };

        trace!(
            peer = %local,
            targets = targets.len(),
            size = bytes.len(),
            ?mode,
            "local mesh delivery"
        );
        for events in targets {
            events.on_bytes_received(local.clone(), bytes.clone());
        }

        match missing {
            Some(peer) => Err(TransportError::NotConnected {
                peer: peer.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn transport_name(&self) -> &'static str {
        "local-mesh"
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.stop_discovery();
    }
}
