use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use meshbus_dispatch::{
    BodyCodec, BodyError, DispatchOutcome, DispatchRegistry, JsonCodec, MeshMessage,
    Subscription,
};
use meshbus_frame::{decode_frame, encode_frame, RAW};
use meshbus_transport::{
    DiscoveryRole, MeshTransport, PeerId, PeerState, SendMode, TransportEvents,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::registry::PeerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running(DiscoveryRole),
    Stopped,
}

/// State shared with the transport's callbacks.
///
/// Holds no reference to the transport, so handing it to `discover` does not
/// create a cycle.
struct BusInner {
    local: PeerId,
    peers: PeerRegistry,
    dispatch: DispatchRegistry,
    stopped: AtomicBool,
}

impl BusInner {
    fn receive(&self, peer: PeerId, bytes: Bytes) {
        if self.stopped.load(Ordering::Acquire) {
            trace!(peer = %peer, size = bytes.len(), "bus stopped, dropping inbound bytes");
            return;
        }
        if peer == self.local {
            trace!(size = bytes.len(), "ignoring bytes from local identity");
            return;
        }

        let frame = match decode_frame(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(peer = %peer, error = %err, "discarding malformed frame");
                return;
            }
        };

        match self.dispatch.dispatch(frame) {
            DispatchOutcome::Delivered { tag, receivers } => {
                trace!(peer = %peer, tag, receivers, "frame delivered");
            }
            outcome => debug!(peer = %peer, ?outcome, "frame not delivered"),
        }
    }
}

impl TransportEvents for BusInner {
    fn on_peer_state_changed(&self, peer: PeerId, state: PeerState) {
        self.peers.on_state_change(peer, state);
    }

    fn on_bytes_received(&self, peer: PeerId, bytes: Bytes) {
        self.receive(peer, bytes);
    }
}

/// Typed publish/subscribe over a peer mesh.
///
/// Sends go to every currently connected peer. Inbound frames are decoded
/// and fanned out to subscriptions; malformed frames are logged and
/// dropped. Dropping the bus stops it.
pub struct MessageBus<C: BodyCodec = JsonCodec> {
    inner: Arc<BusInner>,
    transport: Arc<dyn MeshTransport>,
    codec: Arc<C>,
    lifecycle: Mutex<Lifecycle>,
    config: BusConfig,
}

impl MessageBus<JsonCodec> {
    /// Create a bus with default config and JSON bodies.
    pub fn new(transport: impl MeshTransport + 'static) -> Self {
        Self::with_config(transport, BusConfig::default())
    }

    pub fn with_config(transport: impl MeshTransport + 'static, config: BusConfig) -> Self {
        Self::with_codec(transport, config, JsonCodec)
    }
}

impl<C: BodyCodec> MessageBus<C> {
    /// Create a bus whose typed bodies are serialized by `codec`.
    pub fn with_codec(transport: impl MeshTransport + 'static, config: BusConfig, codec: C) -> Self {
        let local = match &config.display_name {
            Some(name) => PeerId::with_display_name(name.clone()),
            None => PeerId::generate(),
        };
        let inner = Arc::new(BusInner {
            peers: PeerRegistry::new(local.clone()),
            dispatch: DispatchRegistry::with_config(config.dispatch_config()),
            local,
            stopped: AtomicBool::new(false),
        });

        debug!(
            local = %inner.local,
            transport = transport.transport_name(),
            codec = codec.name(),
            "created message bus"
        );

        Self {
            inner,
            transport: Arc::new(transport),
            codec: Arc::new(codec),
            lifecycle: Mutex::new(Lifecycle::Idle),
            config,
        }
    }

    fn lifecycle(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(BusError::Stopped);
        }
        Ok(())
    }

    /// Begin discovery as advertiser, browser, or both.
    ///
    /// Calling again while running is a no-op. A stopped bus cannot be
    /// restarted.
    pub fn start(&self, advertise: bool, browse: bool) -> Result<()> {
        let role = DiscoveryRole::new(advertise, browse);
        let mut lifecycle = self.lifecycle();
        match *lifecycle {
            Lifecycle::Stopped => Err(BusError::Stopped),
            Lifecycle::Running(current) => {
                debug!(?current, requested = ?role, "bus already running");
                Ok(())
            }
            Lifecycle::Idle => {
                if role.is_empty() {
                    return Err(BusError::InvalidRole);
                }
                let events: Arc<dyn TransportEvents> = self.inner.clone();
                self.transport.discover(
                    &self.inner.local,
                    &self.config.service_name,
                    role,
                    events,
                )?;
                *lifecycle = Lifecycle::Running(role);
                info!(
                    local = %self.inner.local,
                    service = %self.config.service_name,
                    advertise,
                    browse,
                    "message bus started"
                );
                Ok(())
            }
        }
    }

    /// Stop discovery and close every subscription. Idempotent.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);
        if previous == Lifecycle::Stopped {
            return;
        }

        self.inner.stopped.store(true, Ordering::Release);
        if let Lifecycle::Running(_) = previous {
            self.transport.stop_discovery();
        }
        self.inner.dispatch.close_all();
        info!(local = %self.inner.local, "message bus stopped");
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running(_))
    }

    /// Bind `M` to `tag` using the bus codec.
    pub fn register<M>(&self, tag: u8) -> Result<()>
    where
        M: MeshMessage + Serialize + DeserializeOwned,
    {
        Ok(self.inner.dispatch.register::<M, C>(tag, Arc::clone(&self.codec))?)
    }

    /// Bind `M` to `tag` with a custom encode/decode pair.
    pub fn register_with<M, E, D>(&self, tag: u8, encode: E, decode: D) -> Result<()>
    where
        M: MeshMessage,
        E: Fn(&M) -> std::result::Result<Vec<u8>, BodyError> + Send + Sync + 'static,
        D: Fn(&[u8]) -> std::result::Result<M, BodyError> + Send + Sync + 'static,
    {
        Ok(self.inner.dispatch.register_with(tag, encode, decode)?)
    }

    /// Send `message` to every connected peer.
    ///
    /// With no connected peers this succeeds without encoding anything.
    pub fn send<M: MeshMessage>(&self, message: &M, mode: SendMode) -> Result<()> {
        self.ensure_open()?;
        if self.inner.dispatch.tag_of::<M>().is_none() {
            return Err(BusError::UnregisteredType {
                type_name: std::any::type_name::<M>(),
            });
        }

        let targets = self.targets();
        if targets.is_empty() {
            trace!(type_name = std::any::type_name::<M>(), "no connected peers, skipping send");
            return Ok(());
        }

        let (tag, body) = self.inner.dispatch.encode(message)?;
        self.transmit(tag, &body, &targets, mode)
    }

    /// Send an opaque payload under the raw tag to every connected peer.
    pub fn send_raw(&self, payload: &[u8], mode: SendMode) -> Result<()> {
        self.send_tagged(RAW, payload, mode)
    }

    /// Send an already-encoded body under `tag` to every connected peer.
    ///
    /// The body is framed as-is; the tag need not be registered locally.
    pub fn send_tagged(&self, tag: u8, payload: &[u8], mode: SendMode) -> Result<()> {
        self.ensure_open()?;
        let targets = self.targets();
        if targets.is_empty() {
            trace!(tag, size = payload.len(), "no connected peers, skipping send");
            return Ok(());
        }
        self.transmit(tag, payload, &targets, mode)
    }

    fn targets(&self) -> Vec<PeerId> {
        let mut targets: Vec<PeerId> = self.inner.peers.connected_peers().into_iter().collect();
        targets.sort();
        targets
    }

    fn transmit(&self, tag: u8, body: &[u8], targets: &[PeerId], mode: SendMode) -> Result<()> {
        let mut buf = BytesMut::new();
        encode_frame(tag, body, &mut buf);
        let frame = buf.freeze();
        trace!(tag, size = frame.len(), peers = targets.len(), ?mode, "sending frame");
        self.transport.send_bytes(frame, targets, mode)?;
        Ok(())
    }

    /// Open a subscription for messages of type `M`.
    pub fn subscribe<M: MeshMessage>(&self) -> Result<Subscription<M>> {
        self.ensure_open()?;
        Ok(self.inner.dispatch.subscribe::<M>()?)
    }

    /// Open a subscription for raw payloads.
    pub fn subscribe_raw(&self) -> Result<Subscription<Bytes>> {
        self.ensure_open()?;
        Ok(self.inner.dispatch.subscribe_raw()?)
    }

    /// Feed inbound bytes as if the transport had delivered them.
    pub fn on_receive(&self, peer: PeerId, bytes: Bytes) {
        self.inner.receive(peer, bytes);
    }

    /// Feed a peer state change as if the transport had reported it.
    pub fn on_peer_state_changed(&self, peer: PeerId, state: PeerState) {
        self.inner.peers.on_state_change(peer, state);
    }

    pub fn local_id(&self) -> &PeerId {
        &self.inner.local
    }

    pub fn connected_peers(&self) -> HashSet<PeerId> {
        self.inner.peers.connected_peers()
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.inner.peers
    }

    pub fn dispatch_registry(&self) -> &DispatchRegistry {
        &self.inner.dispatch
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.transport_name()
    }
}

impl<C: BodyCodec> Drop for MessageBus<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<C: BodyCodec> fmt::Debug for MessageBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("local", &self.inner.local)
            .field("transport", &self.transport.transport_name())
            .field("lifecycle", &*self.lifecycle())
            .field("peers", &self.inner.peers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use meshbus_dispatch::{DispatchError, TryRecvError};
    use meshbus_frame::{decode, encode};
    use meshbus_transport::TransportError;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: i64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Chat {
        text: String,
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Bytes, Vec<PeerId>, SendMode)>>,
        discovers: AtomicUsize,
        stops: AtomicUsize,
        fail_send: AtomicBool,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<(Bytes, Vec<PeerId>, SendMode)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl MeshTransport for RecordingTransport {
        fn discover(
            &self,
            _local: &PeerId,
            _service: &str,
            _role: DiscoveryRole,
            _events: Arc<dyn TransportEvents>,
        ) -> meshbus_transport::Result<()> {
            self.discovers.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop_discovery(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        fn send_bytes(
            &self,
            bytes: Bytes,
            to: &[PeerId],
            mode: SendMode,
        ) -> meshbus_transport::Result<()> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("link down".to_string()));
            }
            self.sent.lock().unwrap().push((bytes, to.to_vec(), mode));
            Ok(())
        }

        fn transport_name(&self) -> &'static str {
            "recording"
        }
    }

    fn bus() -> (Arc<RecordingTransport>, MessageBus) {
        let transport = Arc::new(RecordingTransport::default());
        let bus = MessageBus::new(Arc::clone(&transport));
        bus.register::<Ping>(5).unwrap();
        bus.register::<Chat>(6).unwrap();
        (transport, bus)
    }

    fn ping_frame(seq: i64) -> Bytes {
        encode(&serde_json::to_vec(&Ping { seq }).unwrap(), 5)
    }

    #[test]
    fn send_without_peers_is_noop() {
        let (transport, bus) = bus();
        bus.send(&Ping { seq: 1 }, SendMode::Reliable).unwrap();
        bus.send_raw(b"hello", SendMode::Unreliable).unwrap();
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn send_targets_connected_peers_only() {
        let (transport, bus) = bus();
        let a = PeerId::with_display_name("a");
        let b = PeerId::with_display_name("b");
        bus.on_peer_state_changed(a.clone(), PeerState::Connected);
        bus.on_peer_state_changed(b.clone(), PeerState::Connecting);

        bus.send(&Ping { seq: 42 }, SendMode::Reliable).unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let (bytes, to, mode) = &sent[0];
        assert_eq!(to, &vec![a]);
        assert_eq!(*mode, SendMode::Reliable);

        let frame = decode(bytes).unwrap();
        assert_eq!(frame.tag, 5);
        let ping: Ping = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(ping, Ping { seq: 42 });
    }

    #[test]
    fn disconnected_peer_is_excluded() {
        let (transport, bus) = bus();
        let a = PeerId::generate();
        let b = PeerId::generate();
        bus.on_peer_state_changed(a.clone(), PeerState::Connected);
        bus.on_peer_state_changed(b.clone(), PeerState::Connected);
        bus.on_peer_state_changed(b.clone(), PeerState::NotConnected);

        bus.send_raw(b"x", SendMode::Unreliable).unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].1, vec![a]);
        assert_eq!(decode(&sent[0].0).unwrap().tag, RAW);
    }

    #[test]
    fn tagged_send_frames_preencoded_body() {
        let (transport, bus) = bus();
        bus.send_tagged(5, b"{\"seq\":9}", SendMode::Reliable).unwrap();
        assert!(transport.sent().is_empty());

        let peer = PeerId::generate();
        bus.on_peer_state_changed(peer.clone(), PeerState::Connected);
        bus.send_tagged(5, b"{\"seq\":9}", SendMode::Unreliable)
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, vec![peer]);
        assert_eq!(sent[0].2, SendMode::Unreliable);
        let frame = decode(&sent[0].0).unwrap();
        assert_eq!(frame.tag, 5);
        let ping: Ping = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(ping, Ping { seq: 9 });
    }

    #[test]
    fn tagged_send_is_received_as_typed_message() {
        let (_transport, bus) = bus();
        let pings = bus.subscribe::<Ping>().unwrap();
        let body = serde_json::to_vec(&Ping { seq: 3 }).unwrap();
        bus.on_receive(PeerId::generate(), encode(&body, 5));
        assert_eq!(pings.try_recv().unwrap(), Ping { seq: 3 });
    }

    #[test]
    fn tagged_send_after_stop_fails() {
        let (transport, bus) = bus();
        bus.on_peer_state_changed(PeerId::generate(), PeerState::Connected);
        bus.stop();
        assert!(matches!(
            bus.send_tagged(5, b"{}", SendMode::Reliable),
            Err(BusError::Stopped)
        ));
        assert!(matches!(
            bus.send_raw(b"x", SendMode::Reliable),
            Err(BusError::Stopped)
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn unregistered_type_is_rejected() {
        #[derive(Debug, Clone)]
        struct Unknown;

        let (transport, bus) = bus();
        bus.on_peer_state_changed(PeerId::generate(), PeerState::Connected);

        let err = bus.send(&Unknown, SendMode::Reliable).unwrap_err();
        assert!(matches!(err, BusError::UnregisteredType { .. }));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn encode_failure_sends_nothing() {
        #[derive(Debug, Clone)]
        struct Broken;

        let (transport, bus) = bus();
        bus.register_with::<Broken, _, _>(
            9,
            |_| Err(BodyError::new("cannot encode")),
            |_| Ok(Broken),
        )
        .unwrap();
        bus.on_peer_state_changed(PeerId::generate(), PeerState::Connected);

        let err = bus.send(&Broken, SendMode::Reliable).unwrap_err();
        assert!(matches!(err, BusError::Encode { tag: 9, .. }));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn transport_failure_is_surfaced() {
        let (transport, bus) = bus();
        bus.on_peer_state_changed(PeerId::generate(), PeerState::Connected);
        transport.fail_send.store(true, Ordering::SeqCst);

        let err = bus.send(&Ping { seq: 1 }, SendMode::Reliable).unwrap_err();
        assert!(matches!(
            err,
            BusError::Transport(TransportError::SendFailed(_))
        ));
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let (_transport, bus) = bus();
        let err = bus.register::<Chat>(5).unwrap_err();
        assert!(matches!(
            err,
            BusError::Dispatch(DispatchError::DuplicateTag { tag: 5, .. })
        ));
        bus.register::<Ping>(5).unwrap();
    }

    #[test]
    fn inbound_frames_reach_subscribers() {
        let (_transport, bus) = bus();
        let pings = bus.subscribe::<Ping>().unwrap();
        let chats = bus.subscribe::<Chat>().unwrap();

        bus.on_receive(PeerId::generate(), ping_frame(7));

        assert_eq!(pings.try_recv().unwrap(), Ping { seq: 7 });
        assert_eq!(chats.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let (_transport, bus) = bus();
        let pings = bus.subscribe::<Ping>().unwrap();
        let raw = bus.subscribe_raw().unwrap();
        let peer = PeerId::generate();

        bus.on_receive(peer.clone(), Bytes::from_static(&[0, 0, 0]));
        let mut trailing = BytesMut::from(&ping_frame(1)[..]);
        trailing.extend_from_slice(b"junk");
        bus.on_receive(peer.clone(), trailing.freeze());
        bus.on_receive(peer.clone(), encode(b"{\"text\":1}", 6));
        bus.on_receive(peer.clone(), encode(b"{}", 200));

        assert_eq!(pings.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(raw.try_recv(), Err(TryRecvError::Empty));

        bus.on_receive(peer, ping_frame(2));
        assert_eq!(pings.try_recv().unwrap(), Ping { seq: 2 });
    }

    #[test]
    fn frames_from_local_identity_are_ignored() {
        let (_transport, bus) = bus();
        let pings = bus.subscribe::<Ping>().unwrap();
        bus.on_receive(bus.local_id().clone(), ping_frame(3));
        assert_eq!(pings.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn start_is_idempotent_and_validates_role() {
        let (transport, bus) = bus();
        assert!(matches!(bus.start(false, false), Err(BusError::InvalidRole)));
        assert!(!bus.is_running());

        bus.start(true, true).unwrap();
        bus.start(true, false).unwrap();
        assert!(bus.is_running());
        assert_eq!(transport.discovers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_closes_subscriptions_and_rejects_use() {
        let (transport, bus) = bus();
        bus.start(true, true).unwrap();
        let pings = bus.subscribe::<Ping>().unwrap();

        let waiter = thread::spawn(move || pings.recv());
        thread::sleep(Duration::from_millis(50));
        bus.stop();
        bus.stop();

        assert_eq!(waiter.join().unwrap(), None);
        assert_eq!(transport.stops.load(Ordering::SeqCst), 1);
        assert!(!bus.is_running());
        assert!(matches!(bus.start(true, true), Err(BusError::Stopped)));
        assert!(matches!(
            bus.send(&Ping { seq: 1 }, SendMode::Reliable),
            Err(BusError::Stopped)
        ));
        assert!(matches!(bus.subscribe::<Ping>(), Err(BusError::Stopped)));
    }

    #[test]
    fn drop_stops_discovery() {
        let (transport, bus) = bus();
        bus.start(false, true).unwrap();
        drop(bus);
        assert_eq!(transport.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_receive_and_state_changes() {
        let transport = Arc::new(RecordingTransport::default());
        let bus = Arc::new(MessageBus::with_config(
            Arc::clone(&transport),
            BusConfig {
                queue_capacity: 1024,
                ..BusConfig::default()
            },
        ));
        bus.register::<Ping>(5).unwrap();
        let pings = bus.subscribe::<Ping>().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    let peer = PeerId::generate();
                    for seq in 0..50 {
                        bus.on_peer_state_changed(peer.clone(), PeerState::Connected);
                        bus.on_receive(peer.clone(), ping_frame(worker * 100 + seq));
                        bus.send(&Ping { seq }, SendMode::Unreliable).unwrap();
                        bus.on_peer_state_changed(peer.clone(), PeerState::NotConnected);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pings.len(), 200);
        assert!(bus.connected_peers().is_empty());
    }
}
