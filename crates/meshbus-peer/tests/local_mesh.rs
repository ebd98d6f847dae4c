use std::time::Duration;

use bytes::Bytes;
use meshbus_dispatch::TryRecvError;
use meshbus_peer::{BusConfig, MessageBus};
use meshbus_transport::{LocalMesh, PeerState, SendMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ping {
    seq: i64,
}

fn bus(mesh: &LocalMesh, name: &str) -> MessageBus {
    let bus = MessageBus::with_config(
        mesh.transport(),
        BusConfig {
            display_name: Some(name.to_string()),
            ..BusConfig::default()
        },
    );
    bus.register::<Ping>(5).unwrap();
    bus
}

#[test]
fn ping_crosses_the_mesh() {
    let mesh = LocalMesh::new();
    let a = bus(&mesh, "a");
    let b = bus(&mesh, "b");
    let inbox = b.subscribe::<Ping>().unwrap();

    a.start(true, false).unwrap();
    b.start(false, true).unwrap();

    assert_eq!(a.peers().state_of(b.local_id()), PeerState::Connected);
    assert!(b.connected_peers().contains(a.local_id()));

    a.send(&Ping { seq: 42 }, SendMode::Reliable).unwrap();
    assert_eq!(
        inbox.recv_timeout(Duration::from_secs(1)).unwrap(),
        Ping { seq: 42 }
    );
}

#[test]
fn raw_payloads_cross_the_mesh() {
    let mesh = LocalMesh::new();
    let a = bus(&mesh, "a");
    let b = bus(&mesh, "b");
    let raw = b.subscribe_raw().unwrap();
    let pings = b.subscribe::<Ping>().unwrap();

    a.start(true, true).unwrap();
    b.start(true, true).unwrap();
    a.send_raw(b"opaque", SendMode::Unreliable).unwrap();

    assert_eq!(raw.try_recv().unwrap(), Bytes::from_static(b"opaque"));
    assert_eq!(pings.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn disconnected_peer_stops_receiving() {
    let mesh = LocalMesh::new();
    let hub = bus(&mesh, "hub");
    let near = bus(&mesh, "near");
    let far = bus(&mesh, "far");
    let near_inbox = near.subscribe::<Ping>().unwrap();
    let far_inbox = far.subscribe::<Ping>().unwrap();

    hub.start(true, false).unwrap();
    near.start(false, true).unwrap();
    far.start(false, true).unwrap();
    assert_eq!(hub.connected_peers().len(), 2);

    assert!(mesh.disconnect(hub.local_id(), far.local_id()));
    assert_eq!(hub.connected_peers().len(), 1);

    hub.send(&Ping { seq: 1 }, SendMode::Reliable).unwrap();
    assert_eq!(near_inbox.try_recv().unwrap(), Ping { seq: 1 });
    assert_eq!(far_inbox.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn stopping_a_bus_disconnects_it() {
    let mesh = LocalMesh::new();
    let a = bus(&mesh, "a");
    let b = bus(&mesh, "b");
    let inbox = b.subscribe::<Ping>().unwrap();

    a.start(true, true).unwrap();
    b.start(true, true).unwrap();
    b.stop();

    assert!(inbox.is_closed());
    assert!(a.connected_peers().is_empty());
    a.send(&Ping { seq: 9 }, SendMode::Reliable).unwrap();
}

#[test]
fn different_services_stay_apart() {
    let mesh = LocalMesh::new();
    let a = MessageBus::with_config(mesh.transport(), BusConfig::with_service("alpha"));
    let b = MessageBus::with_config(mesh.transport(), BusConfig::with_service("beta"));

    a.start(true, true).unwrap();
    b.start(true, true).unwrap();

    assert!(a.connected_peers().is_empty());
    assert!(b.connected_peers().is_empty());
}

#[test]
fn pre_encoded_body_arrives_as_typed_message() {
    let mesh = LocalMesh::new();
    let a = bus(&mesh, "a");
    let b = bus(&mesh, "b");
    let inbox = b.subscribe::<Ping>().unwrap();

    a.start(true, false).unwrap();
    b.start(false, true).unwrap();

    let body = serde_json::to_vec(&Ping { seq: 7 }).unwrap();
    a.send_tagged(5, &body, SendMode::Reliable).unwrap();
    assert_eq!(inbox.try_recv().unwrap(), Ping { seq: 7 });
}
