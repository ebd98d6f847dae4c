use meshbus_peer::{BusConfig, MessageBus};
use meshbus_transport::{LocalMesh, SendMode};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cmd::SimulateArgs;
use crate::exit::{bus_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print, OutputFormat, Render};

const PING_TAG: u8 = 1;
const MAX_PEERS: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Ping {
    seq: i64,
}

#[derive(Debug, Serialize)]
struct PeerReport {
    peer: String,
    connected: usize,
    sent: usize,
    received: u64,
    buffered: usize,
    evicted: u64,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    service: String,
    peers: usize,
    count: usize,
    queue_capacity: usize,
    results: Vec<PeerReport>,
}

impl Render for SimulationReport {
    fn header(&self) -> Vec<&'static str> {
        vec!["PEER", "CONNECTED", "SENT", "RECEIVED", "BUFFERED", "EVICTED"]
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.results
            .iter()
            .map(|r| {
                vec![
                    r.peer.clone(),
                    r.connected.to_string(),
                    r.sent.to_string(),
                    r.received.to_string(),
                    r.buffered.to_string(),
                    r.evicted.to_string(),
                ]
            })
            .collect()
    }

    fn pretty(&self) -> String {
        self.results
            .iter()
            .map(|r| {
                format!(
                    "{}: connected={} sent={} received={} buffered={} evicted={}",
                    r.peer, r.connected, r.sent, r.received, r.buffered, r.evicted
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let report = simulate(&args)?;
    print(&report, format);
    Ok(SUCCESS)
}

fn simulate(args: &SimulateArgs) -> CliResult<SimulationReport> {
    if args.peers == 0 || args.peers > MAX_PEERS {
        return Err(CliError::new(
            USAGE,
            format!("--peers must be between 1 and {MAX_PEERS}"),
        ));
    }
    if args.queue_capacity == 0 {
        return Err(CliError::new(USAGE, "--queue-capacity must be at least 1"));
    }

    let mesh = LocalMesh::new();
    let mut nodes = Vec::with_capacity(args.peers);
    for index in 0..args.peers {
        let bus = MessageBus::with_config(
            mesh.transport(),
            BusConfig {
                service_name: args.service.clone(),
                display_name: Some(format!("peer-{index}")),
                queue_capacity: args.queue_capacity,
            },
        );
        bus.register::<Ping>(PING_TAG)
            .map_err(|err| bus_error("register failed", err))?;
        let inbox = bus
            .subscribe::<Ping>()
            .map_err(|err| bus_error("subscribe failed", err))?;
        bus.start(true, true)
            .map_err(|err| bus_error("start failed", err))?;
        nodes.push((bus, inbox));
    }
    info!(peers = args.peers, service = %args.service, "mesh formed");

    for (bus, _) in &nodes {
        for seq in 0..args.count {
            bus.send(&Ping { seq: seq as i64 }, SendMode::Reliable)
                .map_err(|err| bus_error("send failed", err))?;
        }
    }

    let results = nodes
        .iter()
        .map(|(bus, inbox)| {
            let buffered = inbox.len();
            let evicted = inbox.evicted();
            PeerReport {
                peer: bus.local_id().to_string(),
                connected: bus.connected_peers().len(),
                sent: args.count,
                received: buffered as u64 + evicted,
                buffered,
                evicted,
            }
        })
        .collect();

    for (bus, _) in &nodes {
        bus.stop();
    }

    Ok(SimulationReport {
        service: args.service.clone(),
        peers: args.peers,
        count: args.count,
        queue_capacity: args.queue_capacity,
        results,
    })
}
