//! LAN discovery: UDP multicast beacon, parse beacons/responses, maintain peer list.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nearby_core::{PeerId, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};

const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 60, 61);
const BEACON_INTERVAL: Duration = Duration::from_secs(4);
const PEER_TIMEOUT: Duration = Duration::from_secs(16);

/// Datagram announcing a peer and its transport port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub v: u8,
    pub peer: PeerId,
    pub port: u16,
    /// Set on unicast answers to a beacon, so they are not answered again.
    #[serde(default)]
    pub reply: bool,
}

impl Beacon {
    fn parse(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Beacon>(bytes)
            .ok()
            .filter(|b| b.v == PROTOCOL_VERSION)
    }
}

struct PeerState {
    addr: SocketAddr,
    last_seen: Instant,
}

type Peers = Arc<Mutex<HashMap<PeerId, PeerState>>>;

/// Announce `local` and report every beacon heard on `connect_tx` as (peer, transport
/// address). The transport drops reports for peers it is already connected to, so a
/// lost connection is redialed on the peer's next beacon.
pub async fn run_discovery(
    local: PeerId,
    discovery_port: u16,
    transport_port: u16,
    connect_tx: mpsc::UnboundedSender<(PeerId, SocketAddr)>,
) -> std::io::Result<()> {
    let socket = Arc::new(make_multicast_socket(discovery_port)?);
    let peers: Peers = Arc::new(Mutex::new(HashMap::new()));
    let beacon = Beacon {
        v: PROTOCOL_VERSION,
        peer: local,
        port: transport_port,
        reply: false,
    };

    let beacon_task = tokio::spawn(beacon_loop(socket.clone(), beacon.clone(), discovery_port));
    let recv_task = tokio::spawn(recv_loop(socket, peers.clone(), beacon, connect_tx));
    let timeout_task = tokio::spawn(peer_timeout_loop(peers));

    let (beacons, recv, _) = tokio::try_join!(beacon_task, recv_task, timeout_task)?;
    beacons?;
    recv?;
    Ok(())
}

fn make_multicast_socket(discovery_port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, discovery_port))?;
    std_sock.join_multicast_v4(&MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    std_sock.set_multicast_ttl_v4(1)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

async fn beacon_loop(
    socket: Arc<UdpSocket>,
    beacon: Beacon,
    discovery_port: u16,
) -> std::io::Result<()> {
    let datagram = serde_json::to_vec(&beacon)?;
    let dest = SocketAddr::from((MULTICAST_GROUP, discovery_port));
    loop {
        if let Err(e) = socket.send_to(&datagram, dest).await {
            tracing::debug!(error = %e, "beacon send failed");
        }
        tokio::time::sleep(BEACON_INTERVAL).await;
    }
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    peers: Peers,
    me: Beacon,
    connect_tx: mpsc::UnboundedSender<(PeerId, SocketAddr)>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; 65536];
    let response = serde_json::to_vec(&Beacon {
        reply: true,
        ..me.clone()
    })?;

    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let Some(beacon) = Beacon::parse(&buf[..n]) else {
            continue;
        };
        if beacon.peer == me.peer {
            continue;
        }
        let addr = SocketAddr::new(from.ip(), beacon.port);
        let is_new = {
            let mut p = peers.lock().await;
            p.insert(
                beacon.peer.clone(),
                PeerState {
                    addr,
                    last_seen: Instant::now(),
                },
            )
            .map_or(true, |old| old.addr != addr)
        };
        if is_new {
            tracing::info!(peer = %beacon.peer, %addr, "discovered peer");
        }
        let _ = connect_tx.send((beacon.peer.clone(), addr));
        if !beacon.reply {
            let _ = socket.send_to(&response, from).await;
        }
    }
}

async fn peer_timeout_loop(peers: Peers) {
    loop {
        tokio::time::sleep(BEACON_INTERVAL).await;
        let now = Instant::now();
        let mut p = peers.lock().await;
        p.retain(|peer, s| {
            let alive = now.duration_since(s.last_seen) < PEER_TIMEOUT;
            if !alive {
                tracing::debug!(peer = %peer, "peer beacon expired");
            }
            alive
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_wire_shape() {
        let b = Beacon {
            v: PROTOCOL_VERSION,
            peer: PeerId::new("kitchen"),
            port: 45679,
            reply: false,
        };
        let v: serde_json::Value = serde_json::to_value(&b).unwrap();
        assert_eq!(v["peer"], "kitchen");
        assert_eq!(v["port"], 45679);
        assert_eq!(Beacon::parse(&serde_json::to_vec(&b).unwrap()), Some(b));
    }

    #[test]
    fn foreign_versions_and_noise_are_ignored() {
        assert_eq!(Beacon::parse(br#"{"v":99,"peer":"x","port":1}"#), None);
        assert_eq!(Beacon::parse(b"not json"), None);
        let b = Beacon::parse(br#"{"v":1,"peer":"x","port":1}"#).unwrap();
        assert!(!b.reply);
    }
}
