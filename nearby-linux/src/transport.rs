//! TCP transport: one connection per peer, a hello frame naming each side, then
//! length-prefixed message frames in both directions.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nearby_core::wire::{read_frame, write_frame};
use nearby_core::{PeerId, Transport, TransportError, TransportEvent, PROTOCOL_VERSION};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A handshaken connection whose sender is in the peer map.
struct Registered {
    peer: PeerId,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

type PeerSenders = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>>;

#[derive(Clone)]
pub struct TcpTransport {
    local: PeerId,
    senders: PeerSenders,
    /// Peers with an outbound dial or handshake in progress.
    dialing: Arc<Mutex<HashSet<PeerId>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl TcpTransport {
    /// Transport for `local`, plus the event stream to hand to the network manager.
    pub fn new(local: PeerId) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                local,
                senders: Arc::new(Mutex::new(HashMap::new())),
                dialing: Arc::new(Mutex::new(HashSet::new())),
                events,
            },
            rx,
        )
    }

    /// Accept inbound connections on `port` and dial peers arriving on `connect_rx`.
    /// Discovery reports a peer on every beacon, so a dropped or failed connection is
    /// retried within one beacon interval.
    pub async fn run(
        self,
        port: u16,
        mut connect_rx: mpsc::UnboundedReceiver<(PeerId, SocketAddr)>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        tracing::info!(port, "transport listening");
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_conn(stream, None).await {
                            tracing::debug!(%addr, error = %e, "inbound connection ended");
                        }
                    });
                }
                Some((peer, addr)) = connect_rx.recv() => {
                    if !self.begin_dial(&peer).await {
                        continue;
                    }
                    let this = self.clone();
                    tokio::spawn(async move {
                        let result = match TcpStream::connect(addr).await {
                            Ok(stream) => this.handle_conn(stream, Some(&peer)).await,
                            Err(e) => {
                                this.dialing.lock().await.remove(&peer);
                                Err(e)
                            }
                        };
                        if let Err(e) = result {
                            tracing::debug!(peer = %peer, %addr, error = %e, "outbound connection ended");
                        }
                    });
                }
            }
        }
    }

    /// Claim the dial to `peer` if one should happen now; false if not our turn or already
    /// connected or dialing.
    async fn begin_dial(&self, peer: &PeerId) -> bool {
        let connected = self.senders.lock().await.contains_key(peer);
        let mut dialing = self.dialing.lock().await;
        if !should_dial(&self.local, peer, connected, dialing.contains(peer)) {
            return false;
        }
        dialing.insert(peer.clone());
        true
    }

    /// Run one connection to completion. `dialed` is the peer we dialed, whose claim in
    /// `dialing` is released once the connection is registered or has failed.
    async fn handle_conn(&self, stream: TcpStream, dialed: Option<&PeerId>) -> std::io::Result<()> {
        let registered = self.register(stream).await;
        if let Some(p) = dialed {
            self.dialing.lock().await.remove(p);
        }
        match registered? {
            Some(conn) => self.serve(conn).await,
            None => Ok(()),
        }
    }

    /// Exchange hellos and record the peer's sender. `None` for self or duplicate connections.
    async fn register(&self, stream: TcpStream) -> std::io::Result<Option<Registered>> {
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();

        write_frame(&mut writer, &hello(&self.local))
            .await
            .map_err(io_error)?;
        let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, read_frame(&mut reader))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "handshake timed out"))?
            .map_err(io_error)?;
        let peer = frame
            .as_deref()
            .and_then(parse_hello)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad hello"))?;
        if peer == self.local {
            return Ok(None);
        }

        let (tx, rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let mut senders = self.senders.lock().await;
        if senders.contains_key(&peer) {
            tracing::debug!(peer = %peer, "duplicate connection dropped");
            return Ok(None);
        }
        senders.insert(peer.clone(), tx.clone());
        Ok(Some(Registered {
            peer,
            tx,
            rx,
            reader,
            writer,
        }))
    }

    async fn serve(&self, conn: Registered) -> std::io::Result<()> {
        let Registered {
            peer,
            tx,
            mut rx,
            mut reader,
            mut writer,
        } = conn;
        tracing::info!(peer = %peer, "peer connected");
        let _ = self.events.send(TransportEvent::Connected(peer.clone()));

        let write_task = tokio::spawn(async move {
            while let Some(body) = rx.recv().await {
                if write_frame(&mut writer, &body).await.is_err() {
                    break;
                }
            }
        });

        let result = loop {
            match read_frame(&mut reader).await {
                Ok(Some(body)) => {
                    let _ = self
                        .events
                        .send(TransportEvent::Received(peer.clone(), body));
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(io_error(e)),
            }
        };

        write_task.abort();
        {
            let mut senders = self.senders.lock().await;
            if senders.get(&peer).is_some_and(|s| s.same_channel(&tx)) {
                senders.remove(&peer);
            }
        }
        tracing::info!(peer = %peer, "peer disconnected");
        let _ = self.events.send(TransportEvent::Disconnected(peer));
        result
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.senders.lock().await.keys().cloned().collect();
        peers.sort();
        peers
    }

    async fn send(&self, peer: &PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let senders = self.senders.lock().await;
        let tx = senders
            .get(peer)
            .ok_or_else(|| TransportError::Unreachable(peer.clone()))?;
        tx.send(bytes).map_err(|_| TransportError::SendFailed {
            peer: peer.clone(),
            reason: "connection closing".into(),
        })
    }
}

/// The lower id dials, so each pair ends up with one connection. Beacons repeat, so
/// a peer that is neither connected nor being dialed gets dialed again.
fn should_dial(local: &PeerId, peer: &PeerId, connected: bool, dialing: bool) -> bool {
    local < peer && !connected && !dialing
}

/// Hello frame: protocol version byte followed by the UTF-8 peer name.
fn hello(local: &PeerId) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + local.as_str().len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(local.as_str().as_bytes());
    out
}

fn parse_hello(frame: &[u8]) -> Option<PeerId> {
    let (&version, name) = frame.split_first()?;
    if version != PROTOCOL_VERSION || name.is_empty() {
        return None;
    }
    std::str::from_utf8(name).ok().map(PeerId::new)
}

fn io_error(e: nearby_core::wire::FrameError) -> std::io::Error {
    match e {
        nearby_core::wire::FrameError::Io(e) => e,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let me = PeerId::new("living-room");
        assert_eq!(parse_hello(&hello(&me)), Some(me));
        assert_eq!(parse_hello(&[PROTOCOL_VERSION]), None);
        assert_eq!(parse_hello(&[PROTOCOL_VERSION + 1, b'x']), None);
        assert_eq!(parse_hello(&[]), None);
    }

    #[test]
    fn dial_decision() {
        let a = PeerId::new("a");
        let b = PeerId::new("b");
        assert!(should_dial(&a, &b, false, false));
        assert!(!should_dial(&b, &a, false, false));
        assert!(!should_dial(&a, &a, false, false));
        assert!(!should_dial(&a, &b, true, false));
        assert!(!should_dial(&a, &b, false, true));
    }

    #[tokio::test]
    async fn dropped_connection_is_redialed_on_next_report() {
        let (a, mut a_events) = TcpTransport::new(PeerId::new("a"));
        let b_id = PeerId::new("b");
        assert!(a.begin_dial(&b_id).await);
        // A second beacon while the dial is in flight is ignored.
        assert!(!a.begin_dial(&b_id).await);

        let (tx, _rx) = mpsc::unbounded_channel();
        a.dialing.lock().await.remove(&b_id);
        a.senders.lock().await.insert(b_id.clone(), tx);
        assert!(!a.begin_dial(&b_id).await);

        // Connection drops: handle_conn clears the sender.
        a.senders.lock().await.remove(&b_id);
        assert!(a.begin_dial(&b_id).await);
        assert!(a_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn two_transports_exchange_frames() {
        let (a, mut a_events) = TcpTransport::new(PeerId::new("a"));
        let (b, mut b_events) = TcpTransport::new(PeerId::new("b"));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let b_side = b.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = b_side.handle_conn(stream, None).await;
        });
        let a_side = a.clone();
        assert!(a.begin_dial(&PeerId::new("b")).await);
        tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let _ = a_side.handle_conn(stream, Some(&PeerId::new("b"))).await;
        });

        assert_eq!(
            a_events.recv().await,
            Some(TransportEvent::Connected(PeerId::new("b")))
        );
        assert_eq!(
            b_events.recv().await,
            Some(TransportEvent::Connected(PeerId::new("a")))
        );
        assert_eq!(a.connected_peers().await, vec![PeerId::new("b")]);
        // The dial claim was released once the connection registered.
        assert!(a.dialing.lock().await.is_empty());
        assert!(!a.begin_dial(&PeerId::new("b")).await);

        a.send(&PeerId::new("b"), b"hi".to_vec()).await.unwrap();
        assert_eq!(
            b_events.recv().await,
            Some(TransportEvent::Received(PeerId::new("a"), b"hi".to_vec()))
        );
        assert_eq!(
            a.send(&PeerId::new("zed"), vec![]).await,
            Err(TransportError::Unreachable(PeerId::new("zed")))
        );
    }
}
