//! In-process transport: every peer joined to a [`MemoryHub`] can reach every other.
//! Used by tests and by hosts that want to run several cores in one process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::identity::PeerId;
use crate::transport::{Transport, TransportError, TransportEvent};

type Inboxes = Arc<Mutex<HashMap<PeerId, mpsc::UnboundedSender<TransportEvent>>>>;

#[derive(Clone, Default)]
pub struct MemoryHub {
    inboxes: Inboxes,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `peer`. Existing members and the newcomer each see a `Connected` event for the other.
    pub fn join(
        &self,
        peer: impl Into<PeerId>,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let peer = peer.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inboxes = self.inboxes.lock();
        for (other, other_tx) in inboxes.iter() {
            let _ = other_tx.send(TransportEvent::Connected(peer.clone()));
            let _ = tx.send(TransportEvent::Connected(other.clone()));
        }
        inboxes.insert(peer.clone(), tx);
        (
            MemoryTransport {
                me: peer,
                inboxes: self.inboxes.clone(),
            },
            rx,
        )
    }

    /// Remove `peer`; remaining members see `Disconnected`.
    pub fn leave(&self, peer: &PeerId) {
        let mut inboxes = self.inboxes.lock();
        if inboxes.remove(peer).is_some() {
            for tx in inboxes.values() {
                let _ = tx.send(TransportEvent::Disconnected(peer.clone()));
            }
        }
    }
}

pub struct MemoryTransport {
    me: PeerId,
    inboxes: Inboxes,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self
            .inboxes
            .lock()
            .keys()
            .filter(|p| **p != self.me)
            .cloned()
            .collect();
        peers.sort();
        peers
    }

    async fn send(&self, peer: &PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let inboxes = self.inboxes.lock();
        let tx = inboxes
            .get(peer)
            .ok_or_else(|| TransportError::Unreachable(peer.clone()))?;
        tx.send(TransportEvent::Received(self.me.clone(), bytes))
            .map_err(|_| TransportError::SendFailed {
                peer: peer.clone(),
                reason: "inbox closed".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_announces_both_directions() {
        let hub = MemoryHub::new();
        let (_a, mut a_rx) = hub.join("a");
        let (b, mut b_rx) = hub.join("b");
        assert_eq!(
            a_rx.recv().await,
            Some(TransportEvent::Connected(PeerId::new("b")))
        );
        assert_eq!(
            b_rx.recv().await,
            Some(TransportEvent::Connected(PeerId::new("a")))
        );
        assert_eq!(b.connected_peers().await, vec![PeerId::new("a")]);
    }

    #[tokio::test]
    async fn send_delivers_tagged_bytes() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join("a");
        let (_b, mut b_rx) = hub.join("b");
        // Connected(a)
        b_rx.recv().await;
        a.send(&PeerId::new("b"), b"hi".to_vec()).await.unwrap();
        assert_eq!(
            b_rx.recv().await,
            Some(TransportEvent::Received(PeerId::new("a"), b"hi".to_vec()))
        );
    }

    #[tokio::test]
    async fn send_to_absent_peer_fails() {
        let hub = MemoryHub::new();
        let (a, _a_rx) = hub.join("a");
        let (_b, _b_rx) = hub.join("b");
        hub.leave(&PeerId::new("b"));
        assert_eq!(
            a.send(&PeerId::new("b"), vec![1]).await,
            Err(TransportError::Unreachable(PeerId::new("b")))
        );
    }
}
