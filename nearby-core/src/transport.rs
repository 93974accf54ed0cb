//! Transport adapter contract. Implemented by the host (radio link, TCP, in-memory);
//! the core only sends bytes to a peer and consumes [`TransportEvent`]s.

use async_trait::async_trait;

use crate::identity::PeerId;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Peers the link currently reports as connected.
    async fn connected_peers(&self) -> Vec<PeerId>;

    /// Hand one encoded message to the link. Resolves once the link accepted it.
    async fn send(&self, peer: &PeerId, bytes: Vec<u8>) -> Result<(), TransportError>;
}

/// What the transport reports to the core, in order per peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected(PeerId),
    Disconnected(PeerId),
    Received(PeerId, Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} unreachable")]
    Unreachable(PeerId),
    #[error("send to {peer} failed: {reason}")]
    SendFailed { peer: PeerId, reason: String },
    #[error("transport closed")]
    Closed,
}
