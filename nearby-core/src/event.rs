//! Events emitted to the application.

use crate::content::ContentId;
use crate::identity::PeerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Manager started its inbound and sync loops.
    Initialized { local: PeerId },
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    /// A feed pull from `peer` completed; `count` new items entered the cache.
    FeedUpdated { peer: PeerId, count: usize },
    ContentReceived { peer: PeerId, content_id: ContentId },
    /// The peer reported an error nobody was waiting for, or a pull from it failed.
    PeerError { peer: PeerId, message: String },
    /// Bytes from `peer` could not be decoded and were dropped.
    ProtocolError { peer: PeerId, message: String },
    /// A DATA_SHARE was not acknowledged. Not retried.
    ShareUnacknowledged {
        peer: PeerId,
        content_id: ContentId,
        reason: String,
    },
}
