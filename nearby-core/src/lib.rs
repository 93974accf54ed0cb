//! Nearby sync core: protocol codec, visibility-aware content store and the network
//! manager that correlates requests with responses over any byte transport.
//! The host supplies a [`Transport`] and feeds its [`TransportEvent`]s to the manager.

pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod identity;
pub mod manager;
pub mod memory;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod wire;

mod pending;

pub use config::SyncConfig;
pub use content::{Access, ContentId, ContentItem, ContentPayload, DetailLevel, FeedItem, ReceivedContent};
pub use error::{SyncError, SyncResult};
pub use event::SyncEvent;
pub use identity::{MessageId, PeerId};
pub use manager::{NetworkManager, PullSummary, ShareReport, SyncHandle};
pub use memory::{MemoryHub, MemoryTransport};
pub use protocol::{ErrorCode, Message, MessageType, Payload, PROTOCOL_VERSION};
pub use session::PeerSession;
pub use store::{ContentStore, StoreError};
pub use transport::{Transport, TransportError, TransportEvent};
