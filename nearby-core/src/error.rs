//! Errors surfaced to callers of the network manager.

use std::time::Duration;

use crate::content::ContentId;
use crate::identity::PeerId;
use crate::protocol::{ErrorCode, MessageType};
use crate::store::StoreError;
use crate::transport::TransportError;
use crate::wire::{DecodeError, EncodeError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("no response from {peer} within {after:?}")]
    Timeout { peer: PeerId, after: Duration },

    #[error("content {0} not available to us")]
    AccessDenied(ContentId),

    #[error("content {0} not found")]
    NotFound(ContentId),

    #[error("peer {0} disconnected before responding")]
    Disconnected(PeerId),

    #[error("peer error {code}: {message}")]
    Remote { code: ErrorCode, message: String },

    #[error("unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        expected: MessageType,
        got: MessageType,
    },
}

impl SyncError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Timeout { .. } | SyncError::Disconnected(_)
        )
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SyncError::NotFound(id),
            StoreError::AccessDenied(id) => SyncError::AccessDenied(id),
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
