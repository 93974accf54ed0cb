//! Nearby wire protocol: message types, typed payloads and the message envelope.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::{ContentId, ContentPayload, DetailLevel, FeedItem};
use crate::identity::{now_millis, MessageId};

/// Current protocol version. Carried in the transport hello, not in every envelope.
pub const PROTOCOL_VERSION: u8 = 1;

/// Closed set of message kinds. Serialized as the envelope's `type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Ping,
    Pong,
    FeedRequest,
    FeedResponse,
    ContentRequest,
    ContentResponse,
    DataShare,
    DataAck,
    Error,
}

impl MessageType {
    pub const ALL: [MessageType; 9] = [
        MessageType::Ping,
        MessageType::Pong,
        MessageType::FeedRequest,
        MessageType::FeedResponse,
        MessageType::ContentRequest,
        MessageType::ContentResponse,
        MessageType::DataShare,
        MessageType::DataAck,
        MessageType::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::FeedRequest => "FEED_REQUEST",
            MessageType::FeedResponse => "FEED_RESPONSE",
            MessageType::ContentRequest => "CONTENT_REQUEST",
            MessageType::ContentResponse => "CONTENT_RESPONSE",
            MessageType::DataShare => "DATA_SHARE",
            MessageType::DataAck => "DATA_ACK",
            MessageType::Error => "ERROR",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }

    /// Whether the receiver owes the sender a correlated reply.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            MessageType::Ping
                | MessageType::FeedRequest
                | MessageType::ContentRequest
                | MessageType::DataShare
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PING and PONG carry an empty object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    /// Exclusive lower bound on item timestamps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,
    /// Category allow-list; absent means every category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResponse {
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub content_id: ContentId,
    pub detail_level: DetailLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub content_id: ContentId,
    pub detail_level: DetailLevel,
    /// `null` when the responder no longer has the item.
    pub data: Option<ContentPayload>,
}

/// Unsolicited push of content to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataShare {
    pub data_type: String,
    pub data: Value,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataAck {
    pub message_id: MessageId,
}

/// Error codes carried by ERROR. Unrecognized codes survive decoding as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    ContentNotAvailable,
    UnknownMessageType,
    MalformedRequest,
    Internal,
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::ContentNotAvailable => "CONTENT_NOT_AVAILABLE",
            ErrorCode::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            ErrorCode::MalformedRequest => "MALFORMED_REQUEST",
            ErrorCode::Internal => "INTERNAL_ERROR",
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "CONTENT_NOT_AVAILABLE" => ErrorCode::ContentNotAvailable,
            "UNKNOWN_MESSAGE_TYPE" => ErrorCode::UnknownMessageType,
            "MALFORMED_REQUEST" => ErrorCode::MalformedRequest,
            "INTERNAL_ERROR" => ErrorCode::Internal,
            _ => ErrorCode::Other(code),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        code.as_str().to_string()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

/// Typed message body, one variant per [`MessageType`].
/// Serializes as the bare payload object; the tag travels separately in the envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Ping(Empty),
    Pong(Empty),
    FeedRequest(FeedRequest),
    FeedResponse(FeedResponse),
    ContentRequest(ContentRequest),
    ContentResponse(ContentResponse),
    DataShare(DataShare),
    DataAck(DataAck),
    Error(ErrorPayload),
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Ping(_) => MessageType::Ping,
            Payload::Pong(_) => MessageType::Pong,
            Payload::FeedRequest(_) => MessageType::FeedRequest,
            Payload::FeedResponse(_) => MessageType::FeedResponse,
            Payload::ContentRequest(_) => MessageType::ContentRequest,
            Payload::ContentResponse(_) => MessageType::ContentResponse,
            Payload::DataShare(_) => MessageType::DataShare,
            Payload::DataAck(_) => MessageType::DataAck,
            Payload::Error(_) => MessageType::Error,
        }
    }

    /// Parse `value` as the payload schema of `kind`. PING/PONG accept any body.
    pub fn from_value(kind: MessageType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            MessageType::Ping => Payload::Ping(Empty {}),
            MessageType::Pong => Payload::Pong(Empty {}),
            MessageType::FeedRequest => Payload::FeedRequest(serde_json::from_value(value)?),
            MessageType::FeedResponse => Payload::FeedResponse(serde_json::from_value(value)?),
            MessageType::ContentRequest => Payload::ContentRequest(serde_json::from_value(value)?),
            MessageType::ContentResponse => {
                Payload::ContentResponse(serde_json::from_value(value)?)
            }
            MessageType::DataShare => Payload::DataShare(serde_json::from_value(value)?),
            MessageType::DataAck => Payload::DataAck(serde_json::from_value(value)?),
            MessageType::Error => Payload::Error(serde_json::from_value(value)?),
        })
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Payload::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }
}

/// The wire unit: correlation id, typed payload and send time (epoch ms).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub payload: Payload,
    pub timestamp: i64,
}

impl Message {
    /// New message with a fresh id.
    pub fn new(payload: Payload) -> Self {
        Self {
            id: MessageId::generate(),
            payload,
            timestamp: now_millis(),
        }
    }

    /// Reply to `request_id`, echoing it so the requester can correlate.
    pub fn reply(request_id: MessageId, payload: Payload) -> Self {
        Self {
            id: request_id,
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}
