//! Envelope codec (JSON `{id, type, payload, ts}`) and length-prefix framing for stream transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::identity::MessageId;
use crate::protocol::{Message, MessageType, Payload};

const LEN_SIZE: usize = 4;
/// Largest frame accepted from a stream (16 MiB).
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    id: &'a MessageId,
    #[serde(rename = "type")]
    kind: MessageType,
    payload: &'a Payload,
    ts: i64,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    id: MessageId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    ts: i64,
}

/// Encode a message into its self-describing JSON envelope.
pub fn encode(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let envelope = EnvelopeOut {
        id: &msg.id,
        kind: msg.message_type(),
        payload: &msg.payload,
        ts: msg.timestamp,
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Error encoding a message. Payload types only contain string-keyed maps,
/// so this is not expected for any value the protocol module can build.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode one envelope. Purely a data transform: never consults peer state.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let envelope: EnvelopeIn = serde_json::from_slice(bytes)
        .map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;
    let kind = MessageType::from_tag(&envelope.kind).ok_or_else(|| {
        DecodeError::UnknownMessageType {
            id: envelope.id.clone(),
            tag: envelope.kind.clone(),
        }
    })?;
    let payload = Payload::from_value(kind, envelope.payload).map_err(|source| {
        DecodeError::PayloadSchemaError {
            id: envelope.id.clone(),
            kind,
            source,
        }
    })?;
    Ok(Message {
        id: envelope.id,
        payload,
        timestamp: envelope.ts,
    })
}

/// Error decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not a JSON object, or `id`/`type` missing or not strings.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("unknown message type `{tag}`")]
    UnknownMessageType { id: MessageId, tag: String },
    #[error("invalid {kind} payload: {source}")]
    PayloadSchemaError {
        id: MessageId,
        kind: MessageType,
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Id of the offending message when the envelope itself was readable.
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            DecodeError::MalformedEnvelope(_) => None,
            DecodeError::UnknownMessageType { id, .. } => Some(id),
            DecodeError::PayloadSchemaError { id, .. } => Some(id),
        }
    }
}

/// Write one frame: 4 bytes LE length + body.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| FrameError::TooLarge)?;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge);
    }
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame body. `Ok(None)` on clean EOF before a length prefix.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; LEN_SIZE];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge);
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Error reading or writing a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too large")]
    TooLarge,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
