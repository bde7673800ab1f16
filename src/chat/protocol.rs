//! Chat Wire Protocol
//!
//! One JSON envelope schema, tagged by `type`, shared by the client session
//! and the development server.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A user chat message
    Message { content: String },
}

/// Frames sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// A complete assistant reply
    Message {
        #[serde(alias = "message")]
        content: String,
    },
    /// One token of a streamed assistant reply
    Chunk { content: String },
    /// The streamed reply is finished
    StreamEnd,
    /// Server-assigned session id the client should adopt
    UserId { user_id: String },
    /// Transient notification addressed to this session
    PersonalMessage {
        #[serde(alias = "content")]
        message: String,
    },
    /// Server-side failure
    Error {
        #[serde(alias = "message")]
        error: String,
    },
}

const CLIENT_TYPES: &[&str] = &["message"];
const SERVER_TYPES: &[&str] = &[
    "message",
    "chunk",
    "stream_end",
    "user_id",
    "personal_message",
    "error",
];

/// Errors decoding or encoding a frame
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Not JSON, or fields don't match the declared type
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// JSON object without a string `type` field
    #[error("Frame has no type discriminant")]
    MissingType,

    /// Discriminant we don't know how to handle
    #[error("Unknown frame type: {0}")]
    UnknownType(String),
}

impl ClientFrame {
    pub fn message(content: impl Into<String>) -> Self {
        ClientFrame::Message {
            content: content.into(),
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, CLIENT_TYPES)
    }
}

impl ServerFrame {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, SERVER_TYPES)
    }
}

/// Decode a tagged envelope, separating unknown discriminants from bad payloads
fn decode_tagged<T: serde::de::DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    if !known.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_string()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}
