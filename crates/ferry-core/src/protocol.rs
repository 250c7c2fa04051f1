//! Wire protocol message definitions.
//!
//! Control traffic is JSON over text frames, shaped as
//! `{"type": <kind>, "value": <payload>}`. File payloads travel as raw
//! binary frames and never pass through this module.

use crate::connection::ClientId;
use crate::error::{ProtocolError, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Acknowledgement text sent to a sender after dispatch
pub const ACK_OK: &str = "OK";

/// Error text sent to a sender whose recipient is not connected
pub const RECIPIENT_NOT_FOUND: &str = "Recipient not found";

/// Error text sent to a client refused because the relay is full
pub const SERVER_FULL: &str = "Server at capacity";

/// Control frames a client sends to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    /// Select the target of the next transfer
    Recipient(ClientId),
    /// Declare how many files follow; resets accumulation
    FilesLength(usize),
    /// Metadata for the next file (opaque to the relay)
    MetaData(Value),
    /// A well-formed frame of a type the relay does not handle
    Unknown(String),
}

impl ControlFrame {
    /// Parse a text frame.
    ///
    /// `files-length` accepts either a JSON integer or a decimal string,
    /// since browser clients commonly send the count stringified.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the text is not a JSON object with a
    /// string `type`, or if a known type carries an unusable value.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let parsed: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

        let Value::Object(mut fields) = parsed else {
            return Err(ProtocolError::InvalidJson("expected a JSON object".to_string()));
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => {
                return Err(ProtocolError::InvalidJson(
                    "missing string `type` field".to_string(),
                ));
            }
        };
        let value = fields.remove("value").unwrap_or(Value::Null);

        match kind.as_str() {
            "recipient" => match value {
                Value::String(id) => Ok(ControlFrame::Recipient(ClientId::from(id))),
                other => Err(ProtocolError::InvalidRecipient(other.to_string())),
            },
            "files-length" => parse_file_count(&value).map(ControlFrame::FilesLength),
            "meta-data" => Ok(ControlFrame::MetaData(value)),
            _ => Ok(ControlFrame::Unknown(kind)),
        }
    }

    /// Get the frame type name
    #[must_use]
    pub fn frame_type(&self) -> &str {
        match self {
            ControlFrame::Recipient(_) => "recipient",
            ControlFrame::FilesLength(_) => "files-length",
            ControlFrame::MetaData(_) => "meta-data",
            ControlFrame::Unknown(kind) => kind,
        }
    }
}

fn parse_file_count(value: &Value) -> Result<usize, ProtocolError> {
    let count = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    count
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| ProtocolError::InvalidFileCount(value.to_string()))
}

/// Messages the relay sends to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Roster update: every other connected client
    Clients(Vec<ClientId>),
    /// Forwarded file count, sent to a recipient before any file
    FilesLength(usize),
    /// Forwarded per-file metadata
    MetaData(Value),
    /// Informational message (transfer acknowledgement)
    Message(String),
    /// Error notification
    Error(String),
}

impl ServerMessage {
    /// Serialize to the JSON text sent on the wire
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if encoding fails.
    pub fn to_text(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from wire JSON text
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Serialization`] if the text is not a relay message.
    pub fn from_text(text: &str) -> Result<Self, RelayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Get the message type name
    #[must_use]
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::Clients(_) => "clients",
            ServerMessage::FilesLength(_) => "files-length",
            ServerMessage::MetaData(_) => "meta-data",
            ServerMessage::Message(_) => "message",
            ServerMessage::Error(_) => "error",
        }
    }
}
