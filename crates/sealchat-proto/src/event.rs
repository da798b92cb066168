//! Real-time channel events
//!
//! The channel carries named events with a JSON body. The client emits
//! [`OutboundEvent`]s and reacts to [`InboundEvent`]s; connection management
//! belongs to the transport.
//!
//! | Direction | Event                      | Body                         |
//! |-----------|----------------------------|------------------------------|
//! | out       | `send-message`             | [`Message`] without plaintext|
//! | out       | `send-media`               | [`MediaUpload`]              |
//! | in        | `receive-message`          | [`Message`]                  |
//! | in        | `receive-media`            | [`MediaFile`]                |
//! | in        | `new-message-notification` | `{chatId, messageId}`        |
//! | in        | `user-status`              | `{userId, online, lastSeen}` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{MediaFile, Message, ProtocolError};

/// File contents attached to a `send-media` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    /// File name
    pub name: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    /// Size in bytes
    pub size: u64,
    /// Base64 file contents
    pub data: String,
}

/// Body of a `send-media` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUpload {
    /// Target chat
    pub chat_id: String,
    /// Uploader
    pub sender_id: String,
    /// Other participant
    pub receiver_id: String,
    /// File contents
    pub file: FilePayload,
}

/// Events the client emits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum OutboundEvent {
    /// Deliver an encrypted message
    SendMessage(Message),
    /// Upload a media file
    SendMedia(MediaUpload),
}

/// Events the client receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum InboundEvent {
    /// A message was delivered, either from the peer or as an echo of our own
    ReceiveMessage(Message),
    /// A media file was shared
    ReceiveMedia(MediaFile),
    /// A message arrived in some chat; the body must be fetched separately
    #[serde(rename_all = "camelCase")]
    NewMessageNotification {
        /// Chat with the new message
        chat_id: String,
        /// Id of the new message
        message_id: String,
    },
    /// Presence change of another user
    #[serde(rename_all = "camelCase")]
    UserStatus {
        /// User whose presence changed
        user_id: String,
        /// Currently connected
        online: bool,
        /// Last disconnect, if known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
}

const INBOUND_NAMES: [&str; 4] =
    ["receive-message", "receive-media", "new-message-notification", "user-status"];

impl OutboundEvent {
    /// Channel event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMessage(_) => "send-message",
            Self::SendMedia(_) => "send-media",
        }
    }

    /// JSON body of the event.
    pub fn body(&self) -> Result<String, ProtocolError> {
        let body = match self {
            Self::SendMessage(message) => serde_json::to_string(message)?,
            Self::SendMedia(upload) => serde_json::to_string(upload)?,
        };
        Ok(body)
    }
}

impl InboundEvent {
    /// Channel event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receive-message",
            Self::ReceiveMedia(_) => "receive-media",
            Self::NewMessageNotification { .. } => "new-message-notification",
            Self::UserStatus { .. } => "user-status",
        }
    }

    /// Decode a named event with a JSON body.
    ///
    /// # Errors
    ///
    /// - `UnknownEvent` if `name` is not an inbound event
    /// - `Malformed` if the body does not match the event
    pub fn decode(name: &str, body: &str) -> Result<Self, ProtocolError> {
        if !INBOUND_NAMES.contains(&name) {
            return Err(ProtocolError::UnknownEvent { name: name.to_string() });
        }

        let data: serde_json::Value = serde_json::from_str(body)?;
        let envelope = serde_json::json!({ "event": name, "data": data });
        Ok(serde_json::from_value(envelope)?)
    }
}
