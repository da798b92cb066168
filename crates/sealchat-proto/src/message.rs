//! Chat messages and media references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of ids assigned to optimistic entries before the server confirms
/// them.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Server-reported delivery state of a message.
///
/// Ordered: `Delivered < Seen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Reached the recipient's device
    Delivered,
    /// Displayed to the recipient
    Seen,
}

/// Encrypted text message.
///
/// `ciphertext` is the base64 sealed envelope. `plaintext` is local-only: it
/// is filled in from the sender's optimistic cache or by decryption and is
/// never sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server id, or a `temp_` id for optimistic entries
    pub id: String,
    /// Chat this message belongs to
    pub chat_id: String,
    /// Author
    pub sender_id: String,
    /// Other participant
    pub receiver_id: String,
    /// Base64 sealed envelope
    pub ciphertext: String,
    /// Local-only decrypted or authored text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    /// Creation time, the timeline ordering key
    pub created_at: DateTime<Utc>,
    /// Delivery state reported by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    /// Client-side nonce tying an optimistic entry to its echo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Local-only: server id of the echo that confirmed this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

impl Message {
    /// True if `user_id` authored this message.
    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    /// True for entries created under a `temp_` id, confirmed or not.
    pub fn is_optimistic(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }

    /// True once a server echo has been matched to this record.
    pub fn is_confirmed(&self) -> bool {
        self.server_id.is_some()
    }

    /// Optimistic entry the server has not confirmed yet.
    pub fn is_pending(&self) -> bool {
        self.is_optimistic() && !self.is_confirmed()
    }

    /// True for records authored on this device, which carry their own
    /// plaintext.
    pub fn is_local_record(&self) -> bool {
        self.is_optimistic() || self.is_confirmed()
    }

    /// True if `server` is the server's copy of this record.
    pub fn matches_server_id(&self, server: &str) -> bool {
        self.id == server || self.server_id.as_deref() == Some(server)
    }

    /// Copy with the local-only fields removed, the form sent to the server.
    #[must_use]
    pub fn without_plaintext(&self) -> Self {
        Self { plaintext: None, server_id: None, ..self.clone() }
    }
}

/// Media reference in a chat.
///
/// Shares the membership and timing fields of [`Message`] but carries file
/// metadata instead of a ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    /// Server id
    pub id: String,
    /// Chat this file belongs to
    pub chat_id: String,
    /// Uploader
    pub sender_id: String,
    /// Other participant
    pub receiver_id: String,
    /// Original file name
    pub file_name: String,
    /// MIME type
    pub file_type: String,
    /// Size in bytes
    pub file_size: u64,
    /// Where the server serves the file from
    pub url: String,
    /// Upload time, the timeline ordering key
    pub created_at: DateTime<Utc>,
}

/// One entry of a chat timeline.
///
/// Untagged on the wire: an object with a `ciphertext` field is a message,
/// anything else with file metadata is media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatItem {
    /// Encrypted text message
    Message(Message),
    /// Media reference
    Media(MediaFile),
}

impl ChatItem {
    /// Item id, unique within a chat.
    pub fn id(&self) -> &str {
        match self {
            Self::Message(m) => &m.id,
            Self::Media(f) => &f.id,
        }
    }

    /// Chat the item belongs to.
    pub fn chat_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.chat_id,
            Self::Media(f) => &f.chat_id,
        }
    }

    /// Author of the item.
    pub fn sender_id(&self) -> &str {
        match self {
            Self::Message(m) => &m.sender_id,
            Self::Media(f) => &f.sender_id,
        }
    }

    /// Ordering timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Message(m) => m.created_at,
            Self::Media(f) => f.created_at,
        }
    }

    /// The message, if this item is one.
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            Self::Media(_) => None,
        }
    }

    /// Text shown in chat list previews.
    pub fn preview(&self) -> Option<&str> {
        match self {
            Self::Message(m) => m.plaintext.as_deref(),
            Self::Media(f) => Some(&f.file_name),
        }
    }
}

impl From<Message> for ChatItem {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<MediaFile> for ChatItem {
    fn from(file: MediaFile) -> Self {
        Self::Media(file)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn message() -> Message {
        Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            ciphertext: "AQID".to_string(),
            plaintext: Some("hola".to_string()),
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            status: Some(MessageStatus::Seen),
            nonce: None,
            server_id: None,
        }
    }

    #[test]
    fn message_json_uses_camel_case() {
        let json = serde_json::to_value(message()).unwrap();
        assert_eq!(json["chatId"], "c1");
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["status"], "seen");
        assert!(json.get("nonce").is_none());
        assert!(json["createdAt"].as_str().unwrap().starts_with("2023-11-14T"));
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let json = r#"{
            "id": "m2", "chatId": "c1", "senderId": "bob", "receiverId": "alice",
            "ciphertext": "AQID", "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.plaintext, None);
        assert_eq!(msg.status, None);
    }

    #[test]
    fn without_plaintext_strips_local_field() {
        let stripped = message().without_plaintext();
        assert_eq!(stripped.plaintext, None);
        assert_eq!(stripped.ciphertext, "AQID");
    }

    #[test]
    fn chat_item_disambiguated_by_ciphertext() {
        let media = r#"{
            "id": "f1", "chatId": "c1", "senderId": "bob", "receiverId": "alice",
            "fileName": "cat.png", "fileType": "image/png", "fileSize": 1024,
            "url": "/media/f1", "createdAt": "2024-01-01T00:00:00Z"
        }"#;
        let item: ChatItem = serde_json::from_str(media).unwrap();
        assert!(matches!(item, ChatItem::Media(_)));
        assert_eq!(item.preview(), Some("cat.png"));

        let text = serde_json::to_string(&message()).unwrap();
        let item: ChatItem = serde_json::from_str(&text).unwrap();
        assert!(matches!(item, ChatItem::Message(_)));
        assert_eq!(item.id(), "m1");
    }

    #[test]
    fn status_ordering() {
        assert!(MessageStatus::Delivered < MessageStatus::Seen);
    }

    #[test]
    fn optimistic_ids() {
        let mut msg = message();
        assert!(!msg.is_optimistic());
        assert!(!msg.is_local_record());
        msg.id = format!("{TEMP_ID_PREFIX}1");
        assert!(msg.is_optimistic());
        assert!(msg.is_pending());

        msg.server_id = Some("m1".to_string());
        assert!(!msg.is_pending());
        assert!(msg.is_local_record());
        assert!(msg.matches_server_id("m1"));
        assert!(msg.matches_server_id(&format!("{TEMP_ID_PREFIX}1")));
    }

    #[test]
    fn server_id_is_kept_at_rest_but_not_sent() {
        let mut msg = message();
        msg.server_id = Some("srv-1".to_string());

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["serverId"], "srv-1");
        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back.server_id.as_deref(), Some("srv-1"));

        assert_eq!(msg.without_plaintext().server_id, None);
    }
}
