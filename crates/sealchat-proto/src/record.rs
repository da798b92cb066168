//! At-rest message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Storage key of a message: `<chatId>_<messageId>`.
pub fn message_key(chat_id: &str, message_id: &str) -> String {
    format!("{chat_id}_{message_id}")
}

/// Encrypted message as kept in durable storage.
///
/// `data` is the AES-GCM ciphertext of the JSON-serialized [`Message`]. Records
/// are never updated in place; a save with the same `message_key` replaces the
/// previous record.
///
/// [`Message`]: crate::Message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEncryptedMessage {
    /// `<chatId>_<messageId>`
    pub message_key: String,
    /// Secondary index key
    pub chat_id: String,
    /// Encrypted message JSON
    pub data: Vec<u8>,
    /// 12-byte AES-GCM IV
    pub iv: Vec<u8>,
    /// Copied out of the message so retention can run without decrypting
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_chat_and_message_ids() {
        assert_eq!(message_key("chat9", "temp_1"), "chat9_temp_1");
    }
}
