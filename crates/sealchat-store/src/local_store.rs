//! Encrypted Local Store
//!
//! Durable, chat-indexed message history that stays readable while the server
//! is unreachable. Each message is serialized to JSON and sealed under the
//! session storage key with a fresh IV before it touches storage.
//!
//! The store writes exactly what it is given. Deciding which messages may be
//! persisted with plaintext (only the user's own) is the reconciler's job.

use chrono::{DateTime, TimeDelta, Utc};
use sealchat_crypto::{IV_SIZE, StorageKey, decrypt_record, encrypt_record};
use sealchat_proto::{Message, StoredEncryptedMessage, message_key};

use crate::{Storage, StorageError};

/// Encrypted message history over a [`Storage`] backend.
pub struct LocalStore<S: Storage> {
    storage: S,
    key: StorageKey,
}

impl<S: Storage> LocalStore<S> {
    /// Open the store with the session storage key.
    pub fn new(storage: S, key: StorageKey) -> Self {
        Self { storage, key }
    }

    /// Underlying storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Encrypt and persist `message` under `<chat_id>_<message.id>`.
    ///
    /// Saving the same chat and message id again replaces the earlier record.
    /// Caller MUST provide a fresh random IV.
    pub fn save_message(
        &self,
        chat_id: &str,
        message: &Message,
        iv: [u8; IV_SIZE],
    ) -> Result<(), StorageError> {
        let json = serde_json::to_vec(message)?;
        let data = encrypt_record(&self.key, &json, iv)?;

        let record = StoredEncryptedMessage {
            message_key: message_key(chat_id, &message.id),
            chat_id: chat_id.to_string(),
            data,
            iv: iv.to_vec(),
            created_at: message.created_at,
        };

        self.storage.put_message(&record)
    }

    /// All stored messages of a chat, ascending by creation time.
    ///
    /// Recomputed from storage on every call. Records that fail to decrypt or
    /// parse are skipped and logged; one bad record does not hide the rest.
    pub fn load_messages(&self, chat_id: &str) -> Result<Vec<Message>, StorageError> {
        let records = self.storage.messages_for_chat(chat_id)?;

        let mut messages = Vec::with_capacity(records.len());
        for record in records {
            match self.decrypt(&record) {
                Ok(message) => messages.push(message),
                Err(err) => tracing::warn!(
                    message_key = %record.message_key,
                    error = %err,
                    "skipping unreadable local record"
                ),
            }
        }

        // Stable: records arrive in key order, which breaks timestamp ties.
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    /// Plaintext of the newest stored message that has one.
    ///
    /// Only the user's own messages carry plaintext at rest, so this is the
    /// last thing the user wrote in the chat.
    pub fn get_last_message(&self, chat_id: &str) -> Result<Option<String>, StorageError> {
        let messages = self.load_messages(chat_id)?;
        Ok(messages.into_iter().rev().find_map(|m| m.plaintext))
    }

    /// Remove one message. Returns whether it was stored.
    pub fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<bool, StorageError> {
        self.storage.delete_message(&message_key(chat_id, message_id))
    }

    /// Delete every record older than `days` days before `now`.
    ///
    /// Best-effort retention: callers run it opportunistically.
    pub fn cleanup_old_messages(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let cutoff = now
            .checked_sub_signed(TimeDelta::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let removed = self.storage.delete_messages_before(cutoff)?;
        tracing::debug!(removed, %cutoff, "retention cleanup");
        Ok(removed)
    }

    fn decrypt(&self, record: &StoredEncryptedMessage) -> Result<Message, StorageError> {
        let json = decrypt_record(&self.key, &record.data, &record.iv)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
