//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. Records
//! and their chat index entry are written in the same transaction, so a crash
//! never leaves a record unreachable or an index entry dangling.

use std::{fmt::Display, path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use redb::{
    Database, MultimapTableDefinition, ReadableTable, TableDefinition,
};
use sealchat_proto::StoredEncryptedMessage;

use super::{Storage, StorageError};

/// Table: messages
/// Key: `<chatId>_<messageId>`
/// Value: CBOR-encoded `StoredEncryptedMessage`
const MESSAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("messages");

/// Multimap table: `chat_index`
/// Key: chat id
/// Values: message keys of that chat
const CHAT_INDEX: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("chat_index");

/// Table: meta
/// Key: fixed string id (`current_user`, `privateKey_<username>`, ...)
/// Value: raw bytes, owned by the caller
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (MESSAGES, `CHAT_INDEX`, META).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(MESSAGES).map_err(io)?;
            let _ = txn.open_multimap_table(CHAT_INDEX).map_err(io)?;
            let _ = txn.open_table(META).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn put_message(&self, record: &StoredEncryptedMessage) -> Result<(), StorageError> {
        let bytes = encode_record(record)?;
        let key = record.message_key.as_str();

        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut messages = txn.open_table(MESSAGES).map_err(io)?;
            let mut index = txn.open_multimap_table(CHAT_INDEX).map_err(io)?;

            let previous =
                messages.insert(key, bytes.as_slice()).map_err(io)?.map(|old| old.value().to_vec());

            if let Some(previous) = previous {
                let previous = decode_record(&previous)?;
                if previous.chat_id != record.chat_id {
                    index.remove(previous.chat_id.as_str(), key).map_err(io)?;
                }
            }

            index.insert(record.chat_id.as_str(), key).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn messages_for_chat(
        &self,
        chat_id: &str,
    ) -> Result<Vec<StoredEncryptedMessage>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let messages = txn.open_table(MESSAGES).map_err(io)?;
        let index = txn.open_multimap_table(CHAT_INDEX).map_err(io)?;

        let mut records = Vec::new();
        for entry in index.get(chat_id).map_err(io)? {
            let key = entry.map_err(io)?;

            // Index and table are written together; a miss means corruption.
            let Some(value) = messages.get(key.value()).map_err(io)? else {
                return Err(StorageError::Serialization(format!(
                    "chat index references missing record {}",
                    key.value()
                )));
            };

            records.push(decode_record(value.value())?);
        }

        Ok(records)
    }

    fn delete_message(&self, message_key: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let existed = {
            let mut messages = txn.open_table(MESSAGES).map_err(io)?;
            let mut index = txn.open_multimap_table(CHAT_INDEX).map_err(io)?;

            let removed = messages.remove(message_key).map_err(io)?.map(|old| old.value().to_vec());
            match removed {
                Some(bytes) => {
                    let record = decode_record(&bytes)?;
                    index.remove(record.chat_id.as_str(), message_key).map_err(io)?;
                    true
                },
                None => false,
            }
        };
        txn.commit().map_err(io)?;

        Ok(existed)
    }

    fn delete_messages_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let mut messages = txn.open_table(MESSAGES).map_err(io)?;
            let mut index = txn.open_multimap_table(CHAT_INDEX).map_err(io)?;

            let mut expired = Vec::new();
            for entry in messages.iter().map_err(io)? {
                let (_, value) = entry.map_err(io)?;
                let record = decode_record(value.value())?;
                if record.created_at < cutoff {
                    expired.push((record.message_key, record.chat_id));
                }
            }

            for (message_key, chat_id) in &expired {
                messages.remove(message_key.as_str()).map_err(io)?;
                index.remove(chat_id.as_str(), message_key.as_str()).map_err(io)?;
            }

            expired.len()
        };
        txn.commit().map_err(io)?;

        Ok(removed)
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut meta = txn.open_table(META).map_err(io)?;
            meta.insert(key, value).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let meta = txn.open_table(META).map_err(io)?;

        Ok(meta.get(key).map_err(io)?.map(|value| value.value().to_vec()))
    }

    fn delete_meta(&self, key: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut meta = txn.open_table(META).map_err(io)?;
            meta.remove(key).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(())
    }
}

fn io(err: impl Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn encode_record(record: &StoredEncryptedMessage) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_record(bytes: &[u8]) -> Result<StoredEncryptedMessage, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
