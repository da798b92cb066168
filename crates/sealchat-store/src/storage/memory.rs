use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use sealchat_proto::StoredEncryptedMessage;

use super::{Storage, StorageError};

/// In-memory storage implementation for testing
///
/// All state is wrapped in Arc<Mutex<>> to allow Clone and concurrent access.
/// Uses `lock().expect()` which will panic if the mutex is poisoned, which is
/// acceptable for test code.
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

struct MemoryStorageInner {
    /// Records by message key
    messages: BTreeMap<String, StoredEncryptedMessage>,

    /// Chat id -> message keys
    chat_index: HashMap<String, BTreeSet<String>>,

    /// Metadata values
    meta: HashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryStorageInner {
                messages: BTreeMap::new(),
                chat_index: HashMap::new(),
                meta: HashMap::new(),
            })),
        }
    }

    /// Total number of message records across all chats.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[allow(clippy::expect_used)]
    pub fn message_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").messages.len()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorageInner {
    fn remove(&mut self, message_key: &str) -> bool {
        let Some(record) = self.messages.remove(message_key) else {
            return false;
        };

        if let Some(keys) = self.chat_index.get_mut(&record.chat_id) {
            keys.remove(message_key);
            if keys.is_empty() {
                self.chat_index.remove(&record.chat_id);
            }
        }

        true
    }
}

impl Storage for MemoryStorage {
    #[allow(clippy::expect_used)]
    fn put_message(&self, record: &StoredEncryptedMessage) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        // A replaced record may have been indexed under another chat.
        inner.remove(&record.message_key);

        inner
            .chat_index
            .entry(record.chat_id.clone())
            .or_default()
            .insert(record.message_key.clone());
        inner.messages.insert(record.message_key.clone(), record.clone());

        debug_assert_eq!(
            inner.chat_index.values().map(BTreeSet::len).sum::<usize>(),
            inner.messages.len()
        );

        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn messages_for_chat(
        &self,
        chat_id: &str,
    ) -> Result<Vec<StoredEncryptedMessage>, StorageError> {
        let inner = self.inner.lock().expect("Mutex poisoned");

        let Some(keys) = inner.chat_index.get(chat_id) else {
            return Ok(Vec::new());
        };

        Ok(keys.iter().filter_map(|key| inner.messages.get(key).cloned()).collect())
    }

    #[allow(clippy::expect_used)]
    fn delete_message(&self, message_key: &str) -> Result<bool, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").remove(message_key))
    }

    #[allow(clippy::expect_used)]
    fn delete_messages_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut inner = self.inner.lock().expect("Mutex poisoned");

        let expired: Vec<String> = inner
            .messages
            .values()
            .filter(|record| record.created_at < cutoff)
            .map(|record| record.message_key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }

        Ok(expired.len())
    }

    #[allow(clippy::expect_used)]
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").meta.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.inner.lock().expect("Mutex poisoned").meta.get(key).cloned())
    }

    #[allow(clippy::expect_used)]
    fn delete_meta(&self, key: &str) -> Result<(), StorageError> {
        self.inner.lock().expect("Mutex poisoned").meta.remove(key);
        Ok(())
    }
}
