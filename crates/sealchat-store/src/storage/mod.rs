//! Durable storage boundary
//!
//! Trait-based abstraction over a key-value store with a secondary index by
//! chat id for message records, plus a small metadata table for key-wrapping
//! parameters and session identity. The trait is synchronous (no async) to
//! keep the stores above it simple.

mod chaotic;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
use chrono::{DateTime, Utc};
pub use memory::MemoryStorage;
use sealchat_proto::StoredEncryptedMessage;

pub use self::redb::RedbStorage;
use crate::StorageError;

/// Storage abstraction for encrypted message records and metadata
///
/// Must be Clone (shared between the local store and the key vault), Send +
/// Sync (thread-safe), and synchronous. Implementations share internal state
/// via Arc, so clones access the same underlying storage.
///
/// # Panics
///
/// Implementations may panic if internal synchronization primitives are
/// poisoned (a thread panicked while holding a lock).
pub trait Storage: Clone + Send + Sync + 'static {
    /// Store a message record, replacing any record with the same key.
    ///
    /// # Invariants
    ///
    /// - Post: exactly one record exists under `record.message_key`
    /// - Post: the record is reachable through `record.chat_id`
    fn put_message(&self, record: &StoredEncryptedMessage) -> Result<(), StorageError>;

    /// All records of a chat, ordered by message key.
    ///
    /// Returns an empty list for unknown chats.
    fn messages_for_chat(&self, chat_id: &str)
    -> Result<Vec<StoredEncryptedMessage>, StorageError>;

    /// Remove one record. Returns whether it existed.
    fn delete_message(&self, message_key: &str) -> Result<bool, StorageError>;

    /// Remove every record created strictly before `cutoff`.
    ///
    /// Returns the number of records removed.
    fn delete_messages_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Store a metadata value, replacing any previous value.
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Load a metadata value. `None` if absent.
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a metadata value. Removing an absent key is not an error.
    fn delete_meta(&self, key: &str) -> Result<(), StorageError>;
}
