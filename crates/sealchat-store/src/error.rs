//! Storage error types.

use sealchat_crypto::CryptoError;
use thiserror::Error;

/// Errors from durable storage and the stores built on it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Required record is missing
    #[error("not found: {key}")]
    NotFound {
        /// Storage key that was looked up
        key: String,
    },

    /// Record already exists and may not be replaced
    #[error("already exists: {key}")]
    AlreadyExists {
        /// Storage key that is taken
        key: String,
    },

    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Encrypting, decrypting or unwrapping failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl StorageError {
    /// True if the operation cannot succeed without user action.
    ///
    /// A missing account or a wrong password is fatal to unlocking. I/O and
    /// per-record failures are not: callers keep their in-memory state.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::AlreadyExists { .. } => true,
            Self::Crypto(err) => err.is_fatal(),
            Self::Serialization(_) | Self::Io(_) => false,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
