//! Client error types.

use sealchat_crypto::CryptoError;
use sealchat_proto::ProtocolError;
use sealchat_store::StorageError;
use thiserror::Error;

/// Failure reported by an API or real-time collaborator.
///
/// Opaque to the client: retry and backoff belong to the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport error: {reason}")]
pub struct TransportError {
    /// Description from the transport
    pub reason: String,
}

impl TransportError {
    /// Create a transport error from any description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Errors from the client state machine and session runtime
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation needs an unlocked session
    #[error("no active session")]
    NotLoggedIn,

    /// A message must carry some text
    #[error("message is empty")]
    EmptyMessage,

    /// Sealing or key handling failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Vault or local store failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// API or real-time collaborator failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed payload from a collaborator
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl ClientError {
    /// True if the operation cannot succeed without user action.
    ///
    /// Wrong passwords and unusable keys are fatal. Transport and per-record
    /// storage failures are not: the in-memory view stays valid.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::NotLoggedIn => true,
            Self::Crypto(err) => err.is_fatal(),
            Self::Storage(err) => err.is_fatal(),
            Self::EmptyMessage | Self::Transport(_) | Self::Protocol(_) => false,
        }
    }
}
