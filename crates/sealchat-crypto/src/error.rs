//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from key handling, sealing and record encryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Wrap key could not unlock the private key.
    ///
    /// Wrong password (AES-GCM tag mismatch) or missing/malformed wrap
    /// metadata. Surfaced to the user as "cannot unlock".
    #[error("key derivation failed: {reason}")]
    KeyDerivation {
        /// Reason for the failure
        reason: String,
    },

    /// Ciphertext is malformed or was not sealed for this key pair.
    #[error("decryption failed: {reason}")]
    Decryption {
        /// Reason for decryption failure
        reason: String,
    },

    /// Encryption rejected its input (oversized payload).
    #[error("encryption failed: {reason}")]
    Encryption {
        /// Reason for encryption failure
        reason: String,
    },

    /// Key material has the wrong length or is a low-order point.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// What was wrong with the key
        reason: String,
    },

    /// Text field could not be decoded.
    #[error("invalid encoding: {reason}")]
    InvalidEncoding {
        /// Decoder error
        reason: String,
    },

    /// Envelope version byte is not understood by this operation.
    #[error("unsupported envelope version {version:#04x}")]
    UnsupportedEnvelope {
        /// Version byte found at the start of the envelope
        version: u8,
    },
}

impl CryptoError {
    /// Returns true if this error is fatal to the current operation.
    ///
    /// Fatal errors come from key unwrap or key handling and must be shown to
    /// the user as an actionable failure. Per-message errors are localized
    /// and replaced by a placeholder.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::KeyDerivation { .. } | Self::InvalidKey { .. } => true,

            Self::Decryption { .. }
            | Self::Encryption { .. }
            | Self::InvalidEncoding { .. }
            | Self::UnsupportedEnvelope { .. } => false,
        }
    }
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        Self::InvalidEncoding { reason: err.to_string() }
    }
}
