//! Protocol errors.

use thiserror::Error;

/// Errors decoding wire or at-rest payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not valid JSON for the expected type
    #[error("malformed payload: {reason}")]
    Malformed {
        /// Decoder error text
        reason: String,
    },

    /// Event name not recognised
    #[error("unknown event: {name}")]
    UnknownEvent {
        /// Event name as received
        name: String,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed { reason: err.to_string() }
    }
}
