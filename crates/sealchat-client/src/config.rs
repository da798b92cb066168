//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default local history retention.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Session behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Local records older than this many days are deleted by cleanup.
    pub retention_days: u32,

    /// Lifetime of cached public keys.
    ///
    /// `None` keeps keys until logout.
    pub key_cache_ttl: Option<Duration>,

    /// Shown in place of a message that fails to decrypt.
    pub decrypt_failure_placeholder: String,

    /// Shown for our own messages sent from another device, which we cannot
    /// decrypt because they are sealed to the recipient.
    pub foreign_session_placeholder: String,

    /// Bind our static key into outgoing envelopes.
    ///
    /// When off, messages are sealed anonymously.
    pub authenticated_seal: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            key_cache_ttl: None,
            decrypt_failure_placeholder: "message could not be decrypted".to_string(),
            foreign_session_placeholder: "message sent from another session".to_string(),
            authenticated_seal: true,
        }
    }
}
