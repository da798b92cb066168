//! Key vault configuration.

use sealchat_crypto::PBKDF2_ITERATIONS;
use serde::{Deserialize, Serialize};

/// Key vault configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// PBKDF2 iterations for newly wrapped keys.
    ///
    /// Existing accounts keep the count recorded with their salt.
    pub pbkdf2_iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self { pbkdf2_iterations: PBKDF2_ITERATIONS }
    }
}
