//! Commands and their execution.

use std::io::Write;

use clap::Subcommand;
use sealchat_client::{DEFAULT_RETENTION_DAYS, Environment};
use sealchat_proto::{Message, MessageStatus};
use sealchat_store::{KeyVaultStore, LocalStore, Registration, Storage, VaultConfig};

use crate::error::CliError;

/// What to do with the device state.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a key pair for a user and print the public key to publish
    Register {
        /// User to create
        username: String,
    },

    /// Check a password and remember the user on this device
    Unlock {
        /// User to unlock
        username: String,
    },

    /// Re-wrap a user's private key under a new password
    ChangePassword {
        /// User whose password changes
        username: String,

        /// Password to wrap the key with from now on
        #[arg(long, env = "SEALCHAT_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
    },

    /// Print the locally stored messages of a chat, oldest first
    History {
        /// Owner of the local store
        username: String,

        /// Chat to print
        chat_id: String,
    },

    /// Delete local messages older than the retention period
    Cleanup {
        /// Owner of the local store
        username: String,

        /// Retention period in days
        #[arg(long, default_value_t = DEFAULT_RETENTION_DAYS)]
        days: u32,
    },

    /// Print the user remembered on this device
    Whoami,

    /// Forget the remembered user
    Logout,
}

impl Command {
    /// Run against `storage`, writing results to `out`.
    ///
    /// `env` supplies randomness for new keys and IVs and the current time
    /// for cleanup.
    ///
    /// # Errors
    ///
    /// - `MissingPassword` if the command needs a password and none was given
    /// - `Storage` for unknown users, wrong passwords and storage failures
    pub fn run<S, E, W>(
        &self,
        storage: S,
        vault_config: VaultConfig,
        env: &E,
        password: Option<&str>,
        out: &mut W,
    ) -> Result<(), CliError>
    where
        S: Storage,
        E: Environment,
        W: Write,
    {
        let vault = KeyVaultStore::new(storage.clone(), vault_config);
        let require_password = || password.ok_or(CliError::MissingPassword);

        match self {
            Self::Register { username } => {
                let registration = Registration {
                    key_seed: env.random_array(),
                    salt: env.random_array(),
                    iv: env.random_array(),
                };
                let key_pair = vault.register(username, require_password()?, &registration)?;
                writeln!(out, "{}", key_pair.public_key.to_base64())?;
            },
            Self::Unlock { username } => {
                let keys = vault.unlock(username, require_password()?)?;
                writeln!(out, "unlocked {username} ({})", keys.key_pair.public_key.to_base64())?;
            },
            Self::ChangePassword { username, new_password } => {
                let old_password = require_password()?;
                vault.change_password(username, old_password, new_password, env.random_array())?;
                writeln!(out, "password changed for {username}")?;
            },
            Self::History { username, chat_id } => {
                let keys = vault.unlock(username, require_password()?)?;
                let store = LocalStore::new(storage, keys.storage_key);
                for message in store.load_messages(chat_id)? {
                    writeln!(out, "{}", history_line(&message))?;
                }
            },
            Self::Cleanup { username, days } => {
                let keys = vault.unlock(username, require_password()?)?;
                let store = LocalStore::new(storage, keys.storage_key);
                let removed = store.cleanup_old_messages(*days, env.wall_clock())?;
                tracing::info!(removed, days, "cleanup finished");
                writeln!(out, "removed {removed} message(s)")?;
            },
            Self::Whoami => match vault.current_user()? {
                Some(username) => writeln!(out, "{username}")?,
                None => writeln!(out, "no remembered user")?,
            },
            Self::Logout => {
                vault.clear_current_user()?;
                writeln!(out, "logged out")?;
            },
        }
        Ok(())
    }
}

fn history_line(message: &Message) -> String {
    let status = match message.status {
        None => "pending",
        Some(MessageStatus::Delivered) => "delivered",
        Some(MessageStatus::Seen) => "seen",
    };
    format!(
        "{} {} [{status}] {}",
        message.created_at.to_rfc3339(),
        message.sender_id,
        message.plaintext.as_deref().unwrap_or_default()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::DateTime;

    use super::*;

    #[test]
    fn history_line_shows_status_and_text() {
        let message = Message {
            id: "temp_1".to_string(),
            chat_id: "chat-ab".to_string(),
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            ciphertext: "sealed".to_string(),
            plaintext: Some("hola".to_string()),
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            status: Some(MessageStatus::Seen),
            nonce: None,
            server_id: None,
        };
        assert_eq!(history_line(&message), "1970-01-01T00:00:00+00:00 alice [seen] hola");
    }
}
