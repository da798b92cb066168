//! Key Vault persistence
//!
//! Keeps the user's key pair on the device in wrapped form only. Layout in the
//! metadata table:
//!
//! | Key                          | Value                                  |
//! |------------------------------|----------------------------------------|
//! | `current_user`               | UTF-8 username of the last session     |
//! | `privateKey_<username>`      | JSON [`WrappedPrivateKey`]             |
//! | `derived_key_meta_<username>`| JSON `{salt, iterations}`, per user    |
//! | `derived_key_meta`           | legacy device-wide salt, read only     |
//!
//! The salt is generated once per user and reused for every later wrap, so
//! the same password always re-derives the same wrap key on this device.

use base64::{Engine, engine::general_purpose::STANDARD};
use sealchat_crypto::{
    CryptoError, IV_SIZE, KEY_SIZE, KeyPair, SALT_SIZE, StorageKey, WrappedPrivateKey,
    derive_storage_key, generate_key_pair, unwrap_with_password, wrap_with_password,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Storage, StorageError, VaultConfig};

/// Metadata key of the last signed-in username.
pub const CURRENT_USER_KEY: &str = "current_user";

/// Device-wide salt written by older installations.
pub const LEGACY_SALT_KEY: &str = "derived_key_meta";

/// Metadata key of a user's wrapped private key.
pub fn private_key_key(username: &str) -> String {
    format!("privateKey_{username}")
}

/// Metadata key of a user's salt.
pub fn salt_key(username: &str) -> String {
    format!("{LEGACY_SALT_KEY}_{username}")
}

/// Random inputs for creating an account.
///
/// MUST be fresh cryptographically secure random bytes. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Registration {
    /// Seed of the new private key
    pub key_seed: [u8; KEY_SIZE],
    /// Salt, used only if the user has none yet
    pub salt: [u8; SALT_SIZE],
    /// IV for wrapping the private key
    pub iv: [u8; IV_SIZE],
}

/// Keys held in memory while a session is authenticated.
#[derive(Debug)]
pub struct UnlockedKeys {
    /// The user's key pair
    pub key_pair: KeyPair,
    /// Key of the encrypted local store
    pub storage_key: StorageKey,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DerivedKeyMeta {
    salt: String,
    #[serde(default)]
    iterations: Option<u32>,
}

/// Key vault over the metadata table of a [`Storage`].
pub struct KeyVaultStore<S: Storage> {
    storage: S,
    config: VaultConfig,
}

impl<S: Storage> KeyVaultStore<S> {
    /// Create a vault over `storage`.
    pub fn new(storage: S, config: VaultConfig) -> Self {
        Self { storage, config }
    }

    /// True if `username` has a wrapped key on this device.
    pub fn has_account(&self, username: &str) -> Result<bool, StorageError> {
        Ok(self.storage.get_meta(&private_key_key(username))?.is_some())
    }

    /// Generate a key pair for `username`, wrap it under `password` and make
    /// `username` the current user.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the user already has a key on this device
    pub fn register(
        &self,
        username: &str,
        password: &str,
        registration: &Registration,
    ) -> Result<KeyPair, StorageError> {
        let key = private_key_key(username);
        if self.storage.get_meta(&key)?.is_some() {
            return Err(StorageError::AlreadyExists { key });
        }

        let (salt, iterations) = match self.load_salt(username)? {
            Some(meta) => (decode_salt(&meta.salt)?, self.iterations(&meta)),
            None => {
                let meta = DerivedKeyMeta {
                    salt: STANDARD.encode(registration.salt),
                    iterations: Some(self.config.pbkdf2_iterations),
                };
                self.storage.put_meta(&salt_key(username), &serde_json::to_vec(&meta)?)?;
                (registration.salt.to_vec(), self.config.pbkdf2_iterations)
            },
        };

        let key_pair = generate_key_pair(registration.key_seed);
        let wrapped = wrap_with_password(
            &key_pair.private_key,
            password.as_bytes(),
            &salt,
            registration.iv,
            iterations,
        )?;

        self.storage.put_meta(&key, &serde_json::to_vec(&wrapped)?)?;
        self.set_current_user(username)?;

        tracing::info!(username, "registered key pair");
        Ok(key_pair)
    }

    /// Unwrap the user's private key and derive the session keys.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user has no key on this device
    /// - `Crypto(KeyDerivation)` for a wrong password or missing salt
    pub fn unlock(&self, username: &str, password: &str) -> Result<UnlockedKeys, StorageError> {
        let (wrapped, iterations) = self.load_wrapped(username)?;
        let private_key = unwrap_with_password(&wrapped, password.as_bytes(), iterations)?;

        let storage_key = derive_storage_key(&private_key);
        let key_pair = KeyPair { public_key: private_key.public_key(), private_key };

        self.set_current_user(username)?;
        tracing::debug!(username, "unlocked key pair");

        Ok(UnlockedKeys { key_pair, storage_key })
    }

    /// Re-wrap the private key under a new password, keeping the salt.
    ///
    /// The key pair itself is unchanged, so history and peers are unaffected.
    /// Caller MUST provide a fresh random IV.
    pub fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
        iv: [u8; IV_SIZE],
    ) -> Result<(), StorageError> {
        let (wrapped, iterations) = self.load_wrapped(username)?;
        let private_key = unwrap_with_password(&wrapped, old_password.as_bytes(), iterations)?;

        let salt = decode_salt(&wrapped.salt)?;
        let rewrapped =
            wrap_with_password(&private_key, new_password.as_bytes(), &salt, iv, iterations)?;

        self.storage.put_meta(&private_key_key(username), &serde_json::to_vec(&rewrapped)?)?;

        tracing::info!(username, "password changed");
        Ok(())
    }

    /// Username of the last session, if any.
    pub fn current_user(&self) -> Result<Option<String>, StorageError> {
        let Some(bytes) = self.storage.get_meta(CURRENT_USER_KEY)? else {
            return Ok(None);
        };

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| StorageError::Serialization(format!("current_user: {e}")))
    }

    /// Remember `username` as the current user.
    pub fn set_current_user(&self, username: &str) -> Result<(), StorageError> {
        self.storage.put_meta(CURRENT_USER_KEY, username.as_bytes())
    }

    /// Forget the current user (logout).
    pub fn clear_current_user(&self) -> Result<(), StorageError> {
        self.storage.delete_meta(CURRENT_USER_KEY)
    }

    /// Wrapped key with its salt resolved, plus the iteration count to use.
    fn load_wrapped(&self, username: &str) -> Result<(WrappedPrivateKey, u32), StorageError> {
        let key = private_key_key(username);
        let bytes = self.storage.get_meta(&key)?.ok_or(StorageError::NotFound { key })?;

        let mut wrapped: WrappedPrivateKey = serde_json::from_slice(&bytes).map_err(|e| {
            CryptoError::KeyDerivation { reason: format!("malformed wrapped key: {e}") }
        })?;

        let meta = match self.load_salt(username)? {
            Some(meta) => Some(meta),
            None => self.load_legacy_salt(username)?,
        };

        if wrapped.salt.is_empty()
            && let Some(meta) = &meta
        {
            wrapped.salt.clone_from(&meta.salt);
        }

        let iterations =
            meta.as_ref().map_or(self.config.pbkdf2_iterations, |meta| self.iterations(meta));

        Ok((wrapped, iterations))
    }

    fn load_salt(&self, username: &str) -> Result<Option<DerivedKeyMeta>, StorageError> {
        self.storage
            .get_meta(&salt_key(username))?
            .map(|bytes| serde_json::from_slice(&bytes))
            .transpose()
            .map_err(|e| malformed_salt(&e))
    }

    /// Read the device-wide salt and adopt it as the user's own.
    fn load_legacy_salt(&self, username: &str) -> Result<Option<DerivedKeyMeta>, StorageError> {
        let Some(bytes) = self.storage.get_meta(LEGACY_SALT_KEY)? else {
            return Ok(None);
        };
        let meta: DerivedKeyMeta =
            serde_json::from_slice(&bytes).map_err(|e| malformed_salt(&e))?;

        if let Err(err) = self.storage.put_meta(&salt_key(username), &bytes) {
            tracing::warn!(username, error = %err, "failed to migrate legacy salt");
        }

        Ok(Some(meta))
    }

    fn iterations(&self, meta: &DerivedKeyMeta) -> u32 {
        meta.iterations.unwrap_or(self.config.pbkdf2_iterations)
    }
}

fn decode_salt(salt: &str) -> Result<Vec<u8>, StorageError> {
    STANDARD.decode(salt).map_err(|e| {
        StorageError::Crypto(CryptoError::KeyDerivation { reason: format!("malformed salt: {e}") })
    })
}

fn malformed_salt(err: &serde_json::Error) -> StorageError {
    StorageError::Crypto(CryptoError::KeyDerivation { reason: format!("malformed salt: {err}") })
}
