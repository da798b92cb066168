//! At-rest record encryption using AES-256-GCM
//!
//! Message history is encrypted under a session-held storage key with a fresh
//! 12-byte IV per write. The IV is stored next to the ciphertext.
//!
//! The storage key is expanded from the unwrapped private key, so it is only
//! available once the vault is unlocked and survives password changes:
//!
//! ```text
//! private key ──► HKDF-SHA256("sealchat storage v1") ──► Storage Key
//! ```

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{error::CryptoError, keys::PrivateKey};

/// AES-GCM IV size (12 bytes)
pub const IV_SIZE: usize = 12;

const STORAGE_KEY_LABEL: &[u8] = b"sealchat storage v1";

/// Symmetric key protecting the local message store. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageKey([u8; 32]);

impl StorageKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Derive the local storage key belonging to a private key.
pub fn derive_storage_key(private_key: &PrivateKey) -> StorageKey {
    let hkdf = Hkdf::<Sha256>::new(None, private_key.as_bytes());
    let mut key = StorageKey([0u8; 32]);
    let Ok(()) = hkdf.expand(STORAGE_KEY_LABEL, &mut key.0) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    key
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageKey(<redacted>)")
    }
}

/// Encrypt a serialized record.
///
/// Caller MUST provide a fresh random IV for every call.
pub fn encrypt_record(
    key: &StorageKey,
    plaintext: &[u8],
    iv: [u8; IV_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encryption { reason: "record too large".to_string() })
}

/// Decrypt a record written by [`encrypt_record`].
///
/// # Errors
///
/// - `Decryption` if the IV has the wrong size or the tag does not verify
pub fn decrypt_record(key: &StorageKey, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != IV_SIZE {
        return Err(CryptoError::Decryption {
            reason: format!("iv must be {IV_SIZE} bytes, got {}", iv.len()),
        });
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Decryption { reason: "authentication failed".to_string() })
}
