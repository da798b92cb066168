//! Password-derived key wrapping
//!
//! The private key rests encrypted under a key derived from the user's
//! password:
//!
//! ```text
//! PBKDF2-HMAC-SHA256(password, salt, 100_000) ──► Wrap Key ──► AES-256-GCM(private key)
//! ```
//!
//! The salt is stable per user on a device so the same password re-derives the
//! same wrap key across sessions; the IV is fresh for every wrap.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    encoding,
    error::CryptoError,
    keys::{KEY_SIZE, PrivateKey, to_key_array},
    record::IV_SIZE,
};

/// Default PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Size of a freshly generated salt in bytes.
pub const SALT_SIZE: usize = 16;

/// Private key encrypted under a password-derived key.
///
/// Serialized with camelCase base64 fields, the layout kept in durable
/// storage under `privateKey_<username>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedPrivateKey {
    /// AES-GCM ciphertext of the private key, including the 16-byte tag.
    #[serde(with = "encoding::bytes")]
    pub encrypted_key: Vec<u8>,
    /// 12-byte IV, unique per wrap.
    #[serde(with = "encoding::bytes")]
    pub iv: Vec<u8>,
    /// Base64 salt used for PBKDF2. Stable per user per device.
    pub salt: String,
}

/// AES-256-GCM key for wrapping the private key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct WrapKey([u8; 32]);

/// Derive the wrap key from a password and salt.
///
/// `salt` is the raw salt bytes (decode the base64 form first).
pub fn derive_wrap_key(password: &[u8], salt: &[u8], iterations: u32) -> WrapKey {
    let mut key = WrapKey([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key.0);
    key
}

/// Encrypt a private key under a wrap key.
///
/// `salt` is recorded verbatim so the unwrap side can re-derive the key.
/// Caller MUST provide a fresh random IV.
pub fn wrap_private_key(
    private_key: &PrivateKey,
    wrap_key: &WrapKey,
    salt: &str,
    iv: [u8; IV_SIZE],
) -> Result<WrappedPrivateKey, CryptoError> {
    let cipher = Aes256Gcm::new((&wrap_key.0).into());
    let encrypted_key = cipher
        .encrypt(Nonce::from_slice(&iv), private_key.as_bytes().as_slice())
        .map_err(|_| CryptoError::Encryption { reason: "private key wrap failed".to_string() })?;

    Ok(WrappedPrivateKey { encrypted_key, iv: iv.to_vec(), salt: salt.to_string() })
}

/// Decrypt a wrapped private key.
///
/// # Errors
///
/// - `KeyDerivation` if the wrap key is wrong (tag mismatch), the IV is
///   malformed, or the decrypted key has the wrong length
pub fn unwrap_private_key(
    wrapped: &WrappedPrivateKey,
    wrap_key: &WrapKey,
) -> Result<PrivateKey, CryptoError> {
    if wrapped.iv.len() != IV_SIZE {
        return Err(CryptoError::KeyDerivation {
            reason: format!("iv must be {IV_SIZE} bytes, got {}", wrapped.iv.len()),
        });
    }

    let cipher = Aes256Gcm::new((&wrap_key.0).into());
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&wrapped.iv), wrapped.encrypted_key.as_slice())
            .map_err(|_| CryptoError::KeyDerivation {
                reason: "wrong password or corrupted key".to_string(),
            })?,
    );

    let bytes = to_key_array(&plaintext).map_err(|_| CryptoError::KeyDerivation {
        reason: format!("unwrapped key must be {KEY_SIZE} bytes, got {}", plaintext.len()),
    })?;

    Ok(PrivateKey::from_bytes(bytes))
}

/// Derive a wrap key from `password` and wrap the private key in one step.
pub fn wrap_with_password(
    private_key: &PrivateKey,
    password: &[u8],
    salt: &[u8],
    iv: [u8; IV_SIZE],
    iterations: u32,
) -> Result<WrappedPrivateKey, CryptoError> {
    let wrap_key = derive_wrap_key(password, salt, iterations);
    wrap_private_key(private_key, &wrap_key, &encoding::encode(salt), iv)
}

/// Re-derive the wrap key from `password` and the recorded salt, then unwrap.
///
/// # Errors
///
/// - `KeyDerivation` for a wrong password, missing salt, or bad metadata
pub fn unwrap_with_password(
    wrapped: &WrappedPrivateKey,
    password: &[u8],
    iterations: u32,
) -> Result<PrivateKey, CryptoError> {
    if wrapped.salt.is_empty() {
        return Err(CryptoError::KeyDerivation { reason: "missing salt".to_string() });
    }

    let salt = encoding::decode(&wrapped.salt)
        .map_err(|e| CryptoError::KeyDerivation { reason: format!("malformed salt: {e}") })?;

    let wrap_key = derive_wrap_key(password, &salt, iterations);
    unwrap_private_key(wrapped, &wrap_key)
}
