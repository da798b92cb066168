//! X25519 key pairs
//!
//! One key pair is generated per registration. Both halves travel and rest as
//! standard base64 text; the private half only ever rests in wrapped form
//! (see [`crate::vault`]).

use std::fmt;

use serde::{Deserialize, Serialize};
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{encoding, error::CryptoError};

/// Size of X25519 public and private keys in bytes.
pub const KEY_SIZE: usize = 32;

/// X25519 public key.
///
/// Serializes as a base64 string, the form the user directory returns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    /// Wrap raw public key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Standard base64 encoding of the key.
    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    /// Parse a base64-encoded public key.
    ///
    /// # Errors
    ///
    /// - `InvalidEncoding` if the text is not base64
    /// - `InvalidKey` if the decoded length is not 32 bytes
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let bytes = encoding::decode(text)?;
        Ok(Self(to_key_array(&bytes)?))
    }

    pub(crate) fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl TryFrom<String> for PublicKey {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base64(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_base64()
    }
}

/// X25519 private key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_SIZE]);

impl PrivateKey {
    /// Wrap raw private key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Standard base64 encoding of the key.
    ///
    /// Only used to hand the key to a wrapping step; never persist the result.
    pub fn to_base64(&self) -> String {
        encoding::encode(&self.0)
    }

    /// Parse a base64-encoded private key.
    pub fn from_base64(text: &str) -> Result<Self, CryptoError> {
        let mut bytes = encoding::decode(text)?;
        let key = to_key_array(&bytes);
        bytes.zeroize();
        Ok(Self(key?))
    }

    /// Public key matching this private key.
    pub fn public_key(&self) -> PublicKey {
        public_key_from_private(self)
    }

    pub(crate) fn to_dalek(&self) -> StaticSecret {
        StaticSecret::from(self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Asymmetric key pair used for sealing and opening chat payloads.
#[derive(Clone, Debug)]
pub struct KeyPair {
    /// Published to the user directory.
    pub public_key: PublicKey,
    /// Never leaves the device unencrypted.
    pub private_key: PrivateKey,
}

/// Generate a key pair from 32 caller-provided random bytes.
///
/// The seed becomes the private scalar (clamped at use). Callers MUST provide
/// cryptographically secure random bytes in production.
pub fn generate_key_pair(seed: [u8; KEY_SIZE]) -> KeyPair {
    let private_key = PrivateKey::from_bytes(seed);
    let public_key = public_key_from_private(&private_key);
    KeyPair { public_key, private_key }
}

/// Recover the public key from a private key (base point multiplication).
pub fn public_key_from_private(private_key: &PrivateKey) -> PublicKey {
    let public = x25519_dalek::PublicKey::from(&private_key.to_dalek());
    PublicKey(public.to_bytes())
}

pub(crate) fn to_key_array(bytes: &[u8]) -> Result<[u8; KEY_SIZE], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKey {
        reason: format!("expected {KEY_SIZE} bytes, got {}", bytes.len()),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generation_is_deterministic() {
        let a = generate_key_pair([7; KEY_SIZE]);
        let b = generate_key_pair([7; KEY_SIZE]);
        assert_eq!(a.public_key, b.public_key);
    }

    #[test]
    fn different_seeds_produce_different_keys() {
        let a = generate_key_pair([1; KEY_SIZE]);
        let b = generate_key_pair([2; KEY_SIZE]);
        assert_ne!(a.public_key, b.public_key);
    }

    #[test]
    fn public_key_recovered_from_private() {
        let pair = generate_key_pair([42; KEY_SIZE]);
        assert_eq!(pair.private_key.public_key(), pair.public_key);
    }

    #[test]
    fn public_key_base64_roundtrip() {
        let pair = generate_key_pair([9; KEY_SIZE]);
        let text = pair.public_key.to_base64();
        assert_eq!(PublicKey::from_base64(&text).unwrap(), pair.public_key);
    }

    #[test]
    fn short_public_key_rejected() {
        let result = PublicKey::from_base64("AAAA");
        assert!(matches!(result, Err(CryptoError::InvalidKey { .. })));
    }

    #[test]
    fn garbage_base64_rejected() {
        let result = PublicKey::from_base64("not base64!");
        assert!(matches!(result, Err(CryptoError::InvalidEncoding { .. })));
    }

    #[test]
    fn private_key_debug_is_redacted() {
        let pair = generate_key_pair([3; KEY_SIZE]);
        let debug = format!("{:?}", pair.private_key);
        assert!(!debug.contains(&pair.private_key.to_base64()));
    }

    #[test]
    fn public_key_serde_as_string() {
        let pair = generate_key_pair([5; KEY_SIZE]);
        let json = serde_json::to_string(&pair.public_key).unwrap();
        assert_eq!(json, format!("\"{}\"", pair.public_key.to_base64()));

        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair.public_key);
    }
}
