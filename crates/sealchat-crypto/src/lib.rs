//! Sealchat Cryptographic Primitives
//!
//! Cryptographic building blocks for the sealchat client core. Pure functions
//! with deterministic outputs. Callers provide random bytes (key seeds, salts,
//! IVs, nonces) so every operation can be replayed in tests.
//!
//! # Key Lifecycle
//!
//! ```text
//! Password ──PBKDF2-SHA256──► Wrap Key ──AES-256-GCM──► Wrapped Private Key (at rest)
//!
//! X25519 Key Pair
//!        │
//!        ├──HKDF──► Storage Key ──AES-256-GCM──► Encrypted message records
//!        ▼
//! Seal (ephemeral X25519 + HKDF + XChaCha20-Poly1305) ──► Message ciphertext
//! ```
//!
//! The unwrapped private key and the storage key exist only in memory for the
//! lifetime of an authenticated session and are zeroized on drop.
//!
//! # Security
//!
//! Confidentiality:
//! - Anonymous seals reveal nothing about the sender; only the holder of the
//!   recipient private key can open them
//! - Every seal uses a fresh ephemeral key pair and nonce
//!
//! Authenticity:
//! - Anonymous seals do NOT bind the sender. The transport's sender id is not
//!   cryptographically tied to the ciphertext
//! - Authenticated seals mix the sender's static key into the key schedule, so
//!   opening with the wrong claimed sender fails
//!
//! Key wrapping:
//! - A wrong password fails the AES-GCM tag check and never yields key bytes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod encoding;
pub mod error;
pub mod keys;
pub mod record;
pub mod seal;
pub mod vault;

pub use error::CryptoError;
pub use keys::{KEY_SIZE, KeyPair, PrivateKey, PublicKey, generate_key_pair, public_key_from_private};
pub use record::{IV_SIZE, StorageKey, decrypt_record, derive_storage_key, encrypt_record};
pub use seal::{
    EnvelopeKind, NONCE_SIZE, SEAL_OVERHEAD, SealRandomness, envelope_kind, open,
    open_any, open_authenticated, seal, seal_authenticated,
};
pub use vault::{
    PBKDF2_ITERATIONS, SALT_SIZE, WrapKey, WrappedPrivateKey, derive_wrap_key,
    unwrap_private_key, unwrap_with_password, wrap_private_key, wrap_with_password,
};
