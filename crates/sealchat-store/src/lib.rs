//! Sealchat local persistence
//!
//! Everything the client keeps on the device, behind one synchronous
//! [`Storage`] boundary:
//!
//! ```text
//! KeyVaultStore ──► meta table      (wrapped private key, salt, current user)
//! LocalStore    ──► messages table  (AES-GCM records) + chat index
//!                        │
//!                        ▼
//!        MemoryStorage | RedbStorage | ChaoticStorage<S>
//! ```
//!
//! Nothing here ever writes an unwrapped private key or an unencrypted message
//! to storage. Callers provide the random bytes (IVs, salts, key seeds).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod error;
mod key_vault;
mod local_store;
pub mod storage;

pub use config::VaultConfig;
pub use error::StorageError;
pub use key_vault::{
    CURRENT_USER_KEY, KeyVaultStore, LEGACY_SALT_KEY, Registration, UnlockedKeys,
    private_key_key, salt_key,
};
pub use local_store::LocalStore;
pub use storage::{ChaoticStorage, MemoryStorage, RedbStorage, Storage};
