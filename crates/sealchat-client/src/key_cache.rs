//! Session-scoped cache of other users' public keys.
//!
//! Owned by one [`crate::Session`] and emptied on logout, so keys never leak
//! across accounts on a shared device. An optional TTL bounds how long a
//! rotated key can keep being used.

use std::{collections::HashMap, time::Duration};

use sealchat_crypto::PublicKey;

use crate::{env::Environment, error::ClientError, transport::Api};

struct CachedKey<I> {
    key: PublicKey,
    fetched_at: I,
}

/// Public key cache with lookup-through to the user directory.
pub struct PublicKeyCache<E: Environment> {
    env: E,
    ttl: Option<Duration>,
    entries: HashMap<String, CachedKey<E::Instant>>,
}

impl<E: Environment> PublicKeyCache<E> {
    /// Create an empty cache. `ttl = None` keeps entries until cleared.
    pub fn new(env: E, ttl: Option<Duration>) -> Self {
        Self { env, ttl, entries: HashMap::new() }
    }

    /// Public key of `user_id`, fetched from `directory` on a miss.
    ///
    /// A fetched key is validated before it is cached; a failed fetch leaves
    /// the cache untouched.
    pub async fn get_public_key<A: Api + ?Sized>(
        &mut self,
        user_id: &str,
        directory: &A,
    ) -> Result<PublicKey, ClientError> {
        if let Some(key) = self.get(user_id) {
            return Ok(key);
        }

        let encoded = directory.public_key(user_id).await?;
        let key = PublicKey::from_base64(encoded.trim())?;
        self.insert(user_id, key);
        tracing::debug!(user_id, "cached public key");
        Ok(key)
    }

    /// Cached key of `user_id` without fetching. Expired entries miss.
    pub fn get(&self, user_id: &str) -> Option<PublicKey> {
        let entry = self.entries.get(user_id)?;
        if let Some(ttl) = self.ttl
            && self.env.now() - entry.fetched_at >= ttl
        {
            return None;
        }
        Some(entry.key)
    }

    /// Cache a key learned out of band.
    pub fn insert(&mut self, user_id: &str, key: PublicKey) {
        let fetched_at = self.env.now();
        self.entries.insert(user_id.to_string(), CachedKey { key, fetched_at });
    }

    /// Forget one user's key, e.g. after it failed to open their messages.
    pub fn invalidate(&mut self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    /// Forget every key. Called on logout.
    pub fn clear_cache(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
