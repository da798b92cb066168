//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to check that the stores
//! above it report storage failures without losing in-memory state.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sealchat_proto::StoredEncryptedMessage;

use super::{Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. A failed operation never
/// reaches the inner storage, so every write is all-or-nothing.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Injected failures so far
    failures: Arc<Mutex<usize>>,
}

/// Linear congruential generator, reproducible from its seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Wrap `inner` with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            failures: Arc::new(Mutex::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Number of operations that were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        #[allow(clippy::expect_used)]
        *self.failures.lock().expect("failures mutex poisoned")
    }

    fn chaos(&self) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let fail = self.rng.lock().expect("ChaoticRng mutex poisoned").next() < self.failure_rate;
        if !fail {
            return Ok(());
        }

        #[allow(clippy::expect_used)]
        let mut failures = self.failures.lock().expect("failures mutex poisoned");
        *failures += 1;
        Err(StorageError::Io("chaotic failure injection".to_string()))
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn put_message(&self, record: &StoredEncryptedMessage) -> Result<(), StorageError> {
        self.chaos()?;
        self.inner.put_message(record)
    }

    fn messages_for_chat(
        &self,
        chat_id: &str,
    ) -> Result<Vec<StoredEncryptedMessage>, StorageError> {
        self.chaos()?;
        self.inner.messages_for_chat(chat_id)
    }

    fn delete_message(&self, message_key: &str) -> Result<bool, StorageError> {
        self.chaos()?;
        self.inner.delete_message(message_key)
    }

    fn delete_messages_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.chaos()?;
        self.inner.delete_messages_before(cutoff)
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.chaos()?;
        self.inner.put_meta(key, value)
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.chaos()?;
        self.inner.get_meta(key)
    }

    fn delete_meta(&self, key: &str) -> Result<(), StorageError> {
        self.chaos()?;
        self.inner.delete_meta(key)
    }
}
