//! Chaos property tests for the stores
//!
//! Wraps the backends in `ChaoticStorage` and checks:
//! - Failed saves leave no partial records
//! - Every successful save is readable afterwards
//! - Vault failures are reported, never turned into wrong key material

use chrono::DateTime;
use proptest::prelude::*;
use sealchat_crypto::{IV_SIZE, KEY_SIZE, SALT_SIZE, StorageKey};
use sealchat_proto::Message;
use sealchat_store::{
    ChaoticStorage, KeyVaultStore, LocalStore, MemoryStorage, RedbStorage, Registration, Storage,
    StorageError, VaultConfig,
};
use tempfile::tempdir;

fn message(i: usize) -> Message {
    Message {
        id: format!("m{i}"),
        chat_id: "chat".to_string(),
        sender_id: "alice".to_string(),
        receiver_id: "bob".to_string(),
        ciphertext: format!("ct{i}"),
        plaintext: Some(format!("text {i}")),
        created_at: DateTime::from_timestamp(i as i64, 0).unwrap(),
        status: None,
        nonce: None,
        server_id: None,
    }
}

/// Save `count` messages, returning the ids whose save succeeded.
fn save_all<S: Storage>(store: &LocalStore<S>, count: usize) -> Vec<String> {
    let mut saved = Vec::new();
    for i in 0..count {
        match store.save_message("chat", &message(i), [i as u8; IV_SIZE]) {
            Ok(()) => saved.push(message(i).id),
            Err(StorageError::Io(_)) => {},
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    saved
}

#[test]
fn prop_memory_chaos_saves_are_all_or_nothing() {
    proptest!(|(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        count in 1usize..60,
    )| {
        let chaotic = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let key = StorageKey::from_bytes([3; 32]);
        let store = LocalStore::new(chaotic.clone(), key.clone());

        let saved = save_all(&store, count);

        // ORACLE: read through the undisturbed backend
        let reader = LocalStore::new(chaotic.inner().clone(), key);
        let loaded: Vec<_> =
            reader.load_messages("chat").unwrap().into_iter().map(|m| m.id).collect();

        prop_assert_eq!(loaded, saved.clone());
        prop_assert_eq!(chaotic.inner().message_count(), saved.len());
        prop_assert_eq!(chaotic.injected_failures(), count - saved.len());
    });
}

#[test]
fn prop_redb_chaos_saves_are_all_or_nothing() {
    proptest!(ProptestConfig::with_cases(16), |(
        failure_rate in 0.0..0.8,
        seed in any::<u64>(),
        count in 1usize..30,
    )| {
        let dir = tempdir().unwrap();
        let redb = RedbStorage::open(dir.path().join("db")).unwrap();
        let chaotic = ChaoticStorage::with_seed(redb, failure_rate, seed);
        let key = StorageKey::from_bytes([3; 32]);

        let saved = save_all(&LocalStore::new(chaotic.clone(), key.clone()), count);

        let reader = LocalStore::new(chaotic.inner().clone(), key);
        let loaded: Vec<_> =
            reader.load_messages("chat").unwrap().into_iter().map(|m| m.id).collect();
        prop_assert_eq!(loaded, saved);
    });
}

#[test]
fn prop_vault_chaos_never_yields_wrong_key() {
    proptest!(ProptestConfig::with_cases(32), |(
        failure_rate in 0.0..0.6,
        seed in any::<u64>(),
    )| {
        let chaotic = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
        let vault = KeyVaultStore::new(chaotic.clone(), VaultConfig { pbkdf2_iterations: 4 });
        let registration =
            Registration { key_seed: [1; KEY_SIZE], salt: [2; SALT_SIZE], iv: [3; IV_SIZE] };

        let Ok(pair) = vault.register("alice", "pw", &registration) else {
            return Ok(());
        };

        for _ in 0..10 {
            match vault.unlock("alice", "pw") {
                Ok(keys) => prop_assert_eq!(keys.key_pair.public_key, pair.public_key),
                Err(StorageError::Io(_)) => {},
                Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
            }
        }
    });
}
