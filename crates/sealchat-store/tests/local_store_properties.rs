//! Property-based tests for the Encrypted Local Store
//!
//! - Saving the same message id twice yields one logical record
//! - `load_messages` is ascending by creation time whatever the insert order
//! - Loading is restartable: repeated loads return identical sequences

use chrono::DateTime;
use proptest::prelude::*;
use sealchat_crypto::{IV_SIZE, StorageKey};
use sealchat_proto::Message;
use sealchat_store::{LocalStore, MemoryStorage};

fn message(id: usize, secs: i64) -> Message {
    Message {
        id: format!("m{id}"),
        chat_id: "chat".to_string(),
        sender_id: "alice".to_string(),
        receiver_id: "bob".to_string(),
        ciphertext: format!("ct{id}"),
        plaintext: Some(format!("text {id}")),
        created_at: DateTime::from_timestamp(secs, 0).unwrap(),
        status: None,
        nonce: None,
        server_id: None,
    }
}

fn store() -> LocalStore<MemoryStorage> {
    LocalStore::new(MemoryStorage::new(), StorageKey::from_bytes([0x5A; 32]))
}

proptest! {
    #[test]
    fn prop_load_is_sorted_for_any_insert_order(
        timestamps in prop::collection::vec(0i64..1_000_000, 1..30),
        order in any::<prop::sample::Index>(),
    ) {
        let store = store();
        let mut messages: Vec<_> =
            timestamps.iter().enumerate().map(|(i, &t)| message(i, t)).collect();
        let rotate = order.index(messages.len());
        messages.rotate_left(rotate);

        for (i, msg) in messages.iter().enumerate() {
            store.save_message("chat", msg, [i as u8; IV_SIZE]).unwrap();
        }

        let loaded = store.load_messages("chat").unwrap();
        prop_assert_eq!(loaded.len(), messages.len());
        prop_assert!(loaded.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        prop_assert_eq!(store.load_messages("chat").unwrap(), loaded);
    }

    #[test]
    fn prop_repeated_saves_are_one_record(
        ids in prop::collection::vec(0usize..8, 1..40),
    ) {
        let store = store();
        for (i, id) in ids.iter().enumerate() {
            store.save_message("chat", &message(*id, *id as i64), [i as u8; IV_SIZE]).unwrap();
        }

        let mut distinct = ids.clone();
        distinct.sort_unstable();
        distinct.dedup();

        let loaded = store.load_messages("chat").unwrap();
        prop_assert_eq!(loaded.len(), distinct.len());
        prop_assert_eq!(store.storage().message_count(), distinct.len());
    }
}
