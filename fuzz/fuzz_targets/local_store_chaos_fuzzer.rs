//! Fuzz target for the encrypted local store under storage failures
//!
//! Uses ChaoticStorage to fail writes, reads and deletes at a chosen rate
//! (MEDIUM priority)
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Interleaved saves, overwrites, deletes, loads and cleanups
//! - A shadow model of what storage must contain after each success
//!
//! # Invariants
//!
//! - The store NEVER panics on storage errors
//! - A failed operation changes nothing
//! - A successful load returns exactly the model, sorted by creation time
//! - Every record decrypts with the session key

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use chrono::{DateTime, TimeDelta, Utc};
use libfuzzer_sys::fuzz_target;
use sealchat_crypto::StorageKey;
use sealchat_proto::Message;
use sealchat_store::{ChaoticStorage, LocalStore, MemoryStorage};

const CHAT: &str = "chat";

#[derive(Debug, Clone, Arbitrary)]
enum Operation {
    Save { id: u8, secs: u8, text: String },
    Delete { id: u8 },
    Load,
    Cleanup { days: u8, now_days: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    key: [u8; 32],
    operations: Vec<Operation>,
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let storage =
        ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, scenario.chaos_seed);
    let store = LocalStore::new(storage, StorageKey::from_bytes(scenario.key));

    let mut model: BTreeMap<String, Message> = BTreeMap::new();
    let mut iv_counter = 0u64;

    for operation in scenario.operations {
        match operation {
            Operation::Save { id, secs, text } => {
                let message = Message {
                    id: format!("temp_{id}"),
                    chat_id: CHAT.to_string(),
                    sender_id: "me".to_string(),
                    receiver_id: "peer".to_string(),
                    ciphertext: format!("sealed-{id}"),
                    plaintext: Some(text),
                    created_at: at(i64::from(secs) * 86_400),
                    status: None,
                    nonce: None,
                    server_id: None,
                };
                iv_counter += 1;
                let mut iv = [0u8; 12];
                iv[..8].copy_from_slice(&iv_counter.to_le_bytes());

                if store.save_message(CHAT, &message, iv).is_ok() {
                    model.insert(message.id.clone(), message);
                }
            },

            Operation::Delete { id } => {
                let id = format!("temp_{id}");
                if let Ok(existed) = store.delete_message(CHAT, &id) {
                    assert_eq!(existed, model.remove(&id).is_some(), "delete disagrees with model");
                }
            },

            Operation::Load => {
                if let Ok(loaded) = store.load_messages(CHAT) {
                    assert!(loaded.windows(2).all(|w| w[0].created_at <= w[1].created_at));
                    let mut expected: Vec<&Message> = model.values().collect();
                    let mut actual: Vec<&Message> = loaded.iter().collect();
                    actual.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
                    expected.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
                    assert_eq!(actual, expected, "load disagrees with model");
                }
            },

            Operation::Cleanup { days, now_days } => {
                let now = at(i64::from(now_days) * 86_400);
                if store.cleanup_old_messages(u32::from(days), now).is_ok() {
                    let cutoff = now - TimeDelta::days(i64::from(days));
                    model.retain(|_, m| m.created_at >= cutoff);
                }
            },
        }
    }
});
