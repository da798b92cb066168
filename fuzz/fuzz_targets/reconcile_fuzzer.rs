//! Fuzz target for chat reconciliation
//!
//! Server history is untrusted: ids may repeat, timestamps may collide and
//! ciphertexts may be garbage (HIGH priority)
//!
//! # Strategy
//!
//! - Own local records, some echoed by the server with a status
//! - Server messages from either participant with arbitrary ciphertext
//! - Colliding ids and timestamps between all three sources
//!
//! # Invariants
//!
//! - Reconciliation NEVER panics
//! - Output is sorted by creation time with unique ids
//! - Same inputs produce the same output
//! - Only our own messages are written back, each with its local plaintext
//! - Written-back records are marked confirmed and stay out of the pending set
//! - Every own local record stays visible

#![no_main]

use std::collections::{HashMap, HashSet};

use arbitrary::Arbitrary;
use chrono::DateTime;
use libfuzzer_sys::fuzz_target;
use sealchat_client::{Reconciler, SessionConfig};
use sealchat_crypto::generate_key_pair;
use sealchat_proto::{ChatItem, MediaFile, Message, MessageStatus};

#[derive(Debug, Clone, Arbitrary)]
struct LocalInput {
    id: u8,
    secs: u8,
    nonce: Option<u8>,
    text: String,
}

#[derive(Debug, Clone, Arbitrary)]
struct ServerInput {
    id: u8,
    secs: u8,
    from_me: bool,
    nonce: Option<u8>,
    /// Reuse the ciphertext of this local record instead of `ciphertext`
    echo_of: Option<u8>,
    ciphertext: String,
    seen: Option<bool>,
}

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    local: Vec<LocalInput>,
    server: Vec<ServerInput>,
    media: Vec<(u8, u8)>,
}

fn message(id: String, sender: &str, ciphertext: String, secs: u8) -> Message {
    Message {
        id,
        chat_id: "chat".to_string(),
        sender_id: sender.to_string(),
        receiver_id: if sender == "me" { "peer" } else { "me" }.to_string(),
        ciphertext,
        plaintext: None,
        created_at: DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default(),
        status: None,
        nonce: None,
        server_id: None,
    }
}

fuzz_target!(|scenario: Scenario| {
    let keys = generate_key_pair([7; 32]);
    let config = SessionConfig::default();
    let reconciler = Reconciler::new("me", &keys.private_key, &config);

    let local: Vec<Message> = scenario
        .local
        .iter()
        .map(|input| {
            let mut record =
                message(format!("temp_{}", input.id), "me", format!("own-{}", input.id), input.secs);
            record.plaintext = Some(input.text.clone());
            record.nonce = input.nonce.map(|n| format!("nonce-{n}"));
            record
        })
        .collect();

    let server: Vec<Message> = scenario
        .server
        .iter()
        .map(|input| {
            let sender = if input.from_me { "me" } else { "peer" };
            let ciphertext = match input.echo_of {
                Some(index) if !local.is_empty() => {
                    local[usize::from(index) % local.len()].ciphertext.clone()
                },
                _ => input.ciphertext.clone(),
            };
            let mut server = message(format!("msg-{}", input.id), sender, ciphertext, input.secs);
            server.nonce = input.nonce.map(|n| format!("nonce-{n}"));
            server.status = input
                .seen
                .map(|seen| if seen { MessageStatus::Seen } else { MessageStatus::Delivered });
            server
        })
        .collect();

    let media: Vec<MediaFile> = scenario
        .media
        .iter()
        .map(|&(id, secs)| MediaFile {
            id: format!("media-{id}"),
            chat_id: "chat".to_string(),
            sender_id: "peer".to_string(),
            receiver_id: "me".to_string(),
            file_name: "file".to_string(),
            file_type: "application/octet-stream".to_string(),
            file_size: 1,
            url: "/uploads/file".to_string(),
            created_at: DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default(),
        })
        .collect();

    let result = reconciler.reconcile(&local, server.clone(), media.clone(), &HashMap::new());
    let again = reconciler.reconcile(&local, server, media, &HashMap::new());
    assert_eq!(result, again, "reconciliation is not deterministic");

    assert!(result.items.windows(2).all(|w| w[0].created_at() <= w[1].created_at()));
    let ids: HashSet<&str> = result.items.iter().map(ChatItem::id).collect();
    assert_eq!(ids.len(), result.items.len(), "duplicate ids in timeline");

    for record in &local {
        assert!(ids.contains(record.id.as_str()), "local record {} vanished", record.id);
    }

    for record in &result.to_persist {
        assert_eq!(record.sender_id, "me");
        assert!(!record.is_pending(), "persisted {} still pending", record.id);
        assert!(
            local.iter().any(|m| m.id == record.id && m.plaintext == record.plaintext),
            "persisted {} without its local plaintext",
            record.id
        );
    }
});
