//! Reconciliation Engine
//!
//! Merges the three message sources of a chat into one ordered view:
//!
//! ```text
//!  local records ──────┐  (own sends, with plaintext)
//!  server messages ────┼──► classify ──► merge & sort ──► items
//!  server media ───────┘        │
//!                               └──► own records confirmed or changed ──► to_persist
//! ```
//!
//! Classification of a server message:
//!
//! - Ours, with a local record (same nonce, ciphertext or id): keep the local
//!   record, remember the server id as confirmation and adopt the server
//!   status. Status only flows server to local.
//! - Ours, without a local record: sent from another session. It is sealed to
//!   the recipient, so it shows the foreign-session placeholder.
//! - Theirs: open with our private key. A failure yields the decrypt-failure
//!   placeholder and never aborts the pass.
//!
//! Output order is ascending by creation time. Ties keep concatenation order:
//! server messages, then unconfirmed local records, then media. The merge is a
//! pure function of its inputs.
//!
//! Plaintext of other users' messages is never part of `to_persist`.

use std::collections::{HashMap, HashSet};

use base64::{Engine, engine::general_purpose::STANDARD};
use sealchat_crypto::{CryptoError, PrivateKey, PublicKey, open_any};
use sealchat_proto::{ChatItem, MediaFile, Message};

use crate::{config::SessionConfig, timeline::ChatTimeline};

/// Result of a full reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Merged timeline, ascending by creation time.
    pub items: Vec<ChatItem>,
    /// Own records newly confirmed or whose status changed, to be written
    /// back.
    pub to_persist: Vec<Message>,
    /// Messages shown with the decrypt-failure placeholder.
    pub decrypt_failures: usize,
}

/// How a single live message relates to the current timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Not seen before; insert it.
    New(Message),
    /// Server echo of one of our records; replace it and write it back.
    Echo(Message),
    /// Already present with nothing new.
    Duplicate,
}

/// Pure merge logic bound to one session's identity.
pub struct Reconciler<'a> {
    own_id: &'a str,
    private_key: &'a PrivateKey,
    config: &'a SessionConfig,
}

impl<'a> Reconciler<'a> {
    /// Reconciler for `own_id`, opening with `private_key`.
    pub fn new(own_id: &'a str, private_key: &'a PrivateKey, config: &'a SessionConfig) -> Self {
        Self { own_id, private_key, config }
    }

    /// Merge local records with the server's messages and media.
    ///
    /// `sender_keys` maps peers to their public keys and is consulted for
    /// authenticated envelopes only.
    pub fn reconcile(
        &self,
        local: &[Message],
        server_messages: Vec<Message>,
        server_media: Vec<MediaFile>,
        sender_keys: &HashMap<String, PublicKey>,
    ) -> Reconciliation {
        let own_local: Vec<&Message> = local.iter().filter(|m| m.is_from(self.own_id)).collect();
        let mut by_nonce = HashMap::new();
        let mut by_ciphertext = HashMap::new();
        let mut by_id = HashMap::new();
        for (index, record) in own_local.iter().enumerate() {
            if let Some(nonce) = &record.nonce {
                by_nonce.entry(nonce.as_str()).or_insert(index);
            }
            by_ciphertext.entry(record.ciphertext.as_str()).or_insert(index);
            by_id.entry(record.id.as_str()).or_insert(index);
            if let Some(server_id) = &record.server_id {
                by_id.entry(server_id.as_str()).or_insert(index);
            }
        }
        let mut matched = vec![false; own_local.len()];

        let mut result = Reconciliation::default();
        let mut seen = HashSet::new();
        let mut texts = Vec::with_capacity(server_messages.len());

        for server in server_messages {
            if !seen.insert(server.id.clone()) {
                continue;
            }

            if !server.is_from(self.own_id) {
                let sender_key = sender_keys.get(&server.sender_id);
                let (message, opened) = self.decrypt(server, sender_key);
                if !opened {
                    result.decrypt_failures += 1;
                }
                texts.push(message);
                continue;
            }

            let local_match = [
                server.nonce.as_deref().and_then(|nonce| by_nonce.get(nonce)),
                by_ciphertext.get(server.ciphertext.as_str()),
                by_id.get(server.id.as_str()),
            ]
            .into_iter()
            .flatten()
            .copied()
            .find(|&index| !matched[index]);

            match local_match {
                Some(index) => {
                    matched[index] = true;
                    let mut record = own_local[index].clone();
                    if confirm(&mut record, &server) {
                        result.to_persist.push(record.clone());
                    }
                    texts.push(record);
                },
                None => texts.push(self.foreign(server)),
            }
        }

        let pending = own_local
            .iter()
            .zip(&matched)
            .filter(|(_, matched)| !**matched)
            .map(|(record, _)| (*record).clone());

        let mut ids = HashSet::new();
        let mut items: Vec<ChatItem> = texts
            .into_iter()
            .chain(pending)
            .map(ChatItem::Message)
            .chain(server_media.into_iter().map(ChatItem::Media))
            .filter(|item| ids.insert(item.id().to_string()))
            .collect();
        items.sort_by_key(ChatItem::created_at);

        tracing::debug!(
            items = items.len(),
            persisted = result.to_persist.len(),
            decrypt_failures = result.decrypt_failures,
            "reconciled chat"
        );

        result.items = items;
        result
    }

    /// Classify one live message against the chat's current timeline.
    pub fn classify_incoming(
        &self,
        message: Message,
        timeline: Option<&ChatTimeline>,
        sender_key: Option<&PublicKey>,
    ) -> Incoming {
        if message.is_from(self.own_id) {
            if let Some(existing) = timeline.and_then(|t| t.find_own_echo(&message)) {
                if !existing.is_local_record() {
                    return Incoming::Duplicate;
                }
                let mut record = existing.clone();
                return if confirm(&mut record, &message) {
                    Incoming::Echo(record)
                } else {
                    Incoming::Duplicate
                };
            }
            if timeline.is_some_and(|t| t.contains(&message.id)) {
                return Incoming::Duplicate;
            }
            return Incoming::New(self.foreign(message));
        }

        if timeline.is_some_and(|t| t.contains(&message.id)) {
            return Incoming::Duplicate;
        }
        Incoming::New(self.decrypt(message, sender_key).0)
    }

    /// Open a base64 envelope addressed to us.
    ///
    /// Shared by the timeline and the notification path.
    pub fn open_text(
        &self,
        ciphertext: &str,
        sender_key: Option<&PublicKey>,
    ) -> Result<String, CryptoError> {
        let envelope = STANDARD.decode(ciphertext.trim())?;
        let plaintext = open_any(&envelope, self.private_key, sender_key)?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption { reason: "plaintext is not UTF-8".to_string() })
    }

    fn decrypt(&self, mut message: Message, sender_key: Option<&PublicKey>) -> (Message, bool) {
        match self.open_text(&message.ciphertext, sender_key) {
            Ok(text) => {
                message.plaintext = Some(text);
                (message, true)
            },
            Err(err) => {
                tracing::warn!(
                    id = %message.id,
                    sender = %message.sender_id,
                    %err,
                    "cannot open message"
                );
                message.plaintext = Some(self.config.decrypt_failure_placeholder.clone());
                (message, false)
            },
        }
    }

    fn foreign(&self, mut message: Message) -> Message {
        message.plaintext = Some(self.config.foreign_session_placeholder.clone());
        message
    }
}

/// Mark `record` as confirmed by `server` and adopt its status.
///
/// Returns true if the record changed.
fn confirm(record: &mut Message, server: &Message) -> bool {
    let mut changed = false;
    if record.server_id.is_none() {
        record.server_id = Some(server.id.clone());
        changed = true;
    }
    if let Some(status) = server.status
        && record.status != Some(status)
    {
        record.status = Some(status);
        changed = true;
    }
    changed
}
