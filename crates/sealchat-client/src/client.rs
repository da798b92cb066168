//! Client state machine.
//!
//! The `Client` owns the unlocked identity, the per-chat timelines, the chat
//! list and the presence map. It never performs I/O: every side effect is
//! returned as a [`ClientAction`].

use std::collections::HashMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use sealchat_crypto::{KeyPair, PublicKey, SealRandomness, seal, seal_authenticated};
use sealchat_proto::{
    Chat, ChatItem, FilePayload, MediaFile, MediaUpload, Message, OutboundEvent, TEMP_ID_PREFIX,
};

use crate::{
    config::SessionConfig,
    env::Environment,
    error::ClientError,
    event::{ClientAction, ClientEvent, Presence},
    reconcile::{Incoming, Reconciler},
    timeline::{ChatTimeline, LoadTicket},
};

/// Client identity.
///
/// Owns the unlocked key pair for the lifetime of the session. Dropped (and
/// the private key zeroized) on logout.
pub struct ClientIdentity {
    /// Our user id as known to the server.
    pub user_id: String,
    /// Unlocked key pair.
    pub key_pair: KeyPair,
}

impl ClientIdentity {
    /// Create an identity from an unlocked key pair.
    pub fn new(user_id: impl Into<String>, key_pair: KeyPair) -> Self {
        Self { user_id: user_id.into(), key_pair }
    }
}

/// Sans-IO chat client.
pub struct Client<E: Environment> {
    /// Environment for randomness and clocks.
    env: E,

    config: SessionConfig,

    /// `None` once logged out.
    identity: Option<ClientIdentity>,

    /// Timelines of chats that have been opened or written to.
    timelines: HashMap<String, ChatTimeline>,

    /// Chat list, most recent activity first.
    chats: Vec<Chat>,

    presence: HashMap<String, Presence>,

    active_chat: Option<String>,
}

impl<E: Environment> Client<E> {
    /// Create a client for an unlocked identity.
    pub fn new(env: E, config: SessionConfig, identity: ClientIdentity) -> Self {
        Self {
            env,
            config,
            identity: Some(identity),
            timelines: HashMap::new(),
            chats: Vec::new(),
            presence: HashMap::new(),
            active_chat: None,
        }
    }

    /// Our user id, `None` after logout.
    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.user_id.as_str())
    }

    /// Our public key, `None` after logout.
    pub fn public_key(&self) -> Option<PublicKey> {
        self.identity.as_ref().map(|identity| identity.key_pair.public_key)
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Timeline of a chat, if it has been loaded or written to.
    pub fn timeline(&self, chat_id: &str) -> Option<&ChatTimeline> {
        self.timelines.get(chat_id)
    }

    /// Chat list, most recent activity first.
    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    /// Last known presence of a user.
    pub fn presence(&self, user_id: &str) -> Option<Presence> {
        self.presence.get(user_id).copied()
    }

    /// Chat the user is looking at.
    pub fn active_chat(&self) -> Option<&str> {
        self.active_chat.as_deref()
    }

    /// Decrypt an encrypted notification payload.
    ///
    /// Uses the same open path as the timeline.
    pub fn decrypt_notification(
        &self,
        payload: &str,
        sender_key: Option<&PublicKey>,
    ) -> Result<String, ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::NotLoggedIn)?;
        let reconciler =
            Reconciler::new(&identity.user_id, &identity.key_pair.private_key, &self.config);
        Ok(reconciler.open_text(payload, sender_key)?)
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        if self.identity.is_none() && !matches!(event, ClientEvent::Logout) {
            return Err(ClientError::NotLoggedIn);
        }

        match event {
            ClientEvent::SendMessage { chat_id, receiver_id, text, recipient_key } => {
                self.handle_send_message(chat_id, receiver_id, text, &recipient_key)
            },
            ClientEvent::SendMedia { chat_id, receiver_id, file } => {
                Ok(self.handle_send_media(chat_id, receiver_id, file))
            },
            ClientEvent::DiscardMessage { chat_id, message_id } => {
                Ok(self.handle_discard(chat_id, message_id))
            },
            ClientEvent::BeginLoad { chat_id } => Ok(vec![self.begin_load(chat_id)]),
            ClientEvent::HistoryLoaded {
                chat_id,
                ticket,
                local,
                server_messages,
                server_media,
                sender_keys,
            } => self.handle_history_loaded(
                chat_id,
                ticket,
                &local,
                server_messages,
                server_media,
                &sender_keys,
            ),
            ClientEvent::MessageReceived { message, sender_key } => {
                self.handle_message_received(message, sender_key.as_ref())
            },
            ClientEvent::MediaReceived(file) => Ok(self.handle_media_received(file)),
            ClientEvent::MessageNotification { chat_id, message_id } => {
                Ok(self.handle_notification(chat_id, message_id))
            },
            ClientEvent::UserStatus { user_id, online, last_seen } => {
                let presence = Presence { online, last_seen };
                self.presence.insert(user_id.clone(), presence);
                Ok(vec![ClientAction::PresenceChanged { user_id, presence }])
            },
            ClientEvent::ChatsLoaded(chats) => Ok(vec![self.handle_chats_loaded(chats)]),
            ClientEvent::OpenChat { chat_id } => Ok(self.handle_open_chat(chat_id)),
            ClientEvent::Logout => Ok(self.handle_logout()),
        }
    }

    fn handle_send_message(
        &mut self,
        chat_id: String,
        receiver_id: String,
        text: String,
        recipient_key: &PublicKey,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::NotLoggedIn)?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let randomness = SealRandomness {
            ephemeral_seed: self.env.random_array(),
            nonce: self.env.random_array(),
        };
        let envelope = if self.config.authenticated_seal {
            seal_authenticated(
                text.as_bytes(),
                recipient_key,
                &identity.key_pair.private_key,
                randomness,
            )?
        } else {
            seal(text.as_bytes(), recipient_key, randomness)?
        };

        let message = Message {
            id: format!("{TEMP_ID_PREFIX}{:016x}", self.env.random_u64()),
            chat_id: chat_id.clone(),
            sender_id: identity.user_id.clone(),
            receiver_id,
            ciphertext: STANDARD.encode(envelope),
            plaintext: Some(text),
            created_at: self.env.wall_clock(),
            status: None,
            nonce: Some(format!("{:016x}", self.env.random_u64())),
            server_id: None,
        };

        let timeline = self.timelines.entry(chat_id.clone()).or_default();
        timeline.insert_live(ChatItem::Message(message.clone()));

        let mut actions = vec![
            ClientAction::TimelineUpdated {
                chat_id: chat_id.clone(),
                items: timeline.items().to_vec(),
            },
            ClientAction::PersistMessage { chat_id: chat_id.clone(), message: message.clone() },
            ClientAction::Emit(OutboundEvent::SendMessage(message.without_plaintext())),
        ];
        actions.extend(self.touch_chat(
            &chat_id,
            message.plaintext.clone(),
            &message.sender_id,
            message.created_at,
            false,
        ));
        Ok(actions)
    }

    fn handle_send_media(
        &mut self,
        chat_id: String,
        receiver_id: String,
        file: FilePayload,
    ) -> Vec<ClientAction> {
        let sender_id = self.user_id().unwrap_or_default().to_string();
        let message = format!("uploading {} ({} bytes) to chat {chat_id}", file.name, file.size);
        vec![
            ClientAction::Emit(OutboundEvent::SendMedia(MediaUpload {
                chat_id,
                sender_id,
                receiver_id,
                file,
            })),
            ClientAction::Log { message },
        ]
    }

    fn handle_discard(&mut self, chat_id: String, message_id: String) -> Vec<ClientAction> {
        let Some(timeline) = self.timelines.get_mut(&chat_id) else {
            return vec![ClientAction::Log { message: format!("no timeline for chat {chat_id}") }];
        };
        let pending = timeline
            .items()
            .iter()
            .filter_map(ChatItem::as_message)
            .any(|m| m.id == message_id && m.is_pending());
        if !pending {
            return vec![ClientAction::Log {
                message: format!("message {message_id} is not pending, not discarded"),
            }];
        }

        timeline.remove(&message_id);
        vec![
            ClientAction::TimelineUpdated {
                chat_id: chat_id.clone(),
                items: timeline.items().to_vec(),
            },
            ClientAction::DeleteMessage { chat_id, message_id },
        ]
    }

    fn begin_load(&mut self, chat_id: String) -> ClientAction {
        let ticket = self.timelines.entry(chat_id.clone()).or_default().begin_load();
        ClientAction::FetchHistory { chat_id, ticket }
    }

    fn handle_history_loaded(
        &mut self,
        chat_id: String,
        ticket: LoadTicket,
        local: &[Message],
        server_messages: Vec<Message>,
        server_media: Vec<MediaFile>,
        sender_keys: &HashMap<String, PublicKey>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::NotLoggedIn)?;
        let reconciler =
            Reconciler::new(&identity.user_id, &identity.key_pair.private_key, &self.config);
        let result = reconciler.reconcile(local, server_messages, server_media, sender_keys);

        let timeline = self.timelines.entry(chat_id.clone()).or_default();
        if !timeline.apply_load(ticket, result.items) {
            return Ok(vec![ClientAction::Log {
                message: format!("discarded stale load {} for chat {chat_id}", ticket.sequence()),
            }]);
        }

        let mut actions = vec![ClientAction::TimelineUpdated {
            chat_id: chat_id.clone(),
            items: timeline.items().to_vec(),
        }];
        actions.extend(result.to_persist.into_iter().map(|message| {
            ClientAction::PersistMessage { chat_id: chat_id.clone(), message }
        }));
        if result.decrypt_failures > 0 {
            actions.push(ClientAction::Log {
                message: format!(
                    "{} message(s) in chat {chat_id} could not be decrypted",
                    result.decrypt_failures
                ),
            });
        }
        Ok(actions)
    }

    fn handle_message_received(
        &mut self,
        message: Message,
        sender_key: Option<&PublicKey>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let identity = self.identity.as_ref().ok_or(ClientError::NotLoggedIn)?;
        let reconciler =
            Reconciler::new(&identity.user_id, &identity.key_pair.private_key, &self.config);
        let chat_id = message.chat_id.clone();
        let message_id = message.id.clone();
        let incoming =
            reconciler.classify_incoming(message, self.timelines.get(&chat_id), sender_key);
        let own_id = identity.user_id.clone();

        let mut actions = Vec::new();
        match incoming {
            Incoming::New(message) => {
                if let Some(timeline) = self.timelines.get_mut(&chat_id) {
                    timeline.insert_live(ChatItem::Message(message.clone()));
                    actions.push(ClientAction::TimelineUpdated {
                        chat_id: chat_id.clone(),
                        items: timeline.items().to_vec(),
                    });
                }
                let unread =
                    !message.is_from(&own_id) && self.active_chat.as_deref() != Some(&chat_id);
                actions.extend(self.touch_chat(
                    &chat_id,
                    message.plaintext,
                    &message.sender_id,
                    message.created_at,
                    unread,
                ));
            },
            Incoming::Echo(record) => {
                if let Some(timeline) = self.timelines.get_mut(&chat_id) {
                    timeline.replace_message(record.clone());
                    actions.push(ClientAction::TimelineUpdated {
                        chat_id: chat_id.clone(),
                        items: timeline.items().to_vec(),
                    });
                }
                actions.push(ClientAction::PersistMessage { chat_id, message: record });
            },
            Incoming::Duplicate => actions.push(ClientAction::Log {
                message: format!("ignored duplicate message {message_id} in chat {chat_id}"),
            }),
        }
        Ok(actions)
    }

    fn handle_media_received(&mut self, file: MediaFile) -> Vec<ClientAction> {
        let chat_id = file.chat_id.clone();
        let mut actions = Vec::new();

        if let Some(timeline) = self.timelines.get_mut(&chat_id) {
            if !timeline.insert_live(ChatItem::Media(file.clone())) {
                return vec![ClientAction::Log {
                    message: format!("ignored duplicate media {} in chat {chat_id}", file.id),
                }];
            }
            actions.push(ClientAction::TimelineUpdated {
                chat_id: chat_id.clone(),
                items: timeline.items().to_vec(),
            });
        }

        let unread = self.user_id() != Some(file.sender_id.as_str())
            && self.active_chat.as_deref() != Some(&chat_id);
        actions.extend(self.touch_chat(
            &chat_id,
            Some(file.file_name),
            &file.sender_id,
            file.created_at,
            unread,
        ));
        actions
    }

    fn handle_notification(&mut self, chat_id: String, message_id: String) -> Vec<ClientAction> {
        if self.timelines.get(&chat_id).is_some_and(|t| t.contains(&message_id)) {
            return vec![ClientAction::Log {
                message: format!("notification for known message {message_id}"),
            }];
        }
        vec![ClientAction::FetchMessage { chat_id, message_id }]
    }

    fn handle_chats_loaded(&mut self, mut chats: Vec<Chat>) -> ClientAction {
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(active) = &self.active_chat
            && let Some(chat) = chats.iter_mut().find(|chat| &chat.id == active)
        {
            chat.unread_count = Some(0);
        }
        self.chats = chats;
        ClientAction::ChatListUpdated(self.chats.clone())
    }

    fn handle_open_chat(&mut self, chat_id: String) -> Vec<ClientAction> {
        self.active_chat = Some(chat_id.clone());

        let mut actions = Vec::new();
        if let Some(chat) = self.chats.iter_mut().find(|chat| chat.id == chat_id)
            && chat.unread() > 0
        {
            chat.unread_count = Some(0);
            actions.push(ClientAction::ChatListUpdated(self.chats.clone()));
        }
        actions.push(self.begin_load(chat_id));
        actions
    }

    fn handle_logout(&mut self) -> Vec<ClientAction> {
        self.identity = None;
        self.timelines.clear();
        self.chats.clear();
        self.presence.clear();
        self.active_chat = None;
        vec![ClientAction::SessionCleared]
    }

    /// Record activity in a chat of the chat list.
    ///
    /// Returns the updated list, or nothing if the chat is not listed.
    fn touch_chat(
        &mut self,
        chat_id: &str,
        preview: Option<String>,
        sender_id: &str,
        at: DateTime<Utc>,
        count_unread: bool,
    ) -> Option<ClientAction> {
        let chat = self.chats.iter_mut().find(|chat| chat.id == chat_id)?;
        if at >= chat.updated_at {
            chat.updated_at = at;
            chat.last_message = preview;
            chat.last_sender_id = Some(sender_id.to_string());
        }
        if count_unread {
            chat.unread_count = Some(chat.unread() + 1);
        }

        self.chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Some(ClientAction::ChatListUpdated(self.chats.clone()))
    }
}
