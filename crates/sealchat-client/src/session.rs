//! Session runtime.
//!
//! Drives a [`Client`] against real collaborators: executes its actions
//! against the encrypted local store, the API and the real-time channel, and
//! translates the results into [`SessionUpdate`]s for the UI.
//!
//! # Lifetime
//!
//! ```text
//!   Session::new ──► login ──► (send / load / on_inbound)* ──► logout
//!                      │                                         │
//!            unwrap private key,                      drop keys, timelines,
//!            derive storage key                       key cache, current user
//! ```
//!
//! # Failure semantics
//!
//! Storage failures never block the in-memory view: they are logged and
//! reported as [`SessionUpdate::StorageFailed`]. Transport failures while
//! executing actions are reported the same way. Errors returned by the
//! operations themselves mean nothing changed.

use std::collections::{HashMap, VecDeque};

use base64::{Engine, engine::general_purpose::STANDARD};
use sealchat_crypto::{EnvelopeKind, PublicKey, envelope_kind};
use sealchat_proto::{Chat, ChatItem, FilePayload, InboundEvent, Message};
use sealchat_store::{KeyVaultStore, LocalStore, Registration, Storage, VaultConfig};

use crate::{
    client::{Client, ClientIdentity},
    config::SessionConfig,
    env::Environment,
    error::{ClientError, TransportError},
    event::{ClientAction, ClientEvent, Presence},
    key_cache::PublicKeyCache,
    timeline::LoadTicket,
    transport::{Api, Realtime},
};

/// Change the UI should reflect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// New contents of a chat's timeline.
    Timeline {
        /// Chat that changed.
        chat_id: String,
        /// Items in display order.
        items: Vec<ChatItem>,
    },
    /// New chat list, most recent first.
    Chats(Vec<Chat>),
    /// A user's presence changed.
    Presence {
        /// User whose presence changed.
        user_id: String,
        /// New presence.
        presence: Presence,
    },
    /// Local persistence failed; the in-memory view is still current.
    StorageFailed {
        /// Chat whose records were affected.
        chat_id: String,
        /// Error description.
        reason: String,
    },
    /// A collaborator call made while executing an action failed.
    TransportFailed {
        /// What was being done.
        operation: String,
        /// Error description.
        reason: String,
    },
    /// The session ended.
    Cleared,
}

struct Active<E: Environment, S: Storage> {
    client: Client<E>,
    store: LocalStore<S>,
}

/// Authenticated chat session over storage `S`, API `A` and channel `R`.
pub struct Session<E, S, A, R>
where
    E: Environment,
    S: Storage,
    A: Api,
    R: Realtime,
{
    env: E,
    config: SessionConfig,
    storage: S,
    vault: KeyVaultStore<S>,
    api: A,
    realtime: R,
    keys: PublicKeyCache<E>,
    active: Option<Active<E, S>>,
}

impl<E, S, A, R> Session<E, S, A, R>
where
    E: Environment,
    S: Storage,
    A: Api,
    R: Realtime,
{
    /// Create a logged-out session.
    pub fn new(
        env: E,
        config: SessionConfig,
        storage: S,
        vault_config: VaultConfig,
        api: A,
        realtime: R,
    ) -> Self {
        let keys = PublicKeyCache::new(env.clone(), config.key_cache_ttl);
        let vault = KeyVaultStore::new(storage.clone(), vault_config);
        Self { env, config, storage, vault, api, realtime, keys, active: None }
    }

    /// Create an account on this device and return the public key to publish.
    ///
    /// # Errors
    ///
    /// - `Storage(AlreadyExists)` if the user already has a key here
    pub fn register(&self, username: &str, password: &str) -> Result<PublicKey, ClientError> {
        let registration = Registration {
            key_seed: self.env.random_array(),
            salt: self.env.random_array(),
            iv: self.env.random_array(),
        };
        let key_pair = self.vault.register(username, password, &registration)?;
        Ok(key_pair.public_key)
    }

    /// Re-wrap the stored private key under a new password.
    pub fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let iv = self.env.random_array();
        Ok(self.vault.change_password(username, old_password, new_password, iv)?)
    }

    /// User of the previous session on this device, if any.
    pub fn remembered_user(&self) -> Result<Option<String>, ClientError> {
        Ok(self.vault.current_user()?)
    }

    /// Unlock `username`'s keys and start the session.
    ///
    /// Also runs retention cleanup; a cleanup failure is only logged.
    ///
    /// # Errors
    ///
    /// - `Storage(NotFound)` if the user has no key on this device
    /// - `Storage(Crypto(KeyDerivation))` for a wrong password
    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ClientError> {
        let unlocked = self.vault.unlock(username, password)?;

        self.keys.clear_cache();
        self.active = Some(Active {
            client: Client::new(
                self.env.clone(),
                self.config.clone(),
                ClientIdentity::new(username, unlocked.key_pair),
            ),
            store: LocalStore::new(self.storage.clone(), unlocked.storage_key),
        });
        tracing::info!(username, "session started");

        if let Err(err) = self.cleanup() {
            tracing::warn!(%err, "retention cleanup failed");
        }
        Ok(())
    }

    /// True while keys are unlocked.
    pub fn is_logged_in(&self) -> bool {
        self.active.is_some()
    }

    /// The client state machine, while logged in.
    pub fn client(&self) -> Option<&Client<E>> {
        self.active.as_ref().map(|active| &active.client)
    }

    /// Items of a chat's timeline, if loaded.
    pub fn timeline(&self, chat_id: &str) -> Option<&[ChatItem]> {
        self.client()?.timeline(chat_id).map(|timeline| timeline.items())
    }

    /// The public key cache.
    pub fn key_cache(&self) -> &PublicKeyCache<E> {
        &self.keys
    }

    /// Fetch the chat list.
    pub async fn refresh_chats(&mut self) -> Result<Vec<SessionUpdate>, ClientError> {
        self.ensure_logged_in()?;
        let chats = self.api.chats().await?;
        self.run(ClientEvent::ChatsLoaded(chats)).await
    }

    /// Open a chat: mark it read and load its history.
    pub async fn open_chat(&mut self, chat_id: &str) -> Result<Vec<SessionUpdate>, ClientError> {
        self.run(ClientEvent::OpenChat { chat_id: chat_id.to_string() }).await
    }

    /// Reload a chat's history from the local store and the server.
    pub async fn load_chat(&mut self, chat_id: &str) -> Result<Vec<SessionUpdate>, ClientError> {
        self.run(ClientEvent::BeginLoad { chat_id: chat_id.to_string() }).await
    }

    /// Seal and send a text message.
    ///
    /// The optimistic entry is in the timeline and the local store before the
    /// channel is touched.
    ///
    /// # Errors
    ///
    /// - `Transport` or `Crypto` if the receiver's public key is unavailable
    /// - `EmptyMessage` for blank text
    pub async fn send_text(
        &mut self,
        chat_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<Vec<SessionUpdate>, ClientError> {
        self.ensure_logged_in()?;
        let recipient_key = self.keys.get_public_key(receiver_id, &self.api).await?;
        self.run(ClientEvent::SendMessage {
            chat_id: chat_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text: text.to_string(),
            recipient_key,
        })
        .await
    }

    /// Upload a file to a chat.
    pub async fn send_media(
        &mut self,
        chat_id: &str,
        receiver_id: &str,
        file: FilePayload,
    ) -> Result<Vec<SessionUpdate>, ClientError> {
        self.run(ClientEvent::SendMedia {
            chat_id: chat_id.to_string(),
            receiver_id: receiver_id.to_string(),
            file,
        })
        .await
    }

    /// Drop an unconfirmed optimistic message from the timeline and the
    /// local store.
    pub async fn discard_pending(
        &mut self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Vec<SessionUpdate>, ClientError> {
        self.run(ClientEvent::DiscardMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        })
        .await
    }

    /// React to an event from the real-time channel.
    pub async fn on_inbound(
        &mut self,
        event: InboundEvent,
    ) -> Result<Vec<SessionUpdate>, ClientError> {
        let event = match event {
            InboundEvent::ReceiveMessage(message) => {
                let sender_key =
                    self.sender_key_for(&message.sender_id, &message.ciphertext).await;
                ClientEvent::MessageReceived { message, sender_key }
            },
            InboundEvent::ReceiveMedia(file) => ClientEvent::MediaReceived(file),
            InboundEvent::NewMessageNotification { chat_id, message_id } => {
                ClientEvent::MessageNotification { chat_id, message_id }
            },
            InboundEvent::UserStatus { user_id, online, last_seen } => {
                ClientEvent::UserStatus { user_id, online, last_seen }
            },
        };
        self.run(event).await
    }

    /// Decode a named socket event and react to it.
    ///
    /// # Errors
    ///
    /// - `Protocol` if the name is unknown or the body does not match it;
    ///   nothing is changed
    pub async fn on_socket_event(
        &mut self,
        name: &str,
        body: &str,
    ) -> Result<Vec<SessionUpdate>, ClientError> {
        let event = InboundEvent::decode(name, body)?;
        self.on_inbound(event).await
    }

    /// Decrypt an encrypted push-notification payload for display.
    ///
    /// A payload that cannot be opened yields the decrypt-failure placeholder.
    /// An authenticated payload opened with a cached key that no longer works
    /// is retried once with a freshly fetched key.
    pub async fn decrypt_notification(
        &mut self,
        payload: &str,
        sender_id: Option<&str>,
    ) -> Result<String, ClientError> {
        self.ensure_logged_in()?;
        let sender_key = match sender_id {
            Some(sender_id) => self.sender_key_for(sender_id, payload).await,
            None => None,
        };

        let mut opened = self.open_notification(payload, sender_key.as_ref())?;
        if opened.is_none()
            && let (Some(sender_id), Some(stale)) = (sender_id, sender_key)
        {
            self.keys.invalidate(sender_id);
            let fresh = self.sender_key_for(sender_id, payload).await;
            if fresh.is_some_and(|fresh| fresh != stale) {
                opened = self.open_notification(payload, fresh.as_ref())?;
            }
        }

        Ok(opened.unwrap_or_else(|| self.config.decrypt_failure_placeholder.clone()))
    }

    /// Delete local records older than the retention period.
    pub fn cleanup(&self) -> Result<usize, ClientError> {
        let active = self.active.as_ref().ok_or(ClientError::NotLoggedIn)?;
        let removed =
            active.store.cleanup_old_messages(self.config.retention_days, self.env.wall_clock())?;
        Ok(removed)
    }

    /// End the session: drop keys, timelines and cached public keys, and
    /// forget the current user on this device.
    pub async fn logout(&mut self) -> Vec<SessionUpdate> {
        let updates = match self.run(ClientEvent::Logout).await {
            Ok(updates) => updates,
            Err(_) => vec![SessionUpdate::Cleared],
        };

        self.active = None;
        self.keys.clear_cache();
        if let Err(err) = self.vault.clear_current_user() {
            tracing::warn!(%err, "failed to forget current user");
        }
        tracing::info!("session ended");
        updates
    }

    fn ensure_logged_in(&self) -> Result<(), ClientError> {
        if self.active.is_some() { Ok(()) } else { Err(ClientError::NotLoggedIn) }
    }

    fn client_mut(&mut self) -> Result<&mut Client<E>, ClientError> {
        self.active.as_mut().map(|active| &mut active.client).ok_or(ClientError::NotLoggedIn)
    }

    /// Feed one event to the client and execute everything it asks for.
    async fn run(&mut self, event: ClientEvent) -> Result<Vec<SessionUpdate>, ClientError> {
        let actions = self.client_mut()?.handle(event)?;

        let mut queue = VecDeque::from(actions);
        let mut updates = Vec::new();
        while let Some(action) = queue.pop_front() {
            match action {
                ClientAction::Emit(event) => {
                    if let Err(err) = self.realtime.emit(&event).await {
                        tracing::warn!(event = event.name(), %err, "emit failed");
                        updates.push(SessionUpdate::TransportFailed {
                            operation: event.name().to_string(),
                            reason: err.reason,
                        });
                    }
                },
                ClientAction::PersistMessage { chat_id, message } => {
                    self.persist(&chat_id, &message, &mut updates);
                },
                ClientAction::DeleteMessage { chat_id, message_id } => {
                    self.delete(&chat_id, &message_id, &mut updates);
                },
                ClientAction::TimelineUpdated { chat_id, items } => {
                    updates.push(SessionUpdate::Timeline { chat_id, items });
                },
                ClientAction::ChatListUpdated(chats) => updates.push(SessionUpdate::Chats(chats)),
                ClientAction::FetchHistory { chat_id, ticket } => {
                    match self.fetch_history(chat_id.clone(), ticket, &mut updates).await {
                        Ok(loaded) => queue.extend(self.client_mut()?.handle(loaded)?),
                        Err(err) => updates.push(transport_failed("load history", &chat_id, &err)),
                    }
                },
                ClientAction::FetchMessage { chat_id, message_id } => {
                    match self.fetch_message(&chat_id, &message_id).await {
                        Ok(Some(received)) => queue.extend(self.client_mut()?.handle(received)?),
                        Ok(None) => {
                            tracing::debug!(%chat_id, %message_id, "notified message not found");
                        },
                        Err(err) => updates.push(transport_failed("fetch message", &chat_id, &err)),
                    }
                },
                ClientAction::PresenceChanged { user_id, presence } => {
                    updates.push(SessionUpdate::Presence { user_id, presence });
                },
                ClientAction::Log { message } => tracing::debug!(%message, "client"),
                ClientAction::SessionCleared => updates.push(SessionUpdate::Cleared),
            }
        }
        Ok(updates)
    }

    fn persist(&self, chat_id: &str, message: &Message, updates: &mut Vec<SessionUpdate>) {
        let Some(active) = &self.active else { return };
        let iv = self.env.random_array();
        if let Err(err) = active.store.save_message(chat_id, message, iv) {
            tracing::warn!(chat_id, id = %message.id, %err, "failed to persist message");
            updates.push(SessionUpdate::StorageFailed {
                chat_id: chat_id.to_string(),
                reason: err.to_string(),
            });
        }
    }

    fn delete(&self, chat_id: &str, message_id: &str, updates: &mut Vec<SessionUpdate>) {
        let Some(active) = &self.active else { return };
        if let Err(err) = active.store.delete_message(chat_id, message_id) {
            tracing::warn!(chat_id, message_id, %err, "failed to delete message");
            updates.push(SessionUpdate::StorageFailed {
                chat_id: chat_id.to_string(),
                reason: err.to_string(),
            });
        }
    }

    async fn fetch_history(
        &mut self,
        chat_id: String,
        ticket: LoadTicket,
        updates: &mut Vec<SessionUpdate>,
    ) -> Result<ClientEvent, TransportError> {
        let local = match &self.active {
            Some(active) => active.store.load_messages(&chat_id).unwrap_or_else(|err| {
                tracing::warn!(%chat_id, %err, "local history unavailable");
                updates.push(SessionUpdate::StorageFailed {
                    chat_id: chat_id.clone(),
                    reason: err.to_string(),
                });
                Vec::new()
            }),
            None => Vec::new(),
        };

        let server_messages = self.api.messages(&chat_id).await?;
        let server_media = self.api.media(&chat_id).await?;

        let mut sender_keys = HashMap::new();
        for message in &server_messages {
            if sender_keys.contains_key(&message.sender_id) {
                continue;
            }
            if let Some(key) = self.sender_key_for(&message.sender_id, &message.ciphertext).await {
                sender_keys.insert(message.sender_id.clone(), key);
            }
        }

        Ok(ClientEvent::HistoryLoaded {
            chat_id,
            ticket,
            local,
            server_messages,
            server_media,
            sender_keys,
        })
    }

    async fn fetch_message(
        &mut self,
        chat_id: &str,
        message_id: &str,
    ) -> Result<Option<ClientEvent>, TransportError> {
        let messages = self.api.messages(chat_id).await?;
        let Some(message) = messages.into_iter().find(|m| m.id == message_id) else {
            return Ok(None);
        };
        let sender_key = self.sender_key_for(&message.sender_id, &message.ciphertext).await;
        Ok(Some(ClientEvent::MessageReceived { message, sender_key }))
    }

    /// Public key of a peer, only when `ciphertext` is an authenticated
    /// envelope from someone other than us.
    ///
    /// Lookup failures are logged; the message then shows a placeholder.
    async fn sender_key_for(&mut self, sender_id: &str, ciphertext: &str) -> Option<PublicKey> {
        let own_id = self.client().and_then(Client::user_id);
        if own_id == Some(sender_id) || !is_authenticated(ciphertext) {
            return None;
        }

        match self.keys.get_public_key(sender_id, &self.api).await {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(sender_id, %err, "sender key unavailable");
                None
            },
        }
    }

    fn open_notification(
        &self,
        payload: &str,
        sender_key: Option<&PublicKey>,
    ) -> Result<Option<String>, ClientError> {
        let client = self.client().ok_or(ClientError::NotLoggedIn)?;
        match client.decrypt_notification(payload, sender_key) {
            Ok(text) => Ok(Some(text)),
            Err(ClientError::Crypto(err)) => {
                tracing::warn!(%err, "cannot open notification");
                Ok(None)
            },
            Err(err) => Err(err),
        }
    }
}

/// True if the base64 envelope is an authenticated one.
///
/// Only the first byte matters, so only the first base64 quantum is decoded.
fn is_authenticated(ciphertext: &str) -> bool {
    ciphertext
        .trim()
        .get(..4)
        .and_then(|head| STANDARD.decode(head).ok())
        .and_then(|head| envelope_kind(&head))
        == Some(EnvelopeKind::Authenticated)
}

fn transport_failed(operation: &str, chat_id: &str, err: &TransportError) -> SessionUpdate {
    tracing::warn!(operation, chat_id, %err, "collaborator call failed");
    SessionUpdate::TransportFailed {
        operation: format!("{operation} for chat {chat_id}"),
        reason: err.reason.clone(),
    }
}
