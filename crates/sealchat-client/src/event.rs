//! Client events and actions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sealchat_crypto::PublicKey;
use sealchat_proto::{Chat, ChatItem, FilePayload, MediaFile, Message, OutboundEvent};

use crate::timeline::LoadTicket;

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Resolving public keys (the client never fetches)
/// - Fetching history when asked via [`ClientAction::FetchHistory`]
/// - Forwarding real-time events and application intents
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Application wants to send a text message.
    SendMessage {
        /// Target chat.
        chat_id: String,
        /// Other participant.
        receiver_id: String,
        /// Message text.
        text: String,
        /// Receiver's public key.
        recipient_key: PublicKey,
    },

    /// Application wants to share a file.
    SendMedia {
        /// Target chat.
        chat_id: String,
        /// Other participant.
        receiver_id: String,
        /// File contents.
        file: FilePayload,
    },

    /// Abandon an optimistic message the server never confirmed.
    DiscardMessage {
        /// Chat holding the message.
        chat_id: String,
        /// Temporary id of the message.
        message_id: String,
    },

    /// Reload a chat's history without changing the active chat.
    BeginLoad {
        /// Chat to reload.
        chat_id: String,
    },

    /// History fetched in response to [`ClientAction::FetchHistory`].
    HistoryLoaded {
        /// Chat the history belongs to.
        chat_id: String,
        /// Ticket from the fetch request.
        ticket: LoadTicket,
        /// Records from the encrypted local store.
        local: Vec<Message>,
        /// Server-confirmed messages.
        server_messages: Vec<Message>,
        /// Server-confirmed media.
        server_media: Vec<MediaFile>,
        /// Public keys of the peers that sent authenticated envelopes.
        sender_keys: HashMap<String, PublicKey>,
    },

    /// A message arrived on the real-time channel.
    MessageReceived {
        /// The message as delivered.
        message: Message,
        /// Sender's public key, needed for authenticated envelopes.
        sender_key: Option<PublicKey>,
    },

    /// A media file arrived on the real-time channel.
    MediaReceived(MediaFile),

    /// The server announced a message without its body.
    MessageNotification {
        /// Chat with the new message.
        chat_id: String,
        /// Id of the new message.
        message_id: String,
    },

    /// Presence change of another user.
    UserStatus {
        /// User whose presence changed.
        user_id: String,
        /// Currently connected.
        online: bool,
        /// Last disconnect, if known.
        last_seen: Option<DateTime<Utc>>,
    },

    /// Chat list fetched from the API.
    ChatsLoaded(Vec<Chat>),

    /// User opened a chat: mark it read and load its history.
    OpenChat {
        /// Chat to open.
        chat_id: String,
    },

    /// End the session and drop all key material.
    Logout,
}

/// Presence of another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    /// Currently connected.
    pub online: bool,
    /// Last disconnect, if known.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// Send an event on the real-time channel.
    Emit(OutboundEvent),

    /// Write a record to the encrypted local store.
    ///
    /// Only ever our own messages. The caller supplies a fresh IV.
    PersistMessage {
        /// Chat the message belongs to.
        chat_id: String,
        /// Record to store, plaintext included.
        message: Message,
    },

    /// Delete a record from the encrypted local store.
    DeleteMessage {
        /// Chat holding the record.
        chat_id: String,
        /// Id of the record.
        message_id: String,
    },

    /// A chat's timeline changed.
    TimelineUpdated {
        /// Chat that changed.
        chat_id: String,
        /// Full timeline in display order.
        items: Vec<ChatItem>,
    },

    /// The chat list changed (order, preview or unread counters).
    ChatListUpdated(Vec<Chat>),

    /// Fetch local and server history, then feed
    /// [`ClientEvent::HistoryLoaded`] with the same ticket.
    FetchHistory {
        /// Chat to fetch.
        chat_id: String,
        /// Ticket to hand back.
        ticket: LoadTicket,
    },

    /// Fetch one message announced by a notification, then feed
    /// [`ClientEvent::MessageReceived`].
    FetchMessage {
        /// Chat holding the message.
        chat_id: String,
        /// Message to fetch.
        message_id: String,
    },

    /// A user's presence changed.
    PresenceChanged {
        /// User whose presence changed.
        user_id: String,
        /// New presence.
        presence: Presence,
    },

    /// Log message for debugging.
    Log {
        /// Log message.
        message: String,
    },

    /// Keys and in-memory state were dropped.
    SessionCleared,
}
