//! Collaborator boundaries.
//!
//! The session consumes two remote collaborators it does not own:
//!
//! ```text
//!            ┌─────────┐  chats / messages / media / public_key
//! Session ──►│   Api   │  (request/response)
//!    │       └─────────┘
//!    │       ┌──────────┐
//!    └──────►│ Realtime │  emit(send-message | send-media)
//!            └──────────┘
//! ```
//!
//! Inbound real-time events are pushed into the session by the caller
//! ([`crate::Session::on_inbound`]); connection lifecycle, retry and backoff
//! belong to the implementations.

use async_trait::async_trait;
use sealchat_proto::{Chat, MediaFile, Message, OutboundEvent};

use crate::error::TransportError;

/// Request/response API of the chat backend.
#[async_trait]
pub trait Api: Send + Sync {
    /// Chats the current user takes part in.
    async fn chats(&self) -> Result<Vec<Chat>, TransportError>;

    /// Server-confirmed text messages of a chat.
    async fn messages(&self, chat_id: &str) -> Result<Vec<Message>, TransportError>;

    /// Server-confirmed media files of a chat.
    async fn media(&self, chat_id: &str) -> Result<Vec<MediaFile>, TransportError>;

    /// Published public key of a user, standard base64.
    async fn public_key(&self, user_id: &str) -> Result<String, TransportError>;
}

/// Outbound half of the real-time channel.
#[async_trait]
pub trait Realtime: Send + Sync {
    /// Deliver an event to the channel.
    async fn emit(&self, event: &OutboundEvent) -> Result<(), TransportError>;
}
