//! Sealchat data model
//!
//! Shapes shared by every layer of the client core: chat messages and media
//! references, the at-rest record wrapping an encrypted message, chat list
//! entries, and the events exchanged over the real-time channel.
//!
//! All types serialize to JSON with camelCase field names, the format the chat
//! server and the browser store speak.
//!
//! # Timeline items
//!
//! ```text
//! ChatItem ──┬── Message    (has `ciphertext`)
//!            └── MediaFile  (has file metadata)
//! ```
//!
//! Both carry the same chat membership and `createdAt` fields so they merge
//! into one ordered timeline.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod chat;
pub mod error;
pub mod event;
pub mod message;
pub mod record;

pub use chat::Chat;
pub use error::ProtocolError;
pub use event::{FilePayload, InboundEvent, MediaUpload, OutboundEvent};
pub use message::{ChatItem, MediaFile, Message, MessageStatus, TEMP_ID_PREFIX};
pub use record::{StoredEncryptedMessage, message_key};
