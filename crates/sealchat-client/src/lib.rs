//! Client
//!
//! Chat client core for sealchat: reconciliation of local and server state,
//! the session-scoped public key cache, and the session runtime that ties the
//! key vault and encrypted local store to the chat backend.
//!
//! # Architecture
//!
//! The client follows the Sans-IO and Action-Based pattern. [`Client`]
//! receives events ([`ClientEvent`]), processes them through pure state
//! machine logic, and returns actions ([`ClientAction`]) for the caller to
//! execute. [`Session`] is that caller for production use:
//!
//! ```text
//!                 ┌──────────────────────── Session ───────────────────────┐
//!  UI intents ───►│  ClientEvent ──► Client ──► ClientAction                │
//!  InboundEvent ─►│                    │             │                     │
//!                 │              Reconciler     Emit ──► Realtime          │
//!                 │              ChatTimeline   Persist ──► LocalStore     │
//!                 │                             Fetch ──► Api + KeyCache   │
//!                 └────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//!                          SessionUpdate (UI)
//! ```
//!
//! # Components
//!
//! - [`Client`]: Sans-IO state machine (timelines, chat list, presence)
//! - [`Reconciler`]: merge of local, server text and server media sources
//! - [`ChatTimeline`]: ordered, deduplicated items with stale-load protection
//! - [`PublicKeyCache`]: peers' public keys, cleared on logout
//! - [`Session`]: async runtime over [`Api`] and [`Realtime`] collaborators

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
pub mod env;
mod error;
mod event;
mod key_cache;
mod reconcile;
mod session;
mod system_env;
mod timeline;
pub mod transport;

pub use client::{Client, ClientIdentity};
pub use config::{DEFAULT_RETENTION_DAYS, SessionConfig};
pub use env::Environment;
pub use error::{ClientError, TransportError};
pub use event::{ClientAction, ClientEvent, Presence};
pub use key_cache::PublicKeyCache;
pub use reconcile::{Incoming, Reconciler, Reconciliation};
pub use session::{Session, SessionUpdate};
pub use system_env::SystemEnv;
pub use timeline::{ChatTimeline, LoadTicket};
pub use transport::{Api, Realtime};
