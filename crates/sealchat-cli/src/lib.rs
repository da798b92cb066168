//! Device maintenance for sealchat.
//!
//! Operates on the durable state a sealchat client keeps on one device: the
//! password-wrapped key vault and the encrypted local message history. It
//! never talks to the chat backend.
//!
//! ```text
//!   sealchat --db device.redb <command>
//!        │
//!        ▼
//!   Command::run ──► KeyVaultStore ──┐
//!        │                           ├──► RedbStorage
//!        └────────► LocalStore ──────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod command;
mod error;

pub use command::Command;
pub use error::CliError;
