//! CLI error types.

use sealchat_store::StorageError;
use thiserror::Error;

/// Errors from running a command.
#[derive(Error, Debug)]
pub enum CliError {
    /// Command needs the user's password
    #[error("password required: pass --password or set SEALCHAT_PASSWORD")]
    MissingPassword,

    /// Vault or local store failed, including wrong passwords
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Writing the output failed
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}
