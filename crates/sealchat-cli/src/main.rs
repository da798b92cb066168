//! sealchat device maintenance binary.
//!
//! # Usage
//!
//! ```bash
//! # Create an account and print the public key to publish
//! SEALCHAT_PASSWORD=... sealchat --db device.redb register alice
//!
//! # Read the local history of a chat
//! sealchat --db device.redb --password ... history alice chat-ab
//! ```

use std::{io::Write, path::PathBuf};

use clap::Parser;
use sealchat_cli::Command;
use sealchat_client::SystemEnv;
use sealchat_store::{RedbStorage, VaultConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// sealchat device maintenance
#[derive(Parser, Debug)]
#[command(name = "sealchat")]
#[command(about = "Key vault and local history maintenance for sealchat")]
#[command(version)]
struct Args {
    /// Path to the device database
    #[arg(long, env = "SEALCHAT_DB", default_value = "sealchat.redb")]
    db: PathBuf,

    /// Password of the user the command acts on
    #[arg(long, env = "SEALCHAT_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// PBKDF2 iterations for newly wrapped keys
    #[arg(long, default_value_t = VaultConfig::default().pbkdf2_iterations)]
    pbkdf2_iterations: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    tracing::debug!(db = %args.db.display(), "opening device database");
    let storage = RedbStorage::open(&args.db)?;
    let vault_config = VaultConfig { pbkdf2_iterations: args.pbkdf2_iterations };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let password = args.password.as_deref();
    args.command.run(storage, vault_config, &SystemEnv::new(), password, &mut out)?;
    out.flush()?;

    Ok(())
}
