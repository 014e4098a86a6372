//! CLI module for the API key governor
//!
//! Provides subcommands for operating on stored keys and policies:
//! - `migrate`: apply or revert the storage schema
//! - `create`, `rotate`, `revoke`, `list`, `chain`: key lifecycle
//! - `inspect`, `check`: offline evaluation of a permission blob

pub mod keys;
pub mod migrate;
pub mod policy;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// API key governor - issue, rotate and authorize API keys
#[derive(Parser)]
#[command(name = "api-key-governor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending storage migrations
    Migrate(migrate::MigrateArgs),

    /// Create a new API key; the secret is printed once
    Create(keys::CreateArgs),

    /// Rotate an API key to a fresh secret
    Rotate(keys::RotateArgs),

    /// Revoke an API key
    Revoke(keys::KeyArgs),

    /// List a user's API keys
    List(keys::UserArgs),

    /// Show the rotation lineage of an API key
    Chain(keys::KeyArgs),

    /// Decode a stored permission blob
    Inspect(policy::InspectArgs),

    /// Evaluate a stored permission blob against a request
    Check(policy::CheckArgs),
}

/// Load `.env` and layered configuration, then start logging
pub fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    config.validate()?;
    logging::init_logging(&config.logging);

    Ok(config)
}

/// Write a value to stdout as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create() {
        let cli = Cli::try_parse_from([
            "api-key-governor",
            "create",
            "--user",
            "user-1",
            "--name",
            "CI",
            "--permission",
            "read",
            "--permission",
            "write",
            "--expires-in",
            "3600",
        ])
        .unwrap();

        match cli.command {
            Command::Create(args) => {
                assert_eq!(args.user, "user-1");
                assert_eq!(args.name, "CI");
                assert_eq!(args.permission, vec!["read", "write"]);
                assert_eq!(args.expires_in, 3600);
                assert!(args.rate_limit.is_none());
                assert!(args.permission_set.is_none());
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn test_parse_rotate() {
        let cli = Cli::try_parse_from([
            "api-key-governor",
            "rotate",
            "--user",
            "user-1",
            "--key",
            "6f1c1b9e-3c55-4c8e-9a57-1b0b5c4d2e10",
            "--keep-old-active",
            "--reason",
            "leaked",
        ])
        .unwrap();

        match cli.command {
            Command::Rotate(args) => {
                assert_eq!(args.key.to_string(), "6f1c1b9e-3c55-4c8e-9a57-1b0b5c4d2e10");
                assert!(args.keep_old_active);
                assert_eq!(args.reason, "leaked");
                assert!(args.expires_in.is_none());
                assert!(args.name.is_none());
            }
            _ => panic!("expected rotate"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_key_id() {
        let result = Cli::try_parse_from([
            "api-key-governor",
            "revoke",
            "--user",
            "user-1",
            "--key",
            "not-a-uuid",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from([
            "api-key-governor",
            "check",
            "blob.json",
            "--resource-type",
            "model",
            "--resource-id",
            "gpt-4",
            "--action",
            "read",
        ])
        .unwrap();

        assert!(matches!(cli.command, Command::Check(_)));
    }
}
