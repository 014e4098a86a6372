//! API Key Governor
//!
//! Issues, rotates and revokes per-user API keys and decides what each key
//! may do:
//! - Structured resource/action permission sets with wildcard matching
//! - Translation from legacy flat action lists and older stored documents
//! - Rotation chains with versioning and optional overlap of old and new keys
//! - In-memory and PostgreSQL storage

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use crate::config::AppConfig;
pub use domain::{ApiKey, ApiKeyId, ApiKeyResponse, DomainError, Permission, PermissionSet};
pub use infrastructure::api_key::{
    ApiKeyService, InMemoryApiKeyRepository, PostgresApiKeyRepository, RandomSecretGenerator,
    SecretGenerator,
};
