//! Key lifecycle commands - operate on keys stored in PostgreSQL

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::api_key::{ApiKeyId, CreateApiKeyRequest, RotateApiKeyRequest};
use crate::domain::permission::PermissionSet;
use crate::infrastructure::api_key::{
    ApiKeyService, PostgresApiKeyRepository, RandomSecretGenerator,
};

#[derive(Args, Debug)]
pub struct UserArgs {
    /// Owning user ID
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Owning user ID
    #[arg(long)]
    pub user: String,

    /// API key ID
    #[arg(long)]
    pub key: ApiKeyId,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Owning user ID
    #[arg(long)]
    pub user: String,

    /// Display name
    #[arg(long)]
    pub name: String,

    /// Requests per minute; defaults to api_keys.default_rate_limit
    #[arg(long)]
    pub rate_limit: Option<i32>,

    /// Lifetime in seconds; 0 or less never expires
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub expires_in: i64,

    /// Legacy action name (admin, read, write); repeatable
    #[arg(long)]
    pub permission: Vec<String>,

    /// JSON file holding a structured permission set; wins over --permission
    #[arg(long, value_name = "FILE")]
    pub permission_set: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Owning user ID
    #[arg(long)]
    pub user: String,

    /// API key ID to rotate
    #[arg(long)]
    pub key: ApiKeyId,

    /// Why the key is being rotated
    #[arg(long, default_value = "")]
    pub reason: String,

    /// Leave the old key usable alongside the new one
    #[arg(long)]
    pub keep_old_active: bool,

    /// New lifetime in seconds; otherwise the old expiry is inherited
    #[arg(long, allow_negative_numbers = true)]
    pub expires_in: Option<i64>,

    /// Name for the new key instead of "<old name> (rotated)"
    #[arg(long)]
    pub name: Option<String>,
}

/// Open a connection pool from configuration
pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let url = config.database_url()?;

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!("PostgreSQL connection established");

    Ok(pool)
}

async fn build_service(
    config: &AppConfig,
) -> anyhow::Result<ApiKeyService<PostgresApiKeyRepository>> {
    let pool = connect(config).await?;
    let generator = RandomSecretGenerator::new(&config.api_keys.secret_prefix)
        .with_secret_bytes(config.api_keys.secret_bytes);

    Ok(
        ApiKeyService::new(Arc::new(PostgresApiKeyRepository::new(pool)))
            .with_generator(Arc::new(generator)),
    )
}

async fn read_permission_set(path: &PathBuf) -> anyhow::Result<PermissionSet> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a permission set document", path.display()))
}

/// Run the create command
pub async fn create(args: CreateArgs) -> anyhow::Result<()> {
    let config = crate::cli::bootstrap()?;
    let service = build_service(&config).await?;

    let mut request = CreateApiKeyRequest::new(
        args.name,
        args.rate_limit.unwrap_or(config.api_keys.default_rate_limit),
    )
    .expires_in(args.expires_in);

    if !args.permission.is_empty() {
        request = request.with_permissions(args.permission);
    }
    if let Some(path) = &args.permission_set {
        request = request.with_permission_set(read_permission_set(path).await?);
    }

    let response = service.create_api_key(&args.user, request).await?;
    crate::cli::print_json(&response)
}

/// Run the rotate command
pub async fn rotate(args: RotateArgs) -> anyhow::Result<()> {
    let config = crate::cli::bootstrap()?;
    let service = build_service(&config).await?;

    let mut request = RotateApiKeyRequest::new(args.reason).keep_old_active(args.keep_old_active);
    if let Some(seconds) = args.expires_in {
        request = request.expires_in(seconds);
    }
    if let Some(name) = args.name {
        request = request.with_name(name);
    }

    let response = service.rotate_api_key(&args.user, &args.key, request).await?;
    crate::cli::print_json(&response)
}

/// Run the revoke command
pub async fn revoke(args: KeyArgs) -> anyhow::Result<()> {
    let config = crate::cli::bootstrap()?;
    let service = build_service(&config).await?;

    service.delete_api_key(&args.user, &args.key).await?;
    println!("revoked {}", args.key);

    Ok(())
}

/// Run the list command
pub async fn list(args: UserArgs) -> anyhow::Result<()> {
    let config = crate::cli::bootstrap()?;
    let service = build_service(&config).await?;

    let keys = service.list_api_keys(&args.user).await?;
    crate::cli::print_json(&keys)
}

/// Run the chain command
pub async fn chain(args: KeyArgs) -> anyhow::Result<()> {
    let config = crate::cli::bootstrap()?;
    let service = build_service(&config).await?;

    let chain = service.rotation_chain(&args.user, &args.key).await?;
    crate::cli::print_json(&chain)
}
