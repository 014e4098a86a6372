//! Policy commands - evaluate a stored permission blob without a database

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use crate::domain::permission::{decode_permission_blob, to_legacy_actions, PermissionSet};
use crate::domain::DomainError;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// JSON file holding the blob as stored in the permissions column
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// JSON file holding the blob as stored in the permissions column
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[arg(long)]
    pub resource_type: String,

    #[arg(long)]
    pub resource_id: String,

    #[arg(long)]
    pub action: String,
}

/// Both views of a decoded blob
#[derive(Debug, Serialize)]
pub struct PolicyReport {
    pub permission_set: PermissionSet,
    pub permissions: Vec<String>,
}

/// Outcome of an offline check
#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub resource_type: String,
    pub resource_id: String,
    pub action: String,
    pub allowed: bool,
}

/// Decode a blob into its canonical set and legacy action list
pub fn inspect_blob(blob: &Value) -> Result<PolicyReport, DomainError> {
    let permission_set = decode_permission_blob(Some(blob))?;
    let permissions = to_legacy_actions(&permission_set);

    Ok(PolicyReport {
        permission_set,
        permissions,
    })
}

/// Evaluate a blob against one request triple
pub fn check_blob(
    blob: &Value,
    resource_type: &str,
    resource_id: &str,
    action: &str,
) -> Result<CheckReport, DomainError> {
    let set = decode_permission_blob(Some(blob))?;

    Ok(CheckReport {
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        action: action.to_string(),
        allowed: set.has_permission(resource_type, resource_id, action),
    })
}

async fn read_blob(path: &Path) -> anyhow::Result<Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&contents).with_context(|| format!("{} is not JSON", path.display()))
}

/// Run the inspect command
pub async fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    crate::cli::bootstrap()?;

    let blob = read_blob(&args.file).await?;
    crate::cli::print_json(&inspect_blob(&blob)?)
}

/// Run the check command
pub async fn check(args: CheckArgs) -> anyhow::Result<()> {
    crate::cli::bootstrap()?;

    let blob = read_blob(&args.file).await?;
    let report = check_blob(&blob, &args.resource_type, &args.resource_id, &args.action)?;
    crate::cli::print_json(&report)
}
