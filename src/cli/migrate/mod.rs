//! Migrate command - applies or reverts the storage schema

use clap::Args;
use tracing::info;

use crate::cli::keys::connect;
use crate::infrastructure::storage::{Migrator, PostgresMigrator};

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Revert the most recent migration instead of applying pending ones
    #[arg(long)]
    pub revert: bool,
}

/// Run the migrate command
pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = crate::cli::bootstrap()?;
    let pool = connect(&config).await?;
    let migrator = PostgresMigrator::new(pool);

    if args.revert {
        migrator.revert().await?;
    } else {
        migrator.run().await?;
    }

    let version = migrator.version().await?;
    info!(version = ?version, "Schema is up to date");
    println!(
        "schema version: {}",
        version.map_or_else(|| "none".to_string(), |v| v.to_string())
    );

    Ok(())
}
