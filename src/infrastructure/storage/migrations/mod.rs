//! Database migrations infrastructure

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::DomainError;

/// Trait for running database migrations
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Runs all pending migrations
    async fn run(&self) -> Result<(), DomainError>;

    /// Reverts the last migration
    async fn revert(&self) -> Result<(), DomainError>;

    /// Returns the current migration version
    async fn version(&self) -> Result<Option<i64>, DomainError>;
}

/// PostgreSQL migrator backed by a `_migrations` bookkeeping table
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
    migrations: Vec<Migration>,
}

impl PostgresMigrator {
    /// Migrator for the API key schema
    pub fn new(pool: PgPool) -> Self {
        Self::with_migrations(pool, api_key_migrations())
    }

    pub fn with_migrations(pool: PgPool, migrations: Vec<Migration>) -> Self {
        Self { pool, migrations }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    async fn is_applied(&self, version: i64) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)")
            .bind(version)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))
    }

    /// Runs a single migration; its statements and bookkeeping share a transaction
    pub async fn run_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        if self.is_applied(migration.version).await? {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        for statement in &migration.up {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DomainError::storage(format!(
                        "Failed to run migration {}: {}",
                        migration.version, e
                    ))
                })?;
        }

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

        info!(
            version = migration.version,
            description = %migration.description,
            "Applied migration"
        );
        Ok(())
    }

    /// Reverts a single migration
    pub async fn revert_migration(&self, migration: &Migration) -> Result<(), DomainError> {
        self.ensure_migrations_table().await?;

        if !self.is_applied(migration.version).await? {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        for statement in &migration.down {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DomainError::storage(format!(
                        "Failed to revert migration {}: {}",
                        migration.version, e
                    ))
                })?;
        }

        sqlx::query("DELETE FROM _migrations WHERE version = $1")
            .bind(migration.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to remove migration record {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

        info!(version = migration.version, "Reverted migration");
        Ok(())
    }
}

#[async_trait]
impl Migrator for PostgresMigrator {
    async fn run(&self) -> Result<(), DomainError> {
        for migration in &self.migrations {
            self.run_migration(migration).await?;
        }
        Ok(())
    }

    async fn revert(&self) -> Result<(), DomainError> {
        let Some(current) = self.version().await? else {
            return Ok(());
        };

        match self.migrations.iter().find(|m| m.version == current) {
            Some(migration) => self.revert_migration(migration).await,
            None => Err(DomainError::internal(format!(
                "applied migration {} is unknown to this build",
                current
            ))),
        }
    }

    async fn version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        sqlx::query_scalar("SELECT MAX(version) FROM _migrations WHERE success = TRUE")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))
    }
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version
    pub version: i64,
    /// Human-readable description
    pub description: String,
    /// Statements to run, in order, when applying the migration
    pub up: Vec<String>,
    /// Statements to run, in order, when reverting the migration
    pub down: Vec<String>,
}

impl Migration {
    /// Each statement is sent on its own; none may contain a `;` separator
    pub fn new<U, D>(version: i64, description: impl Into<String>, up: U, down: D) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            version,
            description: description.into(),
            up: up.into_iter().map(Into::into).collect(),
            down: down.into_iter().map(Into::into).collect(),
        }
    }
}

/// Schema of the `user_api_keys` table
pub fn api_key_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create user_api_keys table",
            [
                r#"
                CREATE TABLE IF NOT EXISTS user_api_keys (
                    id UUID PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    name VARCHAR(255) NOT NULL,
                    api_key TEXT NOT NULL UNIQUE,
                    prefix VARCHAR(10) NOT NULL,
                    permissions JSONB,
                    rate_limit INTEGER NOT NULL DEFAULT 60,
                    expires_at TIMESTAMPTZ,
                    last_used_at TIMESTAMPTZ,
                    is_active BOOLEAN NOT NULL DEFAULT TRUE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_user_api_keys_user_id ON user_api_keys(user_id)",
                "CREATE INDEX IF NOT EXISTS idx_user_api_keys_prefix ON user_api_keys(prefix)",
            ],
            ["DROP TABLE IF EXISTS user_api_keys"],
        ),
        Migration::new(
            2,
            "Add rotation chain to user_api_keys",
            [
                r#"
                ALTER TABLE user_api_keys
                    ADD COLUMN IF NOT EXISTS parent_key_id UUID REFERENCES user_api_keys(id),
                    ADD COLUMN IF NOT EXISTS version INTEGER NOT NULL DEFAULT 1,
                    ADD COLUMN IF NOT EXISTS rotation_reason TEXT,
                    ADD COLUMN IF NOT EXISTS rotated_at TIMESTAMPTZ
                "#,
                r#"
                CREATE INDEX IF NOT EXISTS idx_user_api_keys_parent
                    ON user_api_keys(parent_key_id)
                "#,
                r#"
                CREATE INDEX IF NOT EXISTS idx_user_api_keys_user_version
                    ON user_api_keys(user_id, version)
                "#,
            ],
            [
                "DROP INDEX IF EXISTS idx_user_api_keys_user_version",
                "DROP INDEX IF EXISTS idx_user_api_keys_parent",
                r#"
                ALTER TABLE user_api_keys
                    DROP COLUMN IF EXISTS rotated_at,
                    DROP COLUMN IF EXISTS rotation_reason,
                    DROP COLUMN IF EXISTS version,
                    DROP COLUMN IF EXISTS parent_key_id
                "#,
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creation() {
        let migration = Migration::new(
            1,
            "Test migration",
            ["CREATE TABLE test (id INT)", "CREATE INDEX idx_test ON test(id)"],
            ["DROP TABLE test"],
        );

        assert_eq!(migration.version, 1);
        assert_eq!(migration.description, "Test migration");
        assert_eq!(migration.up.len(), 2);
        assert_eq!(migration.up[1], "CREATE INDEX idx_test ON test(id)");
        assert_eq!(migration.down, vec!["DROP TABLE test".to_string()]);
    }

    #[test]
    fn test_api_key_migrations_order() {
        let migrations = api_key_migrations();

        assert_eq!(migrations.len(), 2);
        for pair in migrations.windows(2) {
            assert!(
                pair[1].version > pair[0].version,
                "Migrations should be in ascending order"
            );
        }
    }

    #[test]
    fn test_api_key_migrations_content() {
        let migrations = api_key_migrations();

        for migration in &migrations {
            assert!(!migration.description.is_empty());
            assert!(!migration.up.is_empty());
            assert!(!migration.down.is_empty());
        }

        assert!(migrations[0].up[0].contains("api_key TEXT NOT NULL UNIQUE"));
        assert!(migrations[0].up[0].contains("permissions JSONB"));
        assert!(migrations[1].up[0].contains("parent_key_id UUID REFERENCES user_api_keys(id)"));
        assert!(migrations[1].up[0].contains("version INTEGER NOT NULL DEFAULT 1"));
    }

    #[test]
    fn test_api_key_migrations_are_single_statements() {
        // Prepared statements accept exactly one command each
        for migration in api_key_migrations() {
            for statement in migration.up.iter().chain(&migration.down) {
                assert!(!statement.trim().is_empty());
                assert!(
                    !statement.contains(';'),
                    "migration {} has a compound statement",
                    migration.version
                );
            }
        }
    }
}
