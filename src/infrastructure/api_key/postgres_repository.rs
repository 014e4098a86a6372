//! PostgreSQL API key repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository, ApiKeySnapshot};
use crate::domain::DomainError;

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, name, api_key, permissions, rate_limit, expires_at,
           last_used_at, is_active, version, parent_key_id, rotation_reason,
           rotated_at, created_at, updated_at
    FROM user_api_keys
"#;

/// PostgreSQL implementation of ApiKeyRepository
#[derive(Debug, Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_in(
        tx: &mut Transaction<'_, Postgres>,
        api_key: &ApiKey,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO user_api_keys (id, user_id, name, api_key, prefix, permissions,
                                       rate_limit, expires_at, last_used_at, is_active,
                                       version, parent_key_id, rotation_reason, rotated_at,
                                       created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(api_key.id().as_uuid())
        .bind(api_key.user_id())
        .bind(api_key.name())
        .bind(api_key.secret())
        .bind(api_key.prefix())
        .bind(api_key.permissions().cloned())
        .bind(api_key.rate_limit())
        .bind(api_key.expires_at())
        .bind(api_key.last_used_at())
        .bind(api_key.is_active())
        .bind(api_key.version())
        .bind(api_key.parent_key_id().map(|id| *id.as_uuid()))
        .bind(api_key.rotation_reason())
        .bind(api_key.rotated_at())
        .bind(api_key.created_at())
        .bind(api_key.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_insert_error(e, api_key))?;

        Ok(())
    }

    async fn update_in(
        tx: &mut Transaction<'_, Postgres>,
        api_key: &ApiKey,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE user_api_keys
            SET name = $2, is_active = $3, expires_at = $4, last_used_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(api_key.id().as_uuid())
        .bind(api_key.name())
        .bind(api_key.is_active())
        .bind(api_key.expires_at())
        .bind(api_key.last_used_at())
        .bind(api_key.updated_at())
        .execute(&mut **tx)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update API key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                api_key.id()
            )));
        }

        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), DomainError> {
    tx.commit()
        .await
        .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))
}

fn map_insert_error(e: sqlx::Error, api_key: &ApiKey) -> DomainError {
    let msg = e.to_string();

    if msg.contains("duplicate key") || msg.contains("unique constraint") {
        DomainError::conflict(format!(
            "API key '{}' (prefix '{}') already exists",
            api_key.id(),
            api_key.prefix()
        ))
    } else {
        DomainError::storage(format!("Failed to create API key: {}", e))
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ApiKey>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE user_id = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list API keys: {}", e)))?;

        rows.iter().map(row_to_api_key).collect()
    }

    async fn list_children(&self, parent_id: &ApiKeyId) -> Result<Vec<ApiKey>, DomainError> {
        let rows = sqlx::query(&format!(
            "{} WHERE parent_key_id = $1 ORDER BY created_at",
            SELECT_COLUMNS
        ))
        .bind(parent_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list rotated API keys: {}", e)))?;

        rows.iter().map(row_to_api_key).collect()
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut tx = self.begin().await?;
        Self::insert_in(&mut tx, &api_key).await?;
        commit(tx).await?;

        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let mut tx = self.begin().await?;
        Self::update_in(&mut tx, api_key).await?;
        commit(tx).await?;

        Ok(api_key.clone())
    }

    async fn revoke(&self, id: &ApiKeyId) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE user_api_keys SET is_active = FALSE, updated_at = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to revoke API key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        Ok(())
    }

    /// Deactivation and insert share one transaction; dropping it on error rolls back
    async fn rotate(
        &self,
        deactivated: Option<ApiKey>,
        new_key: ApiKey,
    ) -> Result<ApiKey, DomainError> {
        let mut tx = self.begin().await?;

        if let Some(old) = &deactivated {
            Self::update_in(&mut tx, old)
                .await
                .map_err(|e| e.context("failed to deactivate old key"))?;
        }

        Self::insert_in(&mut tx, &new_key)
            .await
            .map_err(|e| e.context("failed to create rotated API key"))?;

        commit(tx).await?;

        Ok(new_key)
    }
}

fn row_to_api_key(row: &PgRow) -> Result<ApiKey, DomainError> {
    let column_error =
        |e: sqlx::Error| DomainError::storage(format!("Failed to read API key row: {}", e));

    let id: Uuid = row.try_get("id").map_err(column_error)?;
    let parent_key_id: Option<Uuid> = row.try_get("parent_key_id").map_err(column_error)?;
    let permissions: Option<Value> = row.try_get("permissions").map_err(column_error)?;
    let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at").map_err(column_error)?;
    let last_used_at: Option<DateTime<Utc>> = row.try_get("last_used_at").map_err(column_error)?;
    let rotated_at: Option<DateTime<Utc>> = row.try_get("rotated_at").map_err(column_error)?;

    let snapshot = ApiKeySnapshot {
        id: ApiKeyId::from(id),
        user_id: row.try_get("user_id").map_err(column_error)?,
        name: row.try_get("name").map_err(column_error)?,
        api_key: row.try_get("api_key").map_err(column_error)?,
        permissions,
        rate_limit: row.try_get("rate_limit").map_err(column_error)?,
        expires_at,
        last_used_at,
        is_active: row.try_get("is_active").map_err(column_error)?,
        version: row.try_get("version").map_err(column_error)?,
        parent_key_id: parent_key_id.map(ApiKeyId::from),
        rotation_reason: row.try_get("rotation_reason").map_err(column_error)?,
        rotated_at,
        created_at: row.try_get("created_at").map_err(column_error)?,
        updated_at: row.try_get("updated_at").map_err(column_error)?,
    };

    Ok(ApiKey::from_snapshot(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_key() -> ApiKey {
        ApiKey::new("user-1", "Key", "mr-do-not-log-this-secret", json!({}), 60).unwrap()
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let key = test_key();
        let err = map_insert_error(
            sqlx::Error::Protocol(
                "duplicate key value violates unique constraint \"user_api_keys_api_key_key\""
                    .to_string(),
            ),
            &key,
        );

        assert!(matches!(err, DomainError::Conflict { .. }));
        assert!(err.to_string().contains(key.prefix()));
        assert!(!err.to_string().contains(key.secret()));
    }

    #[test]
    fn test_other_errors_map_to_storage() {
        let err = map_insert_error(sqlx::Error::PoolTimedOut, &test_key());
        assert!(matches!(err, DomainError::Storage { .. }));
    }
}
