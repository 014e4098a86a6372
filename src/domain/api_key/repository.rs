//! API Key repository trait

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{ApiKey, ApiKeyId};
use crate::domain::DomainError;

/// Repository trait for API key storage
///
/// Rows are never hard-deleted through this trait; revocation only flips
/// `is_active`.
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Get an API key by its ID
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError>;

    /// All keys owned by a user, active or not
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ApiKey>, DomainError>;

    /// Keys whose `parent_key_id` is `parent_id`
    async fn list_children(&self, parent_id: &ApiKeyId) -> Result<Vec<ApiKey>, DomainError>;

    /// Insert a new API key
    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError>;

    /// Update an existing API key
    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError>;

    /// Mark an API key inactive
    async fn revoke(&self, id: &ApiKeyId) -> Result<(), DomainError>;

    /// Store a rotation: optionally persist the deactivated old key, then insert the new key
    ///
    /// This default runs the two writes one after the other. When the insert
    /// fails after the old key was already deactivated, the result is
    /// [`DomainError::PartialRotation`]. Implementations backed by a store with
    /// transactions should override this and apply both writes atomically.
    async fn rotate(
        &self,
        deactivated: Option<ApiKey>,
        new_key: ApiKey,
    ) -> Result<ApiKey, DomainError> {
        let deactivated_id = match deactivated {
            Some(old) => {
                self.update(&old)
                    .await
                    .map_err(|e| e.context("failed to deactivate old key"))?;
                Some(*old.id())
            }
            None => None,
        };

        match self.create(new_key).await {
            Ok(created) => Ok(created),
            Err(e) => match deactivated_id {
                Some(old_id) => Err(DomainError::partial_rotation(
                    old_id.to_string(),
                    format!("failed to create rotated API key: {}", e),
                )),
                None => Err(e.context("failed to create rotated API key")),
            },
        }
    }
}
