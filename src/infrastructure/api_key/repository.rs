//! In-memory API key repository implementation

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::api_key::{ApiKey, ApiKeyId, ApiKeyRepository};
use crate::domain::DomainError;

/// In-memory implementation of ApiKeyRepository
///
/// All rows live in one map; the rotation chain is the `parent_key_id`
/// column, resolved by lookups.
#[derive(Debug)]
pub struct InMemoryApiKeyRepository {
    keys: Arc<RwLock<HashMap<ApiKeyId, ApiKey>>>,
}

impl InMemoryApiKeyRepository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository with initial keys
    pub fn with_keys(keys: Vec<ApiKey>) -> Self {
        let keys_map: HashMap<ApiKeyId, ApiKey> =
            keys.into_iter().map(|k| (*k.id(), k)).collect();

        Self {
            keys: Arc::new(RwLock::new(keys_map)),
        }
    }
}

impl Default for InMemoryApiKeyRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_absent(keys: &HashMap<ApiKeyId, ApiKey>, api_key: &ApiKey) -> Result<(), DomainError> {
    if keys.contains_key(api_key.id()) {
        return Err(DomainError::conflict(format!(
            "API key with ID '{}' already exists",
            api_key.id()
        )));
    }

    if keys.values().any(|k| k.secret() == api_key.secret()) {
        return Err(DomainError::conflict(format!(
            "API key with prefix '{}' collides with an existing secret",
            api_key.prefix()
        )));
    }

    Ok(())
}

fn ensure_present(keys: &HashMap<ApiKeyId, ApiKey>, id: &ApiKeyId) -> Result<(), DomainError> {
    if !keys.contains_key(id) {
        return Err(DomainError::not_found(format!("API key '{}' not found", id)));
    }
    Ok(())
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        let keys = self.keys.read().await;
        Ok(keys.get(id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<ApiKey>, DomainError> {
        let keys = self.keys.read().await;

        let mut result: Vec<ApiKey> = keys
            .values()
            .filter(|k| k.is_owned_by(user_id))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        Ok(result)
    }

    async fn list_children(&self, parent_id: &ApiKeyId) -> Result<Vec<ApiKey>, DomainError> {
        let keys = self.keys.read().await;

        let mut result: Vec<ApiKey> = keys
            .values()
            .filter(|k| k.parent_key_id() == Some(parent_id))
            .cloned()
            .collect();
        result.sort_by_key(|k| k.created_at());

        Ok(result)
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;
        ensure_absent(&keys, &api_key)?;

        keys.insert(*api_key.id(), api_key.clone());
        Ok(api_key)
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;
        ensure_present(&keys, api_key.id())?;

        keys.insert(*api_key.id(), api_key.clone());
        Ok(api_key.clone())
    }

    async fn revoke(&self, id: &ApiKeyId) -> Result<(), DomainError> {
        let mut keys = self.keys.write().await;

        match keys.get_mut(id) {
            Some(key) => {
                key.deactivate();
                Ok(())
            }
            None => Err(DomainError::not_found(format!("API key '{}' not found", id))),
        }
    }

    /// Both writes happen under one write lock, so a failure leaves nothing behind
    async fn rotate(
        &self,
        deactivated: Option<ApiKey>,
        new_key: ApiKey,
    ) -> Result<ApiKey, DomainError> {
        let mut keys = self.keys.write().await;

        if let Some(old) = &deactivated {
            ensure_present(&keys, old.id())
                .map_err(|e| e.context("failed to deactivate old key"))?;
        }
        ensure_absent(&keys, &new_key).map_err(|e| e.context("failed to create rotated API key"))?;

        if let Some(old) = deactivated {
            keys.insert(*old.id(), old);
        }
        keys.insert(*new_key.id(), new_key.clone());

        Ok(new_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn create_test_key(user_id: &str, secret: &str) -> ApiKey {
        ApiKey::new(user_id, format!("Key {}", secret), secret, json!({}), 60).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_key("user-1", "mr-aaaaaaaaaaaa");

        repo.create(key.clone()).await.unwrap();

        let retrieved = repo.get(key.id()).await.unwrap();
        assert_eq!(retrieved, Some(key));
    }

    #[tokio::test]
    async fn test_create_duplicate_id() {
        let key = create_test_key("user-1", "mr-aaaaaaaaaaaa");
        let repo = InMemoryApiKeyRepository::with_keys(vec![key.clone()]);

        let result = repo.create(key).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_create_duplicate_secret() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("user-1", "mr-aaaaaaaaaaaa"))
            .await
            .unwrap();

        let result = repo.create(create_test_key("user-2", "mr-aaaaaaaaaaaa")).await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update_missing() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_key("user-1", "mr-aaaaaaaaaaaa");

        let result = repo.update(&key).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_revoke_is_soft() {
        let repo = InMemoryApiKeyRepository::new();
        let key = repo
            .create(create_test_key("user-1", "mr-aaaaaaaaaaaa"))
            .await
            .unwrap();

        repo.revoke(key.id()).await.unwrap();

        let stored = repo.get(key.id()).await.unwrap().unwrap();
        assert!(!stored.is_active());
        assert!(stored.updated_at() >= key.updated_at());
    }

    #[tokio::test]
    async fn test_list_by_user() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(create_test_key("user-1", "mr-aaaaaaaaaaaa"))
            .await
            .unwrap();
        repo.create(create_test_key("user-1", "mr-bbbbbbbbbbbb"))
            .await
            .unwrap();
        repo.create(create_test_key("user-2", "mr-cccccccccccc"))
            .await
            .unwrap();

        let keys = repo.list_by_user("user-1").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].created_at() >= keys[1].created_at());
        assert!(repo.list_by_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_is_atomic_on_conflict() {
        let repo = InMemoryApiKeyRepository::new();
        let old = repo
            .create(create_test_key("user-1", "mr-aaaaaaaaaaaa"))
            .await
            .unwrap();
        // Replacement reuses an existing secret, so the insert must be refused
        let taken = repo
            .create(create_test_key("user-1", "mr-bbbbbbbbbbbb"))
            .await
            .unwrap();

        let mut deactivated = old.clone();
        deactivated.deactivate();
        let new_key = ApiKey::rotated_from(&old, taken.secret(), "test").unwrap();

        let result = repo.rotate(Some(deactivated), new_key).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
        assert!(repo.get(old.id()).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_rotate_and_list_children() {
        let repo = InMemoryApiKeyRepository::new();
        let old = repo
            .create(create_test_key("user-1", "mr-aaaaaaaaaaaa"))
            .await
            .unwrap();

        let mut deactivated = old.clone();
        deactivated.deactivate();
        let new_key = ApiKey::rotated_from(&old, "mr-rotated-000000", "test").unwrap();
        let created = repo.rotate(Some(deactivated), new_key).await.unwrap();

        assert!(!repo.get(old.id()).await.unwrap().unwrap().is_active());

        let children = repo.list_children(old.id()).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id(), created.id());
        assert!(children[0].rotated_at().unwrap() <= Utc::now());
    }
}
