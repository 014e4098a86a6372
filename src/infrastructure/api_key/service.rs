//! API Key lifecycle service
//!
//! Creation, rotation and revocation of API keys. The service holds no state
//! of its own: every durable change goes through the repository, and each
//! operation performs at most two dependent writes (rotation).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::api_key::{
    ApiKey, ApiKeyId, ApiKeyRepository, ApiKeyResponse, CreateApiKeyRequest, RotateApiKeyRequest,
};
use crate::domain::permission::encode_permission_set;
use crate::domain::DomainError;

use super::generator::{RandomSecretGenerator, SecretGenerator};

/// API Key service for managing the key lifecycle
pub struct ApiKeyService<R>
where
    R: ApiKeyRepository,
{
    repository: Arc<R>,
    generator: Arc<dyn SecretGenerator>,
}

impl<R: ApiKeyRepository> std::fmt::Debug for ApiKeyService<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyService")
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

/// Expiry `seconds` from `now`, or None when not positive
fn expiry_after(now: DateTime<Utc>, seconds: i64) -> Result<Option<DateTime<Utc>>, DomainError> {
    if seconds <= 0 {
        return Ok(None);
    }

    Duration::try_seconds(seconds)
        .and_then(|offset| now.checked_add_signed(offset))
        .map(Some)
        .ok_or_else(|| DomainError::validation("expires_in_seconds out of range"))
}

impl<R: ApiKeyRepository> ApiKeyService<R> {
    /// Create a new API key service
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            generator: Arc::new(RandomSecretGenerator::production()),
        }
    }

    /// Create with a custom secret generator
    pub fn with_generator(mut self, generator: Arc<dyn SecretGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Find a key and check that `user_id` owns it
    async fn owned_key(&self, user_id: &str, key_id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        let key = self
            .repository
            .get(key_id)
            .await
            .map_err(|e| e.context("failed to find API key"))?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", key_id)))?;

        if !key.is_owned_by(user_id) {
            warn!(key_id = %key_id, user_id = %user_id, "API key ownership mismatch");
            return Err(DomainError::unauthorized(format!(
                "API key '{}' does not belong to the requesting user",
                key_id
            )));
        }

        Ok(key)
    }

    /// Create a new API key; the response exposes the secret this one time
    #[instrument(skip_all, fields(user_id = %user_id))]
    pub async fn create_api_key(
        &self,
        user_id: &str,
        request: CreateApiKeyRequest,
    ) -> Result<ApiKeyResponse, DomainError> {
        let expires_at = expiry_after(Utc::now(), request.expires_in_seconds)?;

        let secret = self
            .generator
            .generate()
            .map_err(|e| e.context("failed to generate API key"))?;

        let permission_set = request.policy_expression().resolve();
        permission_set.validate()?;

        let api_key = ApiKey::new(
            user_id,
            &request.name,
            secret,
            encode_permission_set(&permission_set)?,
            request.rate_limit,
        )?
        .with_expiration(expires_at);

        let created = self
            .repository
            .create(api_key)
            .await
            .map_err(|e| e.context("failed to create API key"))?;

        info!(
            key_id = %created.id(),
            prefix = created.prefix(),
            name = created.name(),
            "API key created"
        );

        ApiKeyResponse::revealed(&created)
    }

    /// Replace a key with a fresh secret carrying the same policy
    ///
    /// Unless `keep_old_active` is set, the old key is deactivated in the same
    /// repository call that stores the new one. When the repository cannot do
    /// both atomically and only the first write lands, the error is
    /// [`DomainError::PartialRotation`].
    #[instrument(skip_all, fields(user_id = %user_id, key_id = %key_id))]
    pub async fn rotate_api_key(
        &self,
        user_id: &str,
        key_id: &ApiKeyId,
        request: RotateApiKeyRequest,
    ) -> Result<ApiKeyResponse, DomainError> {
        let old_key = self.owned_key(user_id, key_id).await?;

        let requested_expiry = match request.expires_in_seconds {
            Some(seconds) => expiry_after(Utc::now(), seconds)?,
            None => None,
        };
        let expires_at = requested_expiry.or(old_key.expires_at());

        let secret = self
            .generator
            .generate()
            .map_err(|e| e.context("failed to generate API key"))?;

        let mut new_key = ApiKey::rotated_from(&old_key, secret, request.rotation_reason)?
            .with_expiration(expires_at);
        if let Some(name) = request.name {
            new_key = new_key.with_name(name);
        }

        let deactivated = (!request.keep_old_active).then(|| {
            let mut old = old_key.clone();
            old.deactivate();
            old
        });

        let created = self
            .repository
            .rotate(deactivated, new_key)
            .await
            .inspect_err(|e| {
                if e.is_partial_rotation() {
                    error!(
                        key_id = %old_key.id(),
                        prefix = old_key.prefix(),
                        "API key deactivated without a replacement; manual recovery required"
                    );
                }
            })?;

        info!(
            old_key_id = %old_key.id(),
            key_id = %created.id(),
            prefix = created.prefix(),
            version = created.version(),
            kept_old_active = request.keep_old_active,
            "API key rotated"
        );

        ApiKeyResponse::revealed(&created)
    }

    /// Revoke a key; the row stays, marked inactive
    #[instrument(skip_all, fields(user_id = %user_id, key_id = %key_id))]
    pub async fn delete_api_key(
        &self,
        user_id: &str,
        key_id: &ApiKeyId,
    ) -> Result<(), DomainError> {
        let key = self.owned_key(user_id, key_id).await?;

        self.repository
            .revoke(key.id())
            .await
            .map_err(|e| e.context("failed to delete API key"))?;

        info!(key_id = %key.id(), prefix = key.prefix(), name = key.name(), "API key revoked");
        Ok(())
    }

    /// Every key of a user, newest first, without secrets
    pub async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKeyResponse>, DomainError> {
        let mut keys = self
            .repository
            .list_by_user(user_id)
            .await
            .map_err(|e| e.context("failed to list API keys"))?;
        keys.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        debug!(user_id = %user_id, count = keys.len(), "Listed API keys");

        keys.iter().map(ApiKeyResponse::display_only).collect()
    }

    /// A single key of a user, without its secret
    pub async fn get_api_key(
        &self,
        user_id: &str,
        key_id: &ApiKeyId,
    ) -> Result<ApiKeyResponse, DomainError> {
        let key = self.owned_key(user_id, key_id).await?;
        ApiKeyResponse::display_only(&key)
    }

    /// Lineage of a key: the key itself first, then each parent up to the root
    pub async fn rotation_chain(
        &self,
        user_id: &str,
        key_id: &ApiKeyId,
    ) -> Result<Vec<ApiKeyResponse>, DomainError> {
        let mut current = self.owned_key(user_id, key_id).await?;
        let mut visited = HashSet::from([*current.id()]);
        let mut chain = vec![ApiKeyResponse::display_only(&current)?];

        while let Some(parent_id) = current.parent_key_id().copied() {
            if !visited.insert(parent_id) {
                return Err(DomainError::internal(format!(
                    "rotation chain of API key '{}' revisits '{}'",
                    key_id, parent_id
                )));
            }

            let Some(parent) = self
                .repository
                .get(&parent_id)
                .await
                .map_err(|e| e.context("failed to load parent API key"))?
            else {
                warn!(key_id = %current.id(), parent_key_id = %parent_id, "Parent API key missing");
                break;
            };

            chain.push(ApiKeyResponse::display_only(&parent)?);
            current = parent;
        }

        Ok(chain)
    }

    /// Keys rotated directly from the given key
    pub async fn list_rotations(
        &self,
        user_id: &str,
        key_id: &ApiKeyId,
    ) -> Result<Vec<ApiKeyResponse>, DomainError> {
        let key = self.owned_key(user_id, key_id).await?;

        let children = self
            .repository
            .list_children(key.id())
            .await
            .map_err(|e| e.context("failed to list rotated API keys"))?;

        children.iter().map(ApiKeyResponse::display_only).collect()
    }

    /// Decide whether a stored key may perform `action` on a resource
    ///
    /// The key must be active, unexpired, and its policy must allow the request.
    pub async fn authorize(
        &self,
        key_id: &ApiKeyId,
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<bool, DomainError> {
        let key = self
            .repository
            .get(key_id)
            .await
            .map_err(|e| e.context("failed to find API key"))?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", key_id)))?;

        let allowed = key.authorizes_at(Utc::now(), resource_type, resource_id, action)?;

        debug!(
            key_id = %key.id(),
            prefix = key.prefix(),
            resource_type,
            resource_id,
            action,
            allowed,
            "API key authorization decided"
        );

        Ok(allowed)
    }
}
