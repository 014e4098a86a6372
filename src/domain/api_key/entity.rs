//! API Key entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::validation::{key_prefix, ApiKeyValidationError, KEY_PREFIX_LEN};
use crate::domain::permission::{decode_permission_blob, PermissionSet};
use crate::domain::DomainError;

/// API Key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(Uuid);

impl ApiKeyId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the textual UUID form
    pub fn parse(id: &str) -> Result<Self, ApiKeyValidationError> {
        Uuid::parse_str(id)
            .map(Self)
            .map_err(|_| ApiKeyValidationError::InvalidId(id.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ApiKeyId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::str::FromStr for ApiKeyId {
    type Err = ApiKeyValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every persisted column of an API key row
///
/// Used by repositories to rebuild an [`ApiKey`]. The stored prefix is not
/// part of it: the prefix is always recomputed as the first 10 characters of
/// the secret, without validating the secret itself.
#[derive(Clone)]
pub struct ApiKeySnapshot {
    pub id: ApiKeyId,
    pub user_id: String,
    pub name: String,
    pub api_key: String,
    pub permissions: Option<Value>,
    pub rate_limit: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub version: i32,
    pub parent_key_id: Option<ApiKeyId>,
    pub rotation_reason: Option<String>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API Key entity
///
/// The secret is set once, at creation or rotation; a new secret always
/// means a new key row.
#[derive(Clone, PartialEq)]
pub struct ApiKey {
    id: ApiKeyId,
    /// Owning user
    user_id: String,
    name: String,
    /// The secret value
    api_key: String,
    /// First 10 characters of the secret
    prefix: String,
    /// Persisted permission blob (None = never set, full access)
    permissions: Option<Value>,
    /// Requests per minute, carried but not enforced here
    rate_limit: i32,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    is_active: bool,
    /// 1 for a root key, parent version + 1 for a rotated key
    version: i32,
    parent_key_id: Option<ApiKeyId>,
    rotation_reason: Option<String>,
    rotated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Create a new root key (version 1, no parent, active)
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        secret: impl Into<String>,
        permissions: Value,
        rate_limit: i32,
    ) -> Result<Self, ApiKeyValidationError> {
        let secret = secret.into();
        let prefix = key_prefix(&secret)?;
        let now = Utc::now();

        Ok(Self {
            id: ApiKeyId::generate(),
            user_id: user_id.into(),
            name: name.into(),
            api_key: secret,
            prefix,
            permissions: Some(permissions),
            rate_limit,
            expires_at: None,
            last_used_at: None,
            is_active: true,
            version: 1,
            parent_key_id: None,
            rotation_reason: None,
            rotated_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Create the successor of `parent` in its rotation chain
    ///
    /// The permission blob and rate limit are copied verbatim, the expiration
    /// is inherited, and the name defaults to `"<parent name> (rotated)"`.
    pub fn rotated_from(
        parent: &ApiKey,
        secret: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Self, ApiKeyValidationError> {
        let version = parent
            .version
            .checked_add(1)
            .ok_or(ApiKeyValidationError::VersionOverflow)?;
        let secret = secret.into();
        let prefix = key_prefix(&secret)?;
        let now = Utc::now();

        Ok(Self {
            id: ApiKeyId::generate(),
            user_id: parent.user_id.clone(),
            name: format!("{} (rotated)", parent.name),
            api_key: secret,
            prefix,
            permissions: parent.permissions.clone(),
            rate_limit: parent.rate_limit,
            expires_at: parent.expires_at,
            last_used_at: None,
            is_active: true,
            version,
            parent_key_id: Some(parent.id),
            rotation_reason: Some(reason.into()),
            rotated_at: Some(now),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a key from its stored columns
    pub fn from_snapshot(snapshot: ApiKeySnapshot) -> Self {
        let prefix = snapshot.api_key.chars().take(KEY_PREFIX_LEN).collect();

        Self {
            id: snapshot.id,
            user_id: snapshot.user_id,
            name: snapshot.name,
            api_key: snapshot.api_key,
            prefix,
            permissions: snapshot.permissions,
            rate_limit: snapshot.rate_limit,
            expires_at: snapshot.expires_at,
            last_used_at: snapshot.last_used_at,
            is_active: snapshot.is_active,
            version: snapshot.version,
            parent_key_id: snapshot.parent_key_id,
            rotation_reason: snapshot.rotation_reason,
            rotated_at: snapshot.rotated_at,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set (or clear) the expiration
    pub fn with_expiration(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The secret value; never log this
    pub fn secret(&self) -> &str {
        &self.api_key
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn permissions(&self) -> Option<&Value> {
        self.permissions.as_ref()
    }

    pub fn rate_limit(&self) -> i32 {
        self.rate_limit
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn parent_key_id(&self) -> Option<&ApiKeyId> {
        self.parent_key_id.as_ref()
    }

    pub fn rotation_reason(&self) -> Option<&str> {
        self.rotation_reason.as_deref()
    }

    pub fn rotated_at(&self) -> Option<DateTime<Utc>> {
        self.rotated_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    // Status checks

    /// Expiry is computed, never stored: a key may be active yet expired
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Active and not expired
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }

    /// Rehydrated policy of this key
    pub fn permission_set(&self) -> Result<PermissionSet, DomainError> {
        decode_permission_blob(self.permissions.as_ref())
            .map_err(|e| e.context(format!("stored permissions of API key '{}'", self.id)))
    }

    /// Combined authorization check: usable at `now` and the policy allows
    pub fn authorizes_at(
        &self,
        now: DateTime<Utc>,
        resource_type: &str,
        resource_id: &str,
        action: &str,
    ) -> Result<bool, DomainError> {
        if !self.is_usable_at(now) {
            return Ok(false);
        }

        Ok(self
            .permission_set()?
            .has_permission(resource_type, resource_id, action))
    }

    // Mutators

    /// Soft revoke; the row is kept for audit
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    /// Record key usage
    pub fn record_usage(&mut self) {
        self.last_used_at = Some(Utc::now());
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .field("prefix", &self.prefix)
            .field("rate_limit", &self.rate_limit)
            .field("expires_at", &self.expires_at)
            .field("is_active", &self.is_active)
            .field("version", &self.version)
            .field("parent_key_id", &self.parent_key_id)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ApiKeySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeySnapshot")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
