//! Transport-agnostic request and response shapes for key management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{ApiKey, ApiKeyId};
use crate::domain::permission::{to_legacy_actions, PermissionSet, PolicyExpression};
use crate::domain::DomainError;

/// Request to create a new API key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    /// Requests per minute
    #[serde(default)]
    pub rate_limit: i32,
    /// Lifetime in seconds; zero or negative means no expiry
    #[serde(default)]
    pub expires_in_seconds: i64,
    /// Flat legacy action names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    /// Structured policy; takes priority over `permissions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_set: Option<PermissionSet>,
}

impl CreateApiKeyRequest {
    pub fn new(name: impl Into<String>, rate_limit: i32) -> Self {
        Self {
            name: name.into(),
            rate_limit,
            ..Default::default()
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<impl Into<String>>) -> Self {
        self.permissions = Some(permissions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_permission_set(mut self, permission_set: PermissionSet) -> Self {
        self.permission_set = Some(permission_set);
        self
    }

    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.expires_in_seconds = seconds;
        self
    }

    /// The policy this request asks for
    pub fn policy_expression(&self) -> PolicyExpression {
        PolicyExpression::from_request(self.permission_set.clone(), self.permissions.clone())
    }
}

/// Request to rotate an existing API key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotateApiKeyRequest {
    /// Leave the old key usable alongside the new one
    #[serde(default)]
    pub keep_old_active: bool,
    #[serde(default)]
    pub rotation_reason: String,
    /// Overrides the inherited expiration when positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<i64>,
    /// Overrides the default "<old name> (rotated)"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl RotateApiKeyRequest {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            rotation_reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn keep_old_active(mut self, keep: bool) -> Self {
        self.keep_old_active = keep;
        self
    }

    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.expires_in_seconds = Some(seconds);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A secret handed to the caller; redacted in Debug output
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevealedSecret(String);

impl RevealedSecret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RevealedSecret(..)")
    }
}

/// API key as returned to callers
///
/// `api_key` is only populated on the create/rotate response that produced
/// the secret; every other response is display-only and carries `prefix`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub id: ApiKeyId,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<RevealedSecret>,
    pub prefix: String,
    /// Flat legacy action list
    pub permissions: Vec<String>,
    pub permission_set: PermissionSet,
    pub rate_limit: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub parent_key_id: Option<ApiKeyId>,
    pub version: i32,
    pub rotation_reason: Option<String>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl ApiKeyResponse {
    /// Response that exposes the secret; only for the call that generated it
    pub fn revealed(key: &ApiKey) -> Result<Self, DomainError> {
        let mut response = Self::display_only(key)?;
        response.api_key = Some(RevealedSecret(key.secret().to_string()));
        Ok(response)
    }

    /// Response without the secret
    pub fn display_only(key: &ApiKey) -> Result<Self, DomainError> {
        let permission_set = key.permission_set()?;

        Ok(Self {
            id: *key.id(),
            user_id: key.user_id().to_string(),
            name: key.name().to_string(),
            api_key: None,
            prefix: key.prefix().to_string(),
            permissions: to_legacy_actions(&permission_set),
            permission_set,
            rate_limit: key.rate_limit(),
            expires_at: key.expires_at(),
            last_used_at: key.last_used_at(),
            is_active: key.is_active(),
            created_at: key.created_at(),
            parent_key_id: key.parent_key_id().copied(),
            version: key.version(),
            rotation_reason: key.rotation_reason().map(str::to_string),
            rotated_at: key.rotated_at(),
        })
    }

    pub fn secret(&self) -> Option<&str> {
        self.api_key.as_ref().map(RevealedSecret::expose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::encode_permission_set;
    use serde_json::json;

    fn test_key() -> ApiKey {
        let blob = encode_permission_set(&PermissionSet::full_access()).unwrap();
        ApiKey::new("user-1", "Key", "mr-0123456789abcdef", blob, 30).unwrap()
    }

    #[test]
    fn test_create_request_from_json() {
        let request: CreateApiKeyRequest = serde_json::from_value(json!({
            "name": "ci",
            "rate_limit": 120,
            "permissions": ["read"]
        }))
        .unwrap();

        assert_eq!(request.expires_in_seconds, 0);
        assert_eq!(
            request.policy_expression(),
            PolicyExpression::ActionList(vec!["read".to_string()])
        );
    }

    #[test]
    fn test_rotate_request_defaults() {
        let request: RotateApiKeyRequest = serde_json::from_value(json!({})).unwrap();

        assert!(!request.keep_old_active);
        assert!(request.rotation_reason.is_empty());
        assert!(request.expires_in_seconds.is_none());
    }

    #[test]
    fn test_revealed_response_exposes_secret() {
        let key = test_key();
        let response = ApiKeyResponse::revealed(&key).unwrap();

        assert_eq!(response.secret(), Some("mr-0123456789abcdef"));
        assert_eq!(response.prefix, "mr-0123456");
        assert_eq!(response.permissions, vec!["admin", "read", "write"]);
        assert!(!format!("{:?}", response).contains("mr-0123456789abcdef"));
    }

    #[test]
    fn test_display_only_response_hides_secret() {
        let key = test_key();
        let response = ApiKeyResponse::display_only(&key).unwrap();
        let json = serde_json::to_value(&response).unwrap();

        assert!(response.secret().is_none());
        assert!(json.get("api_key").is_none());
        assert_eq!(json["prefix"], "mr-0123456");
        assert_eq!(json["version"], 1);
    }
}
