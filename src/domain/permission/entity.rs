//! Permission and PermissionSet entities

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::validation::{validate_permission_set, PermissionValidationError};

/// Matches any value in the field it occupies
pub const WILDCARD: &str = "*";

/// Resource type for model access
pub const MODEL_RESOURCE: &str = "model";

/// Resource type for billing data
pub const BILLING_RESOURCE: &str = "billing";

fn matches(granted: &str, requested: &str) -> bool {
    granted == requested || granted == WILDCARD
}

fn list_allows(list: &[String], requested: &str) -> bool {
    list.iter().any(|entry| matches(entry, requested))
}

/// Treats an explicit JSON `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Atomic grant of an action on a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Kind of resource (e.g. "model", "billing", or "*")
    #[serde(default)]
    resource_type: String,
    /// Concrete resource identifier or "*"
    #[serde(default)]
    resource_id: String,
    /// Verb being granted (e.g. "read", "write") or "*"
    #[serde(default)]
    action: String,
    /// Free-form hints such as quotas
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    constraints: BTreeMap<String, Value>,
}

impl Permission {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            action: action.into(),
            constraints: BTreeMap::new(),
        }
    }

    /// Permission on a model resource
    pub fn model(model_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(MODEL_RESOURCE, model_id, action)
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn constraints(&self) -> &BTreeMap<String, Value> {
        &self.constraints
    }

    /// Whether this entry grants the requested triple
    pub fn grants(&self, resource_type: &str, resource_id: &str, action: &str) -> bool {
        matches(&self.resource_type, resource_type)
            && matches(&self.resource_id, resource_id)
            && matches(&self.action, action)
    }
}

/// Authorization policy attached to an API key
///
/// Evaluation goes through [`PermissionSet::has_permission`] only, so callers
/// never need to know whether a set carries structured entries, the
/// deprecated parallel arrays, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default, deserialize_with = "null_as_default")]
    permissions: Vec<Permission>,

    /// Verdict when neither explicit nor legacy rules decide
    #[serde(default)]
    default_allow: bool,

    /// Advisory, not enforced here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_requests_per_month: Option<i64>,

    /// Advisory, not enforced here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_tokens_per_month: Option<i64>,

    /// Deprecated: use `permissions`
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    allowed_models: Vec<String>,

    /// Deprecated: use `permissions`
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    allowed_operations: Vec<String>,
}

impl PermissionSet {
    /// Wildcard model access, read-only billing, default allow
    pub fn full_access() -> Self {
        Self {
            permissions: vec![
                Permission::model(WILDCARD, WILDCARD),
                Permission::new(BILLING_RESOURCE, WILDCARD, "read"),
            ],
            default_allow: true,
            max_requests_per_month: None,
            max_tokens_per_month: None,
            allowed_models: vec![WILDCARD.to_string()],
            allowed_operations: vec![WILDCARD.to_string()],
        }
    }

    /// Grants every operation on every listed model, denies everything else
    pub fn model_specific<M, O>(model_ids: M, operations: O) -> Self
    where
        M: IntoIterator,
        M::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        let models: Vec<String> = model_ids.into_iter().map(Into::into).collect();
        let operations: Vec<String> = operations.into_iter().map(Into::into).collect();

        Self {
            permissions: model_cross_product(&models, &operations),
            default_allow: false,
            max_requests_per_month: None,
            max_tokens_per_month: None,
            allowed_models: models,
            allowed_operations: operations,
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_default_allow(mut self, default_allow: bool) -> Self {
        self.default_allow = default_allow;
        self
    }

    pub fn with_max_requests_per_month(mut self, max: i64) -> Self {
        self.max_requests_per_month = Some(max);
        self
    }

    pub fn with_max_tokens_per_month(mut self, max: i64) -> Self {
        self.max_tokens_per_month = Some(max);
        self
    }

    pub fn with_allowed_models(mut self, models: Vec<impl Into<String>>) -> Self {
        self.allowed_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_operations(mut self, operations: Vec<impl Into<String>>) -> Self {
        self.allowed_operations = operations.into_iter().map(Into::into).collect();
        self
    }

    // Getters

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn default_allow(&self) -> bool {
        self.default_allow
    }

    pub fn max_requests_per_month(&self) -> Option<i64> {
        self.max_requests_per_month
    }

    pub fn max_tokens_per_month(&self) -> Option<i64> {
        self.max_tokens_per_month
    }

    pub fn allowed_models(&self) -> &[String] {
        &self.allowed_models
    }

    pub fn allowed_operations(&self) -> &[String] {
        &self.allowed_operations
    }

    /// Append the `allowed_models x allowed_operations` product to the explicit entries
    pub(crate) fn synthesize_from_legacy_arrays(&mut self) {
        let synthesized = model_cross_product(&self.allowed_models, &self.allowed_operations);
        self.permissions.extend(synthesized);
    }

    pub(crate) fn set_allowed_models(&mut self, models: Vec<String>) {
        self.allowed_models = models;
    }

    pub(crate) fn set_allowed_operations(&mut self, operations: Vec<String>) {
        self.allowed_operations = operations;
    }

    // Evaluation

    /// Decide whether the triple is allowed
    ///
    /// 1. any explicit permission granting it allows;
    /// 2. for `model` requests, the deprecated arrays allow when both the
    ///    model and the operation are listed;
    /// 3. otherwise `default_allow` decides.
    pub fn has_permission(&self, resource_type: &str, resource_id: &str, action: &str) -> bool {
        if self
            .permissions
            .iter()
            .any(|perm| perm.grants(resource_type, resource_id, action))
        {
            return true;
        }

        if resource_type == MODEL_RESOURCE
            && list_allows(&self.allowed_models, resource_id)
            && list_allows(&self.allowed_operations, action)
        {
            return true;
        }

        self.default_allow
    }

    pub fn check_model_access(&self, model_id: &str, operation: &str) -> bool {
        self.has_permission(MODEL_RESOURCE, model_id, operation)
    }

    /// Full access in the outbound sense: default allow with no explicit entries
    pub fn is_unrestricted(&self) -> bool {
        self.default_allow && self.permissions.is_empty()
    }

    pub fn validate(&self) -> Result<(), PermissionValidationError> {
        validate_permission_set(self)
    }
}

fn model_cross_product(models: &[String], operations: &[String]) -> Vec<Permission> {
    models
        .iter()
        .flat_map(|model| {
            operations
                .iter()
                .map(move |op| Permission::model(model.clone(), op.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_TYPES: [&str; 4] = ["model", "billing", "key", "*"];
    const PROBE_IDS: [&str; 4] = ["gpt-4", "claude-3", "*", "acct-1"];
    const PROBE_ACTIONS: [&str; 5] = ["read", "write", "admin", "delete", "*"];

    fn probes() -> impl Iterator<Item = (&'static str, &'static str, &'static str)> {
        PROBE_TYPES.into_iter().flat_map(|t| {
            PROBE_IDS
                .into_iter()
                .flat_map(move |id| PROBE_ACTIONS.into_iter().map(move |a| (t, id, a)))
        })
    }

    #[test]
    fn test_full_access_shape() {
        let set = PermissionSet::full_access();

        assert!(set.default_allow());
        assert_eq!(set.permissions().len(), 2);
        assert_eq!(
            set.permissions()
                .iter()
                .filter(|p| p.resource_type() == MODEL_RESOURCE
                    && p.resource_id() == WILDCARD
                    && p.action() == WILDCARD)
                .count(),
            1
        );
        assert_eq!(
            set.permissions()
                .iter()
                .filter(|p| p.resource_type() == BILLING_RESOURCE && p.action() == "read")
                .count(),
            1
        );
    }

    #[test]
    fn test_full_access_allows_everything() {
        let set = PermissionSet::full_access();
        for (t, id, a) in probes() {
            assert!(set.has_permission(t, id, a), "denied {t}/{id}/{a}");
        }
    }

    #[test]
    fn test_no_match_falls_to_default_deny() {
        let set = PermissionSet::default()
            .with_permission(Permission::model("gpt-4", "read"))
            .with_permission(Permission::new("billing", "acct-9", "read"));

        assert!(!set.has_permission("model", "claude-3", "read"));
        assert!(!set.has_permission("model", "gpt-4", "write"));
        assert!(!set.has_permission("key", "gpt-4", "read"));
        assert!(!set.has_permission("billing", "acct-1", "read"));
    }

    #[test]
    fn test_empty_set_denies_everything() {
        let set = PermissionSet::default();
        for (t, id, a) in probes() {
            assert!(!set.has_permission(t, id, a));
        }
    }

    #[test]
    fn test_explicit_wildcards() {
        let set = PermissionSet::default()
            .with_permission(Permission::new("*", "shared", "read"))
            .with_permission(Permission::model("*", "write"));

        assert!(set.has_permission("billing", "shared", "read"));
        assert!(set.has_permission("key", "shared", "read"));
        assert!(!set.has_permission("key", "shared", "write"));
        assert!(set.has_permission("model", "anything", "write"));
        assert!(!set.has_permission("model", "anything", "read"));
    }

    #[test]
    fn test_scan_order_does_not_matter() {
        let a = PermissionSet::default()
            .with_permission(Permission::model("gpt-4", "read"))
            .with_permission(Permission::new("*", "*", "admin"));
        let b = PermissionSet::default()
            .with_permission(Permission::new("*", "*", "admin"))
            .with_permission(Permission::model("gpt-4", "read"));

        for (t, id, act) in probes() {
            assert_eq!(a.has_permission(t, id, act), b.has_permission(t, id, act));
        }
    }

    #[test]
    fn test_legacy_arrays_require_model_and_operation() {
        let set = PermissionSet::default()
            .with_allowed_models(vec!["gpt-4"])
            .with_allowed_operations(vec!["read"]);

        assert!(set.check_model_access("gpt-4", "read"));
        assert!(!set.check_model_access("gpt-4", "write"));
        assert!(!set.check_model_access("claude-3", "read"));
    }

    #[test]
    fn test_legacy_arrays_wildcards() {
        let set = PermissionSet::default()
            .with_allowed_models(vec!["*"])
            .with_allowed_operations(vec!["read"]);
        assert!(set.check_model_access("anything", "read"));
        assert!(!set.check_model_access("anything", "write"));

        let set = PermissionSet::default()
            .with_allowed_models(vec!["gpt-4"])
            .with_allowed_operations(vec!["*"]);
        assert!(set.check_model_access("gpt-4", "delete"));
        assert!(!set.check_model_access("claude-3", "delete"));
    }

    #[test]
    fn test_legacy_arrays_only_apply_to_models() {
        let set = PermissionSet::default()
            .with_allowed_models(vec!["*"])
            .with_allowed_operations(vec!["*"]);

        assert!(set.has_permission("model", "x", "read"));
        assert!(!set.has_permission("billing", "x", "read"));
    }

    #[test]
    fn test_default_allow_fallback() {
        let set = PermissionSet::default()
            .with_permission(Permission::model("gpt-4", "read"))
            .with_default_allow(true);

        assert!(set.has_permission("billing", "acct", "write"));
    }

    #[test]
    fn test_model_specific() {
        let set = PermissionSet::model_specific(vec!["gpt-4", "claude-3"], vec!["read", "write"]);

        assert_eq!(set.permissions().len(), 4);
        assert!(!set.default_allow());
        assert!(set.check_model_access("claude-3", "write"));
        assert!(!set.check_model_access("llama", "read"));
        assert!(!set.has_permission("billing", "*", "read"));
    }

    #[test]
    fn test_constraints_roundtrip_through_json() {
        let set = PermissionSet::default().with_permission(
            Permission::model("gpt-4", "read").with_constraint("max_tokens_per_month", 1000),
        );

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(
            json["permissions"][0]["constraints"]["max_tokens_per_month"],
            1000
        );

        let back: PermissionSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_null_fields_decode_as_empty() {
        let set: PermissionSet = serde_json::from_value(serde_json::json!({
            "permissions": null,
            "default_allow": true,
            "allowed_models": null
        }))
        .unwrap();

        assert!(set.permissions().is_empty());
        assert!(set.allowed_models().is_empty());
        assert!(set.is_unrestricted());
    }
}
