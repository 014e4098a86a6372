//! Translation between persisted/legacy policy shapes and [`PermissionSet`]
//!
//! Three historical shapes exist for the permission blob stored with a key:
//! no blob at all, the canonical structured document, and the older
//! `{"permissions": ["read", "write"], "allowed_models": [...]}` document.
//! Older clients also expect a flat action list back.

use std::collections::BTreeSet;

use serde_json::Value;

use super::entity::{PermissionSet, MODEL_RESOURCE, WILDCARD};
use crate::domain::DomainError;

/// Flat action list reported for unrestricted keys, sorted
pub const LEGACY_FULL_ACCESS: [&str; 3] = ["admin", "read", "write"];

/// The shape a persisted permission blob was recognized as
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionBlob {
    /// No blob stored
    Absent,
    /// Canonical document
    Structured(PermissionSet),
    /// Historical document with bare action names
    StringList {
        operations: Option<Vec<String>>,
        models: Option<Vec<String>>,
    },
}

impl PermissionBlob {
    /// Recognize a stored blob, trying the canonical shape first
    pub fn parse(blob: Option<&Value>) -> Result<Self, DomainError> {
        let value = match blob {
            None | Some(Value::Null) => return Ok(Self::Absent),
            Some(value) => value,
        };

        let object = value.as_object().ok_or_else(|| {
            DomainError::validation("permission blob must be a JSON object")
        })?;

        if let Ok(set) = serde_json::from_value::<PermissionSet>(value.clone()) {
            return Ok(Self::Structured(set));
        }

        Ok(Self::StringList {
            operations: object.get("permissions").and_then(string_entries),
            models: object.get("allowed_models").and_then(string_entries),
        })
    }

    /// Canonical set this blob stands for
    pub fn into_permission_set(self) -> PermissionSet {
        match self {
            Self::Absent => PermissionSet::full_access(),
            Self::Structured(set) => set,
            Self::StringList { operations, models } => {
                let mut set = PermissionSet::full_access();

                if let Some(operations) = operations {
                    set.set_allowed_operations(operations);
                }
                if let Some(models) = models {
                    set.set_allowed_models(models);
                }

                set.synthesize_from_legacy_arrays();
                set
            }
        }
    }
}

/// String members of a JSON array; other members are skipped
fn string_entries(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect()
    })
}

/// Rehydrate a stored blob into a permission set
pub fn decode_permission_blob(blob: Option<&Value>) -> Result<PermissionSet, DomainError> {
    Ok(PermissionBlob::parse(blob)?.into_permission_set())
}

/// Canonical persisted form of a permission set
pub fn encode_permission_set(set: &PermissionSet) -> Result<Value, DomainError> {
    serde_json::to_value(set)
        .map_err(|e| DomainError::internal(format!("failed to encode permission set: {}", e)))
}

fn full_access_actions() -> Vec<String> {
    LEGACY_FULL_ACCESS.iter().map(|s| s.to_string()).collect()
}

/// Flatten a set into the action list older clients understand
pub fn to_legacy_actions(set: &PermissionSet) -> Vec<String> {
    if set.is_unrestricted() {
        return full_access_actions();
    }

    let mut actions = BTreeSet::new();
    for perm in set.permissions() {
        if perm.resource_type() != MODEL_RESOURCE || perm.resource_id().is_empty() {
            continue;
        }
        if perm.action() == WILDCARD {
            return full_access_actions();
        }
        actions.insert(perm.action().to_string());
    }

    if actions.is_empty() && !set.allowed_operations().is_empty() {
        return set.allowed_operations().to_vec();
    }

    actions.into_iter().collect()
}

/// True when the operations include both `read` and `write`
pub fn contains_read_and_write(operations: &[String]) -> bool {
    operations.iter().any(|op| op == "read") && operations.iter().any(|op| op == "write")
}

/// Translate a flat creation-time action list
///
/// `admin` anywhere yields full access. `read` together with `write` is
/// escalated to full access as well.
/// Unrecognized names are ignored, and a list with nothing recognized is full
/// access.
pub fn resolve_action_list(actions: &[String]) -> PermissionSet {
    let mut operations: Vec<String> = Vec::new();

    for action in actions {
        match action.as_str() {
            "read" | "write" => {
                if !operations.contains(action) {
                    operations.push(action.clone());
                }
            }
            "admin" => return PermissionSet::full_access(),
            _ => {}
        }
    }

    if operations.is_empty() || contains_read_and_write(&operations) {
        return PermissionSet::full_access();
    }

    PermissionSet::model_specific([WILDCARD], operations)
}

/// Policy supplied by a caller when creating a key
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyExpression {
    /// Used verbatim
    Structured(PermissionSet),
    /// Flat action names, see [`resolve_action_list`]
    ActionList(Vec<String>),
    /// Nothing supplied
    Unspecified,
}

impl PolicyExpression {
    /// Pick the expression from request fields; a structured set wins
    pub fn from_request(
        permission_set: Option<PermissionSet>,
        permissions: Option<Vec<String>>,
    ) -> Self {
        match (permission_set, permissions) {
            (Some(set), _) => Self::Structured(set),
            (None, Some(actions)) if !actions.is_empty() => Self::ActionList(actions),
            _ => Self::Unspecified,
        }
    }

    pub fn resolve(self) -> PermissionSet {
        match self {
            Self::Structured(set) => set,
            Self::ActionList(actions) => resolve_action_list(&actions),
            Self::Unspecified => PermissionSet::full_access(),
        }
    }
}
