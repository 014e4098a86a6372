//! Permission set validation

use thiserror::Error;

use super::entity::{Permission, PermissionSet};
use crate::domain::DomainError;

/// Errors that can occur while validating a permission set
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PermissionValidationError {
    #[error("permission #{0} resource_type cannot be empty")]
    EmptyResourceType(usize),

    #[error("permission #{0} resource_id cannot be empty")]
    EmptyResourceId(usize),

    #[error("permission #{0} action cannot be empty")]
    EmptyAction(usize),
}

impl From<PermissionValidationError> for DomainError {
    fn from(err: PermissionValidationError) -> Self {
        DomainError::validation(format!("invalid permission set: {}", err))
    }
}

fn validate_permission(index: usize, perm: &Permission) -> Result<(), PermissionValidationError> {
    if perm.resource_type().trim().is_empty() {
        return Err(PermissionValidationError::EmptyResourceType(index));
    }

    if perm.resource_id().trim().is_empty() {
        return Err(PermissionValidationError::EmptyResourceId(index));
    }

    if perm.action().trim().is_empty() {
        return Err(PermissionValidationError::EmptyAction(index));
    }

    Ok(())
}

/// Validate every explicit permission of a set
///
/// Only the structured entries are checked; the deprecated arrays and the
/// quota fields are accepted as-is.
pub fn validate_permission_set(set: &PermissionSet) -> Result<(), PermissionValidationError> {
    set.permissions()
        .iter()
        .enumerate()
        .try_for_each(|(index, perm)| validate_permission(index, perm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sets() {
        assert!(validate_permission_set(&PermissionSet::full_access()).is_ok());
        assert!(validate_permission_set(&PermissionSet::default()).is_ok());
    }

    #[test]
    fn test_empty_resource_type() {
        let set = PermissionSet::default().with_permission(Permission::new("", "*", "read"));
        assert_eq!(
            validate_permission_set(&set),
            Err(PermissionValidationError::EmptyResourceType(0))
        );
    }

    #[test]
    fn test_whitespace_resource_id() {
        let set = PermissionSet::default()
            .with_permission(Permission::new("model", "gpt-4", "read"))
            .with_permission(Permission::new("model", "   ", "read"));
        assert_eq!(
            validate_permission_set(&set),
            Err(PermissionValidationError::EmptyResourceId(1))
        );
    }

    #[test]
    fn test_empty_action() {
        let set = PermissionSet::default().with_permission(Permission::new("billing", "*", "\t"));
        assert_eq!(
            validate_permission_set(&set),
            Err(PermissionValidationError::EmptyAction(0))
        );
    }

    #[test]
    fn test_legacy_arrays_not_validated() {
        let set = PermissionSet::default()
            .with_allowed_models(vec![""])
            .with_allowed_operations(vec![" "]);
        assert!(validate_permission_set(&set).is_ok());
    }

    #[test]
    fn test_converts_to_domain_validation_error() {
        let err: DomainError = PermissionValidationError::EmptyAction(2).into();
        assert!(matches!(err, DomainError::Validation { .. }));
    }
}
