//! Permission domain
//!
//! The policy value attached to every API key, its evaluator, and the
//! translator between the canonical shape and the historical ones.

mod entity;
mod legacy;
mod validation;

pub use entity::{Permission, PermissionSet, BILLING_RESOURCE, MODEL_RESOURCE, WILDCARD};
pub use legacy::{
    contains_read_and_write, decode_permission_blob, encode_permission_set, resolve_action_list,
    to_legacy_actions, PermissionBlob, PolicyExpression, LEGACY_FULL_ACCESS,
};
pub use validation::{validate_permission_set, PermissionValidationError};
