//! Domain layer - Core business logic and entities

pub mod api_key;
pub mod error;
pub mod permission;

pub use api_key::{
    ApiKey, ApiKeyId, ApiKeyRepository, ApiKeyResponse, ApiKeyValidationError,
    CreateApiKeyRequest, RotateApiKeyRequest,
};
pub use error::DomainError;
pub use permission::{Permission, PermissionSet, PermissionValidationError, PolicyExpression};
