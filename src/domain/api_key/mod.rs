//! API Key domain
//!
//! This module provides the API key record, its rotation-chain fields, the
//! request/response shapes used by the lifecycle, and the storage trait.

mod entity;
mod repository;
mod request;
mod validation;

pub use entity::{ApiKey, ApiKeyId, ApiKeySnapshot};
pub use repository::ApiKeyRepository;
pub use request::{ApiKeyResponse, CreateApiKeyRequest, RevealedSecret, RotateApiKeyRequest};
pub use validation::{key_prefix, ApiKeyValidationError, KEY_PREFIX_LEN};

#[cfg(test)]
pub use repository::mock;
