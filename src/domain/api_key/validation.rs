//! API Key validation utilities

use thiserror::Error;

use crate::domain::DomainError;

/// Number of leading secret characters kept as the display prefix
pub const KEY_PREFIX_LEN: usize = 10;

/// Errors that can occur during API key validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key ID '{0}' is not a valid UUID")]
    InvalidId(String),

    #[error("API key secret must be at least {0} characters")]
    SecretTooShort(usize),

    #[error("API key secret must be ASCII")]
    NonAsciiSecret,

    #[error("API key version cannot be incremented further")]
    VersionOverflow,
}

impl From<ApiKeyValidationError> for DomainError {
    fn from(err: ApiKeyValidationError) -> Self {
        match err {
            ApiKeyValidationError::InvalidId(_) | ApiKeyValidationError::VersionOverflow => {
                DomainError::validation(err.to_string())
            }
            ApiKeyValidationError::SecretTooShort(_) | ApiKeyValidationError::NonAsciiSecret => {
                DomainError::generation(err.to_string())
            }
        }
    }
}

/// Display prefix of a secret: its first 10 characters
pub fn key_prefix(secret: &str) -> Result<String, ApiKeyValidationError> {
    if !secret.is_ascii() {
        return Err(ApiKeyValidationError::NonAsciiSecret);
    }

    if secret.len() < KEY_PREFIX_LEN {
        return Err(ApiKeyValidationError::SecretTooShort(KEY_PREFIX_LEN));
    }

    Ok(secret[..KEY_PREFIX_LEN].to_string())
}
