use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Secret generation error: {message}")]
    Generation { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    /// The old key was deactivated but its replacement was never stored.
    #[error("Partial rotation: key '{old_key_id}' was deactivated but no replacement was stored: {message}")]
    PartialRotation { old_key_id: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn partial_rotation(old_key_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PartialRotation {
            old_key_id: old_key_id.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Prefix the message with operation context, keeping the error kind.
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        let wrap = |message: String| format!("{}: {}", context, message);

        match self {
            Self::NotFound { message } => Self::NotFound {
                message: wrap(message),
            },
            Self::Unauthorized { message } => Self::Unauthorized {
                message: wrap(message),
            },
            Self::Validation { message } => Self::Validation {
                message: wrap(message),
            },
            Self::Conflict { message } => Self::Conflict {
                message: wrap(message),
            },
            Self::Generation { message } => Self::Generation {
                message: wrap(message),
            },
            Self::Storage { message } => Self::Storage {
                message: wrap(message),
            },
            Self::PartialRotation {
                old_key_id,
                message,
            } => Self::PartialRotation {
                old_key_id,
                message: wrap(message),
            },
            Self::Configuration { message } => Self::Configuration {
                message: wrap(message),
            },
            Self::Internal { message } => Self::Internal {
                message: wrap(message),
            },
        }
    }

    /// True when the failure left durable state that needs manual attention
    pub fn is_partial_rotation(&self) -> bool {
        matches!(self, Self::PartialRotation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = DomainError::not_found("API key 'abc' not found");
        assert_eq!(error.to_string(), "Not found: API key 'abc' not found");
    }

    #[test]
    fn test_unauthorized_error() {
        let error = DomainError::unauthorized("not the owner");
        assert_eq!(error.to_string(), "Unauthorized: not the owner");
    }

    #[test]
    fn test_context_keeps_variant() {
        let error = DomainError::storage("connection reset").context("failed to create API key");

        assert!(matches!(error, DomainError::Storage { .. }));
        assert_eq!(
            error.to_string(),
            "Storage error: failed to create API key: connection reset"
        );
    }

    #[test]
    fn test_partial_rotation_error() {
        let error = DomainError::partial_rotation("key-1", "insert failed");

        assert!(error.is_partial_rotation());
        assert!(error.to_string().contains("key-1"));
        assert!(!DomainError::storage("x").is_partial_rotation());
    }
}
