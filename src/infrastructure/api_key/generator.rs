//! API Key secret generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
#[cfg(test)]
use mockall::automock;
use rand::RngCore;

use crate::domain::DomainError;

/// Source of new secret values
#[cfg_attr(test, automock)]
pub trait SecretGenerator: Send + Sync {
    /// Produce a fresh secret
    fn generate(&self) -> Result<String, DomainError>;
}

/// Generator for random secrets: `<prefix><base64url(random bytes)>`
#[derive(Debug, Clone)]
pub struct RandomSecretGenerator {
    /// Leading marker for all generated secrets (e.g. "mr-")
    prefix: String,
    /// Number of random bytes to generate
    secret_bytes: usize,
}

impl RandomSecretGenerator {
    /// Create a new generator
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            secret_bytes: 32,
        }
    }

    /// Generator for production keys
    pub fn production() -> Self {
        Self::new("mr-")
    }

    /// Set the number of random bytes
    pub fn with_secret_bytes(mut self, bytes: usize) -> Self {
        self.secret_bytes = bytes;
        self
    }
}

impl SecretGenerator for RandomSecretGenerator {
    fn generate(&self) -> Result<String, DomainError> {
        let mut random_bytes = vec![0u8; self.secret_bytes];
        rand::thread_rng()
            .try_fill_bytes(&mut random_bytes)
            .map_err(|e| DomainError::generation(format!("random source failed: {}", e)))?;

        Ok(format!("{}{}", self.prefix, URL_SAFE_NO_PAD.encode(&random_bytes)))
    }
}

impl Default for RandomSecretGenerator {
    fn default() -> Self {
        Self::production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::KEY_PREFIX_LEN;

    #[test]
    fn test_generate_secret() {
        let secret = RandomSecretGenerator::production().generate().unwrap();

        assert!(secret.starts_with("mr-"));
        // 32 bytes base64-encoded = 43 chars, plus prefix
        assert_eq!(secret.len(), 3 + 43);
        assert!(secret.len() >= KEY_PREFIX_LEN);
    }

    #[test]
    fn test_custom_prefix_and_length() {
        let secret = RandomSecretGenerator::new("sk_")
            .with_secret_bytes(64)
            .generate()
            .unwrap();

        assert!(secret.starts_with("sk_"));
        // 64 bytes base64-encoded = 86 chars
        assert_eq!(secret.len(), 3 + 86);
    }

    #[test]
    fn test_secret_uniqueness() {
        let generator = RandomSecretGenerator::production();
        let first = generator.generate().unwrap();
        let second = generator.generate().unwrap();

        assert_ne!(first, second);
        assert_ne!(&first[..KEY_PREFIX_LEN], &second[..KEY_PREFIX_LEN]);
    }

    #[test]
    fn test_secret_is_url_safe() {
        let secret = RandomSecretGenerator::production().generate().unwrap();

        assert!(secret
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
