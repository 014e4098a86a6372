use serde::Deserialize;

use crate::domain::api_key::KEY_PREFIX_LEN;
use crate::domain::DomainError;

/// Bounds on random bytes per generated secret
pub const MIN_SECRET_BYTES: usize = 16;
pub const MAX_SECRET_BYTES: usize = 1024;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub api_keys: ApiKeysConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string; unset means the command cannot touch storage
    pub url: Option<String>,
    pub max_connections: u32,
}

// Connection strings carry credentials
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Settings for newly issued keys
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiKeysConfig {
    /// Leading marker of every generated secret
    pub secret_prefix: String,
    /// Random bytes per secret, before base64url encoding
    pub secret_bytes: usize,
    /// Requests per minute for keys created without an explicit limit
    pub default_rate_limit: i32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ApiKeysConfig {
    fn default() -> Self {
        Self {
            secret_prefix: "mr-".to_string(),
            secret_bytes: 32,
            default_rate_limit: 60,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings that would produce unusable keys
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.api_keys.secret_prefix.is_ascii() {
            return Err(DomainError::configuration(
                "api_keys.secret_prefix must be ASCII",
            ));
        }

        let secret_bytes = self.api_keys.secret_bytes;
        if !(MIN_SECRET_BYTES..=MAX_SECRET_BYTES).contains(&secret_bytes) {
            return Err(DomainError::configuration(format!(
                "api_keys.secret_bytes must be between {} and {}, got {}",
                MIN_SECRET_BYTES, MAX_SECRET_BYTES, secret_bytes
            )));
        }

        // base64url without padding: 4 chars per 3 bytes, rounded up
        let encoded_len = (secret_bytes * 4).div_ceil(3);
        if self.api_keys.secret_prefix.len() + encoded_len < KEY_PREFIX_LEN {
            return Err(DomainError::configuration(
                "api_keys.secret_bytes yields secrets shorter than the display prefix",
            ));
        }

        if self.api_keys.default_rate_limit < 0 {
            return Err(DomainError::configuration(
                "api_keys.default_rate_limit must not be negative",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(DomainError::configuration(
                "database.max_connections must be positive",
            ));
        }

        Ok(())
    }

    /// Database URL, or a configuration error naming the setting
    pub fn database_url(&self) -> Result<&str, DomainError> {
        self.database.url.as_deref().ok_or_else(|| {
            DomainError::configuration("database.url is not set (APP__DATABASE__URL)")
        })
    }
}
