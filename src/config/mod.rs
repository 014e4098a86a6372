//! Application configuration

mod app_config;

pub use app_config::{ApiKeysConfig, AppConfig, DatabaseConfig, LogFormat, LoggingConfig};
