//! API Key infrastructure implementations
//!
//! This module provides secret generation, the in-memory and PostgreSQL
//! repositories, and the lifecycle service built on top of them.

mod generator;
mod postgres_repository;
mod repository;
mod service;

#[cfg(test)]
pub use generator::MockSecretGenerator;
pub use generator::{RandomSecretGenerator, SecretGenerator};
pub use postgres_repository::PostgresApiKeyRepository;
pub use repository::InMemoryApiKeyRepository;
pub use service::ApiKeyService;
