//! Storage infrastructure - schema management

pub mod migrations;

pub use migrations::{api_key_migrations, Migration, Migrator, PostgresMigrator};
