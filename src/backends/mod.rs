//! Database provider implementations
//!
//! This module contains concrete implementations of the Provider trait
//! for the supported database engines.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConnection, SqliteProvider};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnection, PostgresProvider};

use crate::core::provider::ProviderCatalog;

/// Catalog holding every provider compiled into this build.
///
/// SQLite answers to `sqlite`, `sqlite3` and `System.Data.SQLite`; PostgreSQL
/// to `postgres`, `postgresql` and `Npgsql`.
#[allow(unused_mut)]
pub fn builtin_providers() -> ProviderCatalog {
    let mut catalog = ProviderCatalog::new();

    #[cfg(feature = "sqlite")]
    {
        let provider: std::sync::Arc<dyn crate::core::provider::Provider> =
            std::sync::Arc::new(SqliteProvider::new());
        catalog.register(std::sync::Arc::clone(&provider));
        catalog.register_alias("sqlite3", std::sync::Arc::clone(&provider));
        catalog.register_alias("System.Data.SQLite", provider);
    }

    #[cfg(feature = "postgres")]
    {
        let provider: std::sync::Arc<dyn crate::core::provider::Provider> =
            std::sync::Arc::new(PostgresProvider::new());
        catalog.register(std::sync::Arc::clone(&provider));
        catalog.register_alias("postgresql", std::sync::Arc::clone(&provider));
        catalog.register_alias("Npgsql", provider);
    }

    catalog
}
