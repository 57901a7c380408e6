//! # rust_db_support
//!
//! Database support library for line-of-business applications.
//!
//! ## Features
//!
//! - **Connection wrapper**: lazily opened connection with a nested
//!   transaction stack; every call outside a transaction releases the
//!   connection before it returns
//! - **Named parameters**: SQL is written with `@name` placeholders and
//!   rendered for the provider's dialect
//! - **Connection registry**: application keys mapped to shared wrappers
//! - **WHERE-clause builder**: filters built from optional search fields
//! - **Query runner**: templated queries run inline or on a background task,
//!   with abort and completion events
//! - **Providers**: SQLite (default feature `sqlite`) and PostgreSQL
//!   (feature `postgres`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_db_support::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = ConnectionRegistry::new(Arc::new(builtin_providers()));
//!     let orders = registry.add_connection("ORDERS", "sqlite", "orders.db", None)?;
//!
//!     let mut conn = orders.lock().await;
//!     conn.transaction_begin().await?;
//!     conn.run_sql(
//!         "UPDATE orders SET status = @status WHERE id = @id",
//!         vec![Parameter::new("status", "SHIPPED"), Parameter::new("id", 42)],
//!     )
//!     .await?;
//!     conn.transaction_commit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Building a filter
//!
//! ```rust
//! use rust_db_support::prelude::*;
//!
//! let clause = ClauseBuilder::new()
//!     .eq(Conjunction::Where, "o.status", "status", "OPEN")
//!     .like(Conjunction::And, "o.customer", "customer", "ACME*")
//!     .in_values(Conjunction::And, "o.region", "region", "")
//!     .build(Dialect::Oracle);
//!
//! assert_eq!(clause.sql, "WHERE o.status = @status AND o.customer LIKE @customer");
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/        # value types, provider boundary, connection, registry,
//! │                # clause builder, runner, config, email
//! ├── backends/    # SQLite and PostgreSQL providers
//! ├── scan/        # Scan Verifier
//! └── bin/         # scan_verifier console utility
//! ```

/// Core types and services
pub mod core;

/// Database provider implementations
pub mod backends;

/// AP/JE scan verification
pub mod scan;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backends::builtin_providers;
    pub use crate::core::{
        ClauseBuilder, CommandType, Conjunction, ConnectionRegistry, Credentials, DataRow,
        DataTable, DatabaseError, DatabaseValue, DateRange, DbConnection, Dialect, FromRow,
        IsolationLevel, MaxNoRequest, Parameter, QueryRunner, QueryTemplate, Result, RunStatus,
        WhereClause,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteProvider;

    #[cfg(feature = "postgres")]
    pub use crate::backends::PostgresProvider;
}

// Re-export at root level for convenience
pub use core::{DatabaseError, DatabaseValue, DbConnection, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let catalog = builtin_providers();
        assert_eq!(catalog.is_empty(), !cfg!(any(feature = "sqlite", feature = "postgres")));
        assert_eq!(Dialect::from_provider_name("System.Data.SQLite"), Dialect::Sqlite);
    }

    #[test]
    fn test_value_conversions() {
        use prelude::*;

        let val: DatabaseValue = 42.into();
        assert_eq!(val.as_int(), Some(42));

        let val: DatabaseValue = "test".into();
        assert_eq!(val.as_string(), "test");

        let val: DatabaseValue = true.into();
        assert_eq!(val.as_bool(), Some(true));
    }
}
