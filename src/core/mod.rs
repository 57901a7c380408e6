//! Core types and services
//!
//! Value conversion, the provider boundary, the connection wrapper with its
//! transaction stack, the connection registry, the WHERE-clause builder and
//! the query runner, plus the configuration and email helpers built around
//! them.

pub mod config;
pub mod connection;
pub mod convert;
pub mod dates;
pub mod dialect;
pub mod email;
pub mod error;
pub mod parameter;
pub mod placeholder;
pub mod provider;
pub mod query_builder;
pub mod registry;
pub mod runner;
pub mod table;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use config::{ConfigSource, ConnectionProfile, EnvSource, JsonFileSource, MapSource, Settings};
pub use connection::{ConnectionSettings, Credentials, DbConnection, MaxNoRequest};
pub use dates::DateRange;
pub use dialect::{Dialect, PlaceholderStyle};
pub use email::{EmailMessage, MailTransport, PickupDirectoryTransport};
pub use error::{DatabaseError, Result};
pub use parameter::{ParamType, Parameter, ParameterDirection};
pub use provider::{
    CancelHandle, CancelQuery, Command, CommandType, Provider, ProviderCatalog, ProviderConnection,
};
pub use query_builder::{ClauseBuilder, Conjunction, Operator, WhereClause};
pub use registry::{ConnectionRegistry, SharedConnection};
pub use runner::{QueryRunner, QueryTemplate, RunStatus, SearchEvent, SearchHandler};
pub use table::{DataRow, DataTable, FromRow};
pub use transaction::{IsolationLevel, TransactionHandle};
pub use value::DatabaseValue;
