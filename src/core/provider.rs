//! Provider abstraction
//!
//! A [`Provider`] opens physical connections for one database engine; the
//! [`ProviderConnection`] it returns runs already-bound commands and applies
//! transaction handles. The connection wrapper never talks to a driver
//! directly, only through these traits.

use super::dialect::Dialect;
use super::error::{DatabaseError, Result};
use super::table::DataTable;
use super::transaction::TransactionHandle;
use super::value::DatabaseValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the command text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    /// Plain SQL
    #[default]
    Text,
    /// Text is the name of a stored procedure
    StoredProcedure,
}

/// A statement ready for a provider: placeholders are already in the
/// provider's dialect and `values` are in bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub text: String,
    /// Parameter name for each entry of `values`
    pub names: Vec<String>,
    pub values: Vec<DatabaseValue>,
    pub command_type: CommandType,
    pub timeout: Option<Duration>,
}

impl Command {
    /// Parameterless text command
    pub fn text(sql: impl Into<String>) -> Self {
        Self {
            text: sql.into(),
            names: Vec::new(),
            values: Vec::new(),
            command_type: CommandType::Text,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Native cancellation of whatever a connection is currently running
pub trait CancelQuery: Send + Sync {
    fn cancel(&self);
}

/// Shareable cancel hook, valid while the physical connection lives
#[derive(Clone)]
pub struct CancelHandle(Arc<dyn CancelQuery>);

impl CancelHandle {
    pub fn new(inner: impl CancelQuery + 'static) -> Self {
        Self(Arc::new(inner))
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CancelHandle")
    }
}

/// Factory for physical connections of one database engine
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider name as used in configuration
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Open a physical connection
    async fn open(&self, connection_string: &str) -> Result<Box<dyn ProviderConnection>>;
}

/// An open physical connection
#[async_trait]
pub trait ProviderConnection: Send {
    /// Start the transaction level described by `tx`
    async fn begin(&mut self, tx: &TransactionHandle) -> Result<()>;

    /// Commit the transaction level described by `tx`
    async fn commit(&mut self, tx: &TransactionHandle) -> Result<()>;

    /// Roll back the transaction level described by `tx`
    async fn rollback(&mut self, tx: &TransactionHandle) -> Result<()>;

    /// Run a statement, returning the number of affected rows
    async fn execute(&mut self, command: &Command) -> Result<u64>;

    /// Run a statement and materialize its result set
    async fn query(&mut self, command: &Command) -> Result<DataTable>;

    /// Hook that interrupts a running statement from another task
    fn cancel_handle(&self) -> CancelHandle;

    /// Release the connection
    async fn close(&mut self) -> Result<()>;
}

/// Providers by name, looked up case-insensitively
#[derive(Default, Clone)]
pub struct ProviderCatalog {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` under its own name
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers
            .insert(provider.name().to_lowercase(), provider);
    }

    /// Register `provider` under an additional name
    pub fn register_alias(&mut self, alias: &str, provider: Arc<dyn Provider>) {
        self.providers.insert(alias.to_lowercase(), provider);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| DatabaseError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for ProviderCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("ProviderCatalog")
            .field("providers", &names)
            .finish()
    }
}
