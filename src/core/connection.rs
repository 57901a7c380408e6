//! Connection wrapper
//!
//! [`DbConnection`] owns at most one physical provider connection, opened on
//! first use, and a LIFO stack of transaction handles. Every data call that
//! runs outside a transaction closes the physical connection again before it
//! returns, on success and on failure alike. Inside a transaction the
//! connection stays open until the outermost level is committed or rolled
//! back.

use super::dialect::Dialect;
use super::error::{DatabaseError, Result};
use super::parameter::Parameter;
use super::placeholder;
use super::provider::{CancelHandle, Command, CommandType, Provider, ProviderConnection};
use super::query_builder::WhereClause;
use super::table::{DataRow, DataTable, FromRow};
use super::transaction::{IsolationLevel, TransactionHandle};
use super::value::DatabaseValue;
use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Replaced by the user name when a connection string is stored
pub const USER_PLACEHOLDER: &str = "<user>";

/// Replaced by the password when a connection string is stored
pub const PASSWORD_PLACEHOLDER: &str = "<pwd>";

/// Default total width of numbers produced by [`DbConnection::get_max_no`]
pub const DEFAULT_MAX_NO_WIDTH: usize = 10;

/// Login details substituted into connection string templates
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: Option<String>,
    pub password: Option<String>,
    /// Application/contract context code
    pub context: Option<String>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("context", &self.context)
            .finish()
    }
}

/// Provider name, resolved connection string and credentials of a wrapper
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    provider_name: String,
    connection_string: String,
    credentials: Credentials,
}

impl ConnectionSettings {
    /// Store `template` with `<user>`/`<pwd>` replaced from `credentials`
    pub fn new(
        provider_name: impl Into<String>,
        template: &str,
        credentials: Option<&Credentials>,
    ) -> Self {
        let credentials = credentials.cloned().unwrap_or_default();
        let mut connection_string = template.to_string();
        if let Some(user) = &credentials.user {
            connection_string = connection_string.replace(USER_PLACEHOLDER, user);
        }
        if let Some(password) = &credentials.password {
            connection_string = connection_string.replace(PASSWORD_PLACEHOLDER, password);
        }
        Self {
            provider_name: provider_name.into(),
            connection_string,
            credentials,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn user(&self) -> Option<&str> {
        self.credentials.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.credentials.password.as_deref()
    }

    pub fn context(&self) -> Option<&str> {
        self.credentials.context.as_deref()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = match self.password() {
            Some(pwd) if !pwd.is_empty() => self.connection_string.replace(pwd, "***"),
            _ => self.connection_string.clone(),
        };
        f.debug_struct("ConnectionSettings")
            .field("provider_name", &self.provider_name)
            .field("connection_string", &shown)
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Arguments of [`DbConnection::get_max_no`]
#[derive(Debug, Clone, PartialEq)]
pub struct MaxNoRequest {
    table: String,
    column: String,
    starts_with: String,
    table_identifier: Option<char>,
    app_identifier: Option<char>,
    width: usize,
    filter: Option<WhereClause>,
}

impl MaxNoRequest {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        starts_with: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            starts_with: starts_with.into(),
            table_identifier: None,
            app_identifier: None,
            width: DEFAULT_MAX_NO_WIDTH,
            filter: None,
        }
    }

    /// Character identifying the table, appended to the prefix
    #[must_use]
    pub fn table_identifier(mut self, id: char) -> Self {
        self.table_identifier = Some(id);
        self
    }

    /// Character identifying the application, appended after the table id
    #[must_use]
    pub fn app_identifier(mut self, id: char) -> Self {
        self.app_identifier = Some(id);
        self
    }

    /// Total width of the generated value, prefix included
    #[must_use]
    pub fn width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Extra filter appended to the `MAX` query, e.g. `AND region = @region`
    #[must_use]
    pub fn filter(mut self, clause: WhereClause) -> Self {
        self.filter = Some(clause);
        self
    }

    pub fn prefix(&self) -> String {
        let mut prefix = self.starts_with.clone();
        prefix.extend(self.table_identifier);
        prefix.extend(self.app_identifier);
        prefix
    }
}

/// Connection wrapper with a nested transaction stack
pub struct DbConnection {
    key: Option<String>,
    provider: Arc<dyn Provider>,
    settings: ConnectionSettings,
    physical: Option<Box<dyn ProviderConnection>>,
    transactions: Vec<TransactionHandle>,
    isolation: IsolationLevel,
    command_timeout: Option<Duration>,
}

impl DbConnection {
    /// Create an unopened wrapper. `<user>`/`<pwd>` in `connection_string`
    /// are replaced from `credentials`.
    pub fn new(
        provider: Arc<dyn Provider>,
        connection_string: &str,
        credentials: Option<&Credentials>,
    ) -> Self {
        let settings = ConnectionSettings::new(provider.name(), connection_string, credentials);
        Self {
            key: None,
            provider,
            settings,
            physical: None,
            transactions: Vec::new(),
            isolation: IsolationLevel::default(),
            command_timeout: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// A fresh, unopened wrapper with the same provider, settings, isolation
    /// level and command timeout
    pub fn detached(&self) -> Self {
        Self {
            key: self.key.clone(),
            provider: Arc::clone(&self.provider),
            settings: self.settings.clone(),
            physical: None,
            transactions: Vec::new(),
            isolation: self.isolation,
            command_timeout: self.command_timeout,
        }
    }

    /// Replace provider and connection string. Takes effect the next time the
    /// physical connection is opened. Returns the stored string.
    pub fn set_connection_string(
        &mut self,
        provider: Arc<dyn Provider>,
        connection_string: &str,
        credentials: Option<&Credentials>,
    ) -> &str {
        self.settings = ConnectionSettings::new(provider.name(), connection_string, credentials);
        self.provider = provider;
        self.settings.connection_string()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn connection_string(&self) -> &str {
        self.settings.connection_string()
    }

    pub fn dialect(&self) -> Dialect {
        self.provider.dialect()
    }

    pub fn is_open(&self) -> bool {
        self.physical.is_some()
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn in_transaction(&self) -> bool {
        !self.transactions.is_empty()
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    /// Change the isolation level used by the next outermost transaction.
    /// Rejected while a transaction is open.
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<()> {
        if self.in_transaction() {
            return Err(DatabaseError::invalid_operation(
                "Isolation level cannot change while a transaction is open",
            ));
        }
        self.isolation = level;
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    pub fn set_command_timeout(&mut self, timeout: Option<Duration>) {
        self.command_timeout = timeout;
    }

    /// Cancel hook of the open physical connection
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.physical.as_ref().map(|c| c.cancel_handle())
    }

    /// Input parameter for a command on this connection
    pub fn parameter(&self, name: &str, value: impl Into<DatabaseValue>) -> Parameter {
        Parameter::new(name, value)
    }

    /// Open the physical connection if it is not open yet
    pub async fn open(&mut self) -> Result<()> {
        if self.physical.is_none() {
            debug!(key = ?self.key, provider = self.provider.name(), "opening connection");
            let conn = self.provider.open(self.settings.connection_string()).await?;
            self.physical = Some(conn);
        }
        Ok(())
    }

    /// Roll back every open transaction, innermost first, then release the
    /// physical connection. The first failure is reported after cleanup.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut conn) = self.physical.take() else {
            self.transactions.clear();
            return Ok(());
        };

        let mut first_error = None;
        while let Some(handle) = self.transactions.pop() {
            if !self.sends_sql(&handle) {
                continue;
            }
            debug!(key = ?self.key, depth = handle.depth(), "rolling back open transaction on close");
            if let Err(e) = conn.rollback(&handle).await {
                warn!(key = ?self.key, error = %e, "rollback during close failed");
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = conn.close().await {
            first_error.get_or_insert(e);
        }
        debug!(key = ?self.key, "connection closed");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether `handle` maps to a statement. Nested levels on a dialect
    /// without savepoints are tracked on the stack only; their work belongs
    /// to the outermost transaction.
    fn sends_sql(&self, handle: &TransactionHandle) -> bool {
        handle.is_outermost() || self.dialect().supports_savepoints()
    }

    fn physical(&mut self) -> Result<&mut Box<dyn ProviderConnection>> {
        self.physical
            .as_mut()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))
    }

    /// Close the connection when no transaction is open, keeping the
    /// command's own error ahead of any close error
    async fn finish<T>(&mut self, result: Result<T>) -> Result<T> {
        if self.in_transaction() {
            return result;
        }
        let closed = self.close().await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!(key = ?self.key, error = %close_err, "close after failed command also failed");
                Err(e)
            }
        }
    }

    // ---------------------------------------------------------------------
    // Transactions
    // ---------------------------------------------------------------------

    /// Open if needed and push a new transaction level
    pub async fn transaction_begin(&mut self) -> Result<()> {
        let depth = self.transactions.len() + 1;
        let handle = TransactionHandle::new(depth, self.isolation);
        let sends_sql = self.sends_sql(&handle);
        if depth > 1 {
            warn!(key = ?self.key, depth, savepoint = sends_sql, "nested transaction started");
        }

        let result = match self.open().await {
            Ok(()) if !sends_sql => Ok(()),
            Ok(()) => match self.physical() {
                Ok(conn) => conn.begin(&handle).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        if result.is_ok() {
            self.transactions.push(handle);
        }
        self.finish(result).await
    }

    /// Commit the current transaction level
    pub async fn transaction_commit(&mut self) -> Result<()> {
        self.end_transaction(true).await
    }

    /// Roll back the current transaction level
    pub async fn transaction_rollback(&mut self) -> Result<()> {
        self.end_transaction(false).await
    }

    /// Begin a transaction only if none is active; returns whether one was
    /// started
    pub async fn transaction_start(&mut self) -> Result<bool> {
        if self.in_transaction() {
            return Ok(false);
        }
        self.transaction_begin().await?;
        Ok(true)
    }

    /// Commit or roll back the current transaction level
    pub async fn transaction_end(&mut self, commit: bool) -> Result<()> {
        self.end_transaction(commit).await
    }

    async fn end_transaction(&mut self, commit: bool) -> Result<()> {
        let verb = if commit { "Commit" } else { "Rollback" };
        if self.physical.is_none() || self.transactions.is_empty() {
            return Err(DatabaseError::invalid_operation(format!(
                "Call to {} without a call to Connect/BeginTransaction",
                verb
            )));
        }

        let result = match self.transactions.pop() {
            Some(handle) if !self.sends_sql(&handle) => Ok(()),
            Some(handle) => match self.physical() {
                Ok(conn) if commit => conn.commit(&handle).await,
                Ok(conn) => conn.rollback(&handle).await,
                Err(e) => Err(e),
            },
            None => Ok(()),
        };
        self.finish(result).await
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    fn prepare(&self, sql: &str, command_type: CommandType, params: &[Parameter]) -> Result<Command> {
        let (text, names, values) = match command_type {
            CommandType::Text => {
                let bound = placeholder::bind(sql, params, self.dialect())?;
                (bound.sql, bound.names, bound.values)
            }
            CommandType::StoredProcedure => {
                let inputs = params.iter().filter(|p| p.is_input());
                let names = inputs.clone().map(|p| p.name().to_string()).collect();
                let values = inputs.map(|p| p.value().clone()).collect();
                (sql.to_string(), names, values)
            }
        };
        Ok(Command {
            text,
            names,
            values,
            command_type,
            timeout: self.command_timeout,
        })
    }

    async fn execute_prepared(&mut self, command: Result<Command>) -> Result<u64> {
        let command = command?;
        self.open().await?;
        self.physical()?.execute(&command).await
    }

    async fn query_prepared(&mut self, command: Result<Command>) -> Result<DataTable> {
        let command = command?;
        self.open().await?;
        self.physical()?.query(&command).await
    }

    /// Execute a SQL statement, returning the affected row count
    pub async fn run_sql(&mut self, sql: &str, params: Vec<Parameter>) -> Result<u64> {
        self.run_command(sql, CommandType::Text, params).await
    }

    /// Execute a statement or stored procedure
    pub async fn run_command(
        &mut self,
        sql: &str,
        command_type: CommandType,
        params: Vec<Parameter>,
    ) -> Result<u64> {
        let command = self.prepare(sql, command_type, &params);
        let result = self.execute_prepared(command).await;
        self.finish(result).await
    }

    /// Materialize the result of a statement
    pub async fn get_data_table(&mut self, sql: &str, params: Vec<Parameter>) -> Result<DataTable> {
        self.query_command(sql, CommandType::Text, params).await
    }

    /// Materialize the result of a statement or stored procedure
    pub async fn query_command(
        &mut self,
        sql: &str,
        command_type: CommandType,
        params: Vec<Parameter>,
    ) -> Result<DataTable> {
        let command = self.prepare(sql, command_type, &params);
        let result = self.query_prepared(command).await;
        self.finish(result).await
    }

    /// Every row of a table
    pub async fn get_table(&mut self, table_name: &str) -> Result<DataTable> {
        self.get_data_table(&format!("SELECT * FROM {}", table_name), Vec::new())
            .await
    }

    /// First column of the first row; `Null` when there are no rows
    pub async fn get_scalar(&mut self, sql: &str, params: Vec<Parameter>) -> Result<DatabaseValue> {
        let table = self.get_data_table(sql, params).await?;
        Ok(table.scalar().cloned().unwrap_or(DatabaseValue::Null))
    }

    /// First row of the result, if any
    pub async fn get_data_row(&mut self, sql: &str, params: Vec<Parameter>) -> Result<Option<DataRow>> {
        let table = self.get_data_table(sql, params).await?;
        Ok(table.into_rows().into_iter().next())
    }

    /// Row of `table_name` whose `key_name` column equals `key_value`
    pub async fn get_data_row_using_key(
        &mut self,
        table_name: &str,
        key_name: &str,
        key_value: impl Into<DatabaseValue>,
    ) -> Result<Option<DataRow>> {
        let sql = format!("SELECT * FROM {0} WHERE {1}=@{1}", table_name, key_name);
        self.get_data_row(&sql, vec![Parameter::new(key_name, key_value)])
            .await
    }

    /// Row of `table_name` matching every key column
    pub async fn get_data_row_using_keys(
        &mut self,
        table_name: &str,
        key_names: &[&str],
        key_values: Vec<DatabaseValue>,
    ) -> Result<Option<DataRow>> {
        if key_names.len() != key_values.len() {
            return Err(DatabaseError::invalid_operation(
                "Number of primary keys does not match number of primary key values",
            ));
        }

        let mut sql = format!("SELECT * FROM {}", table_name);
        let mut params = Vec::with_capacity(key_names.len());
        for (i, (name, value)) in key_names.iter().zip(key_values).enumerate() {
            let keyword = if i == 0 { "WHERE" } else { "AND" };
            sql.push_str(&format!(" {0} {1}=@{1}", keyword, name));
            params.push(Parameter::new(name, value));
        }
        self.get_data_row(&sql, params).await
    }

    /// Map every row of the result through [`FromRow`]. The read runs inside
    /// a transaction that is rolled back afterward when none was open.
    pub async fn get_list<T: FromRow>(&mut self, sql: &str, params: Vec<Parameter>) -> Result<Vec<T>> {
        let started = self.transaction_start().await?;

        let command = self.prepare(sql, CommandType::Text, &params);
        let result = self
            .query_prepared(command)
            .await
            .and_then(|table| table.iter().map(T::from_row).collect::<Result<Vec<T>>>());

        if !started {
            return self.finish(result).await;
        }
        let rolled_back = self.transaction_rollback().await;
        match (result, rolled_back) {
            (Ok(list), Ok(())) => Ok(list),
            (Ok(_), Err(e)) | (Err(e), _) => Err(e),
        }
    }

    /// Next value of a prefixed, zero-padded sequence column.
    ///
    /// Reads `MAX(column)` among values starting with the prefix, increments
    /// its numeric suffix and pads it to the requested width. The read is not
    /// atomic with the caller's insert; callers serialize generation.
    pub async fn get_max_no(&mut self, request: &MaxNoRequest) -> Result<String> {
        let prefix = request.prefix();
        let mut sql = format!(
            "SELECT MAX({0}) FROM {1} WHERE {0} LIKE @PREFIX",
            request.column, request.table
        );
        let mut params = vec![Parameter::new("PREFIX", format!("{}%", prefix))];
        if let Some(filter) = &request.filter {
            if !filter.is_empty() {
                sql.push(' ');
                sql.push_str(&filter.sql);
                params.extend(filter.params.iter().cloned());
            }
        }

        let max = self.get_scalar(&sql, params).await?;
        let current = if max.is_absent() {
            0
        } else {
            let text = max.as_string();
            let suffix = text.get(prefix.len()..).unwrap_or("").trim();
            suffix.parse::<u64>().unwrap_or_else(|_| {
                warn!(value = %text, prefix = %prefix, "non-numeric sequence suffix, restarting at 1");
                0
            })
        };

        let next = current + 1;
        let digits = next.to_string();
        let suffix_len = request.width.saturating_sub(prefix.len());
        if digits.len() > suffix_len {
            return Err(DatabaseError::SequenceExhausted {
                prefix,
                next,
                width: request.width,
            });
        }
        Ok(format!("{}{:0>width$}", prefix, digits, width = suffix_len))
    }

    /// Current date/time according to the database server
    pub async fn get_system_date(&mut self) -> Result<NaiveDateTime> {
        let sql = self.dialect().system_date_sql();
        let value = self.get_scalar(sql, Vec::new()).await?;
        value
            .as_datetime()
            .ok_or_else(|| DatabaseError::type_mismatch("datetime", value.type_name()))
    }

    /// Run the dialect's ping statement
    pub async fn ping(&mut self) -> Result<()> {
        let sql = self.dialect().ping_sql();
        self.get_scalar(sql, Vec::new()).await.map(|_| ())
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("key", &self.key)
            .field("settings", &self.settings)
            .field("open", &self.is_open())
            .field("transactions", &self.transactions.len())
            .field("isolation", &self.isolation)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqliteProvider;
    use tempfile::TempDir;

    fn connection(dir: &TempDir) -> DbConnection {
        let path = dir.path().join("test.db");
        DbConnection::new(
            Arc::new(SqliteProvider::new()),
            &path.to_string_lossy(),
            None,
        )
    }

    async fn seeded(dir: &TempDir) -> Result<DbConnection> {
        let mut conn = connection(dir);
        conn.run_sql(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, code TEXT, name TEXT)",
            Vec::new(),
        )
        .await?;
        for (id, name) in [(1, "alpha"), (2, "beta"), (3, "gamma")] {
            conn.run_sql(
                "INSERT INTO items (id, code, name) VALUES (@id, @code, @name)",
                vec![
                    Parameter::new("id", id),
                    Parameter::new("code", format!("C{}", id)),
                    Parameter::new("name", name),
                ],
            )
            .await?;
        }
        Ok(conn)
    }

    #[test]
    fn test_credentials_are_substituted() {
        let settings = ConnectionSettings::new(
            "oracle",
            "User Id=<user>;Password=<pwd>;Data Source=SCANP",
            Some(&Credentials::new("scan", "secret")),
        );
        assert_eq!(
            settings.connection_string(),
            "User Id=scan;Password=secret;Data Source=SCANP"
        );
        assert!(!format!("{:?}", settings).contains("secret"));
    }

    #[test]
    fn test_max_no_prefix() {
        let request = MaxNoRequest::new("t", "c", "PFX")
            .table_identifier('A')
            .app_identifier('1');
        assert_eq!(request.prefix(), "PFXA1");
    }

    #[tokio::test]
    async fn test_calls_outside_transaction_close_connection() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;
        assert!(!conn.is_open());

        let table = conn.get_table("items").await?;
        assert_eq!(table.len(), 3);
        assert!(!conn.is_open());

        let err = conn.run_sql("SELECT nope FROM missing", Vec::new()).await;
        assert!(err.is_err());
        assert!(!conn.is_open());
        Ok(())
    }

    #[tokio::test]
    async fn test_commit_without_transaction_is_invalid() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = connection(&dir);
        assert!(conn.transaction_commit().await.unwrap_err().is_invalid_operation());
        assert!(conn.transaction_rollback().await.unwrap_err().is_invalid_operation());

        conn.open().await?;
        assert!(conn.transaction_end(true).await.unwrap_err().is_invalid_operation());
        conn.close().await
    }

    #[tokio::test]
    async fn test_nested_transactions_stay_open_until_outermost_ends() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;

        conn.transaction_begin().await?;
        conn.transaction_begin().await?;
        assert_eq!(conn.transaction_count(), 2);
        conn.run_sql("DELETE FROM items WHERE id = @id", vec![Parameter::new("id", 3)])
            .await?;
        conn.transaction_rollback().await?;
        assert!(conn.is_open());

        conn.run_sql("DELETE FROM items WHERE id = @id", vec![Parameter::new("id", 2)])
            .await?;
        conn.transaction_commit().await?;
        assert!(!conn.is_open());
        assert_eq!(conn.transaction_count(), 0);

        assert_eq!(conn.get_table("items").await?.len(), 2);
        Ok(())
    }

    /// Connection for a dialect without savepoints that records what it is
    /// asked to send
    struct RecordingProvider {
        log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    struct RecordingConnection {
        log: Arc<parking_lot::Mutex<Vec<String>>>,
    }

    struct NoCancel;

    impl crate::core::provider::CancelQuery for NoCancel {
        fn cancel(&self) {}
    }

    #[async_trait::async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn dialect(&self) -> Dialect {
            Dialect::OleDb
        }

        async fn open(&self, _connection_string: &str) -> Result<Box<dyn ProviderConnection>> {
            Ok(Box::new(RecordingConnection {
                log: Arc::clone(&self.log),
            }))
        }
    }

    #[async_trait::async_trait]
    impl ProviderConnection for RecordingConnection {
        async fn begin(&mut self, tx: &TransactionHandle) -> Result<()> {
            self.log.lock().push(tx.begin_sql(Dialect::OleDb));
            Ok(())
        }

        async fn commit(&mut self, tx: &TransactionHandle) -> Result<()> {
            self.log.lock().push(tx.commit_sql(Dialect::OleDb));
            Ok(())
        }

        async fn rollback(&mut self, tx: &TransactionHandle) -> Result<()> {
            self.log.lock().push(tx.rollback_sql(Dialect::OleDb));
            Ok(())
        }

        async fn execute(&mut self, command: &Command) -> Result<u64> {
            self.log.lock().push(command.text.clone());
            Ok(1)
        }

        async fn query(&mut self, command: &Command) -> Result<DataTable> {
            self.log.lock().push(command.text.clone());
            Ok(DataTable::empty())
        }

        fn cancel_handle(&self) -> CancelHandle {
            CancelHandle::new(NoCancel)
        }

        async fn close(&mut self) -> Result<()> {
            self.log.lock().push("close".to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_nesting_without_savepoints_is_tracked_only() -> Result<()> {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let provider = RecordingProvider { log: Arc::clone(&log) };
        let mut conn = DbConnection::new(Arc::new(provider), "dsn", None);

        conn.transaction_begin().await?;
        conn.transaction_begin().await?;
        conn.transaction_begin().await?;
        assert_eq!(conn.transaction_count(), 3);
        conn.run_sql("UPDATE t SET a = 1", Vec::new()).await?;
        conn.transaction_rollback().await?;
        conn.transaction_commit().await?;
        assert!(conn.is_open());
        conn.transaction_begin().await?;
        conn.close().await?;

        assert_eq!(
            *log.lock(),
            [
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
                "UPDATE t SET a = 1",
                "ROLLBACK",
                "close",
            ]
        );
        assert_eq!(conn.transaction_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_transaction_start_and_end() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;

        assert!(conn.transaction_start().await?);
        assert!(!conn.transaction_start().await?);
        assert_eq!(conn.transaction_count(), 1);
        conn.transaction_end(false).await?;
        assert!(!conn.is_open());
        Ok(())
    }

    #[tokio::test]
    async fn test_isolation_locked_during_transaction() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;
        conn.set_isolation_level(IsolationLevel::Serializable)?;

        conn.transaction_begin().await?;
        let err = conn
            .set_isolation_level(IsolationLevel::ReadCommitted)
            .unwrap_err();
        assert!(err.is_invalid_operation());
        assert_eq!(conn.isolation_level(), IsolationLevel::Serializable);
        conn.transaction_rollback().await
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transactions() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;

        conn.transaction_begin().await?;
        conn.run_sql("DELETE FROM items", Vec::new()).await?;
        conn.close().await?;
        assert_eq!(conn.transaction_count(), 0);
        assert_eq!(conn.get_table("items").await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_row_lookups() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;

        let row = conn.get_data_row_using_key("items", "id", 2).await?.unwrap();
        assert_eq!(row.try_get("name")?.as_string(), "beta");

        let row = conn
            .get_data_row_using_keys("items", &["id", "code"], vec![3.into(), "C3".into()])
            .await?
            .unwrap();
        assert_eq!(row.try_get("name")?.as_string(), "gamma");

        assert!(conn.get_data_row_using_key("items", "id", 99).await?.is_none());

        let err = conn
            .get_data_row_using_keys("items", &["id", "code"], vec![3.into()])
            .await
            .unwrap_err();
        assert!(err.is_invalid_operation());

        let count = conn.get_scalar("SELECT COUNT(*) FROM items", Vec::new()).await?;
        assert_eq!(count.as_long(), Some(3));
        Ok(())
    }

    struct Item {
        id: i64,
        name: String,
    }

    impl FromRow for Item {
        fn from_row(row: &DataRow) -> Result<Self> {
            Ok(Self {
                id: row.try_get("id")?.as_long().unwrap_or_default(),
                name: row.try_get("name")?.as_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_get_list_rolls_back_its_transaction() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;

        let items: Vec<Item> = conn
            .get_list("SELECT id, name FROM items ORDER BY id", Vec::new())
            .await?;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].id, 1);
        assert_eq!(items[2].name, "gamma");
        assert!(!conn.is_open());
        assert_eq!(conn.transaction_count(), 0);

        conn.transaction_begin().await?;
        let items: Vec<Item> = conn.get_list("SELECT id, name FROM items", Vec::new()).await?;
        assert_eq!(items.len(), 3);
        assert_eq!(conn.transaction_count(), 1);
        conn.transaction_commit().await
    }

    #[tokio::test]
    async fn test_missing_parameter_fails_before_execution() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = seeded(&dir).await?;
        let err = conn
            .run_sql("DELETE FROM items WHERE id = @id", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::MissingParameter(_)));
        assert_eq!(conn.get_table("items").await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_max_no() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = connection(&dir);
        conn.run_sql("CREATE TABLE docs (doc_no TEXT)", Vec::new()).await?;

        let request = MaxNoRequest::new("docs", "doc_no", "PFX")
            .table_identifier('A')
            .app_identifier('1')
            .width(15);
        assert_eq!(conn.get_max_no(&request).await?, "PFXA10000000001");

        conn.run_sql(
            "INSERT INTO docs (doc_no) VALUES (@no)",
            vec![Parameter::new("no", "PFXA10000000005")],
        )
        .await?;
        assert_eq!(conn.get_max_no(&request).await?, "PFXA10000000006");

        let narrow = MaxNoRequest::new("docs", "doc_no", "PFXA1").width(6);
        conn.run_sql(
            "INSERT INTO docs (doc_no) VALUES (@no)",
            vec![Parameter::new("no", "PFXA19")],
        )
        .await?;
        let err = conn.get_max_no(&narrow).await.unwrap_err();
        assert!(matches!(err, DatabaseError::SequenceExhausted { next: 10, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_system_date() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = connection(&dir);
        let now = conn.get_system_date().await?;
        assert!(now.and_utc().timestamp() > 0);
        conn.ping().await
    }
}
