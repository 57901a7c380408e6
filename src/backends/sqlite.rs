//! SQLite provider implementation
//!
//! Blocking rusqlite calls are offloaded to the blocking thread pool and raced
//! against the command timeout. When the timeout wins, or the cancel handle
//! fires, the statement is interrupted through SQLite's interrupt handle.

use crate::core::{
    dialect::Dialect,
    error::{DatabaseError, Result},
    provider::{CancelHandle, CancelQuery, Command, CommandType, Provider, ProviderConnection},
    table::DataTable,
    transaction::TransactionHandle,
    value::DatabaseValue,
};
use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, InterruptHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Default timeout for database operations (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// How long SQLite waits on a locked database file before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider name registered in the default catalog
pub const SQLITE_PROVIDER: &str = "sqlite";

/// Opens SQLite databases. The connection string is either a bare path or a
/// `Data Source=<path>` pair.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    name: String,
}

impl SqliteProvider {
    pub fn new() -> Self {
        Self::with_name(SQLITE_PROVIDER)
    }

    /// Provider registered under a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Database path from a connection string
    pub fn database_path(connection_string: &str) -> String {
        connection_string
            .split(';')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| {
                let key = key.trim();
                key.eq_ignore_ascii_case("data source") || key.eq_ignore_ascii_case("datasource")
            })
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_else(|| connection_string.trim().to_string())
    }
}

impl Default for SqliteProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for SqliteProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn open(&self, connection_string: &str) -> Result<Box<dyn ProviderConnection>> {
        let path = Self::database_path(connection_string);
        debug!(path = %path, "opening sqlite database");

        // Offload blocking database operations to blocking thread pool with timeout
        let mut task = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
            Ok(conn)
        });

        // Use select! to abort task on timeout, preventing resource leaks
        let conn = tokio::select! {
            result = &mut task => {
                result
                    .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
                    .map_err(|e| DatabaseError::connection(e.to_string()))?
            }
            _ = tokio::time::sleep(DEFAULT_OPERATION_TIMEOUT) => {
                task.abort();
                return Err(DatabaseError::connection(format!(
                    "timed out after {}ms opening sqlite database",
                    DEFAULT_OPERATION_TIMEOUT.as_millis()
                )));
            }
        };

        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Box::new(SqliteConnection {
            connection: Arc::new(Mutex::new(Some(conn))),
            interrupt,
        }))
    }
}

struct SqliteInterrupt(Arc<InterruptHandle>);

impl CancelQuery for SqliteInterrupt {
    fn cancel(&self) {
        self.0.interrupt();
    }
}

/// An open SQLite database
pub struct SqliteConnection {
    connection: Arc<Mutex<Option<Connection>>>,
    interrupt: Arc<InterruptHandle>,
}

impl SqliteConnection {
    /// Run `op` on the blocking pool, interrupting it if `timeout` elapses
    async fn run_blocking<T, F>(&self, timeout: Option<Duration>, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let limit = timeout.unwrap_or(DEFAULT_OPERATION_TIMEOUT);
        let connection_arc = Arc::clone(&self.connection);

        let mut task = tokio::task::spawn_blocking(move || -> Result<T> {
            let connection = connection_arc.blocking_lock();
            let conn = connection
                .as_ref()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;
            op(conn).map_err(map_error)
        });

        tokio::select! {
            result = &mut task => {
                result.map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
            }
            _ = tokio::time::sleep(limit) => {
                self.interrupt.interrupt();
                task.abort();
                Err(DatabaseError::query_timeout(limit.as_millis() as u64))
            }
        }
    }

    fn value_to_sql(value: &DatabaseValue) -> Value {
        match value {
            DatabaseValue::Null => Value::Null,
            DatabaseValue::Bool(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::Int(v) => Value::Integer(i64::from(*v)),
            DatabaseValue::Long(v) => Value::Integer(*v),
            DatabaseValue::Float(v) => Value::Real(f64::from(*v)),
            DatabaseValue::Double(v) => Value::Real(*v),
            DatabaseValue::String(v) => Value::Text(v.clone()),
            DatabaseValue::Bytes(v) => Value::Blob(v.clone()),
            DatabaseValue::DateTime(v) => {
                Value::Text(v.format("%Y-%m-%d %H:%M:%S%.f").to_string())
            }
        }
    }

    fn value_from_sql(value: ValueRef<'_>) -> DatabaseValue {
        match value {
            ValueRef::Null => DatabaseValue::Null,
            ValueRef::Integer(v) => DatabaseValue::Long(v),
            ValueRef::Real(v) => DatabaseValue::Double(v),
            ValueRef::Text(v) => DatabaseValue::String(String::from_utf8_lossy(v).to_string()),
            ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
        }
    }

    async fn batch(&self, sql: String) -> Result<()> {
        if sql.is_empty() {
            return Ok(());
        }
        self.run_blocking(None, move |conn| conn.execute_batch(&sql))
            .await
    }

    fn text_command(command: &Command) -> Result<(String, Vec<Value>)> {
        if command.command_type == CommandType::StoredProcedure {
            return Err(DatabaseError::unsupported(
                "SQLite does not support stored procedures",
            ));
        }
        let values = command.values.iter().map(Self::value_to_sql).collect();
        Ok((command.text.clone(), values))
    }
}

fn map_error(err: rusqlite::Error) -> DatabaseError {
    match err.sqlite_error_code() {
        Some(ErrorCode::OperationInterrupted) => DatabaseError::Cancelled,
        _ => DatabaseError::SqliteError(err),
    }
}

#[async_trait]
impl ProviderConnection for SqliteConnection {
    async fn begin(&mut self, tx: &TransactionHandle) -> Result<()> {
        self.batch(tx.begin_sql(Dialect::Sqlite)).await
    }

    async fn commit(&mut self, tx: &TransactionHandle) -> Result<()> {
        self.batch(tx.commit_sql(Dialect::Sqlite)).await
    }

    async fn rollback(&mut self, tx: &TransactionHandle) -> Result<()> {
        self.batch(tx.rollback_sql(Dialect::Sqlite)).await
    }

    async fn execute(&mut self, command: &Command) -> Result<u64> {
        let (sql, values) = Self::text_command(command)?;
        self.run_blocking(command.timeout, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let affected = stmt.execute(params_from_iter(values.iter()))?;
            Ok(affected as u64)
        })
        .await
    }

    async fn query(&mut self, command: &Command) -> Result<DataTable> {
        let (sql, values) = Self::text_command(command)?;
        self.run_blocking(command.timeout, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let column_count = columns.len();
            let mut table = DataTable::new(columns);

            let mut rows = stmt.query(params_from_iter(values.iter()))?;
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(Self::value_from_sql(row.get_ref(i)?));
                }
                table.push_row(values);
            }
            Ok(table)
        })
        .await
    }

    fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(SqliteInterrupt(Arc::clone(&self.interrupt)))
    }

    async fn close(&mut self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        if let Some(conn) = connection.take() {
            conn.close().map_err(|(_, e)| map_error(e))?;
        }
        Ok(())
    }
}
