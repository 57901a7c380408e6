//! PostgreSQL provider implementation
//!
//! Uses tokio-postgres directly. Statements are raced against the command
//! timeout; on timeout, or when the cancel handle fires, the server is asked to
//! cancel the running statement through the connection's cancel token.
//!
//! Values are encoded for the type the server inferred for each placeholder,
//! so an `Int` can fill a `bigint` column and a null fits any column.

use crate::core::{
    dialect::Dialect,
    error::{DatabaseError, Result},
    provider::{CancelHandle, CancelQuery, Command, CommandType, Provider, ProviderConnection},
    table::DataTable,
    transaction::TransactionHandle,
    value::DatabaseValue,
};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::error::Error;
use std::time::Duration;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, WrongType};
use tokio_postgres::{CancelToken, Client, NoTls, Row};
use tracing::{debug, warn};

/// Default timeout for database operations (30 seconds)
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider name registered in the default catalog
pub const POSTGRES_PROVIDER: &str = "postgres";

type EncodeResult = std::result::Result<IsNull, Box<dyn Error + Sync + Send>>;

/// Opens PostgreSQL connections from libpq-style connection strings
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    name: String,
}

impl PostgresProvider {
    pub fn new() -> Self {
        Self::with_name(POSTGRES_PROVIDER)
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for PostgresProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn open(&self, connection_string: &str) -> Result<Box<dyn ProviderConnection>> {
        let connect = tokio_postgres::connect(connection_string, NoTls);
        let (client, connection) = tokio::time::timeout(DEFAULT_OPERATION_TIMEOUT, connect)
            .await
            .map_err(|_| {
                DatabaseError::connection(format!(
                    "timed out after {}ms connecting to postgres",
                    DEFAULT_OPERATION_TIMEOUT.as_millis()
                ))
            })?
            .map_err(|e| DatabaseError::connection(e.to_string()))?;

        // Spawn the connection handler in the background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection error");
            }
        });

        debug!("postgres connection opened");
        let cancel = client.cancel_token();
        Ok(Box::new(PostgresConnection {
            client: Some(client),
            cancel,
        }))
    }
}

/// A value encoded for the parameter type the server expects
#[derive(Debug)]
struct PgValue<'a>(&'a DatabaseValue);

fn mismatch(value: &DatabaseValue, ty: &Type) -> EncodeResult {
    Err(format!("cannot bind {} value as {}", value.type_name(), ty).into())
}

fn is_text(ty: &Type) -> bool {
    matches!(*ty, Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN)
}

fn encode_integral(value: &DatabaseValue, n: i64, ty: &Type, out: &mut BytesMut) -> EncodeResult {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        Type::BOOL => (n != 0).to_sql(ty, out),
        _ if is_text(ty) => n.to_string().to_sql(ty, out),
        _ => mismatch(value, ty),
    }
}

fn encode_real(value: &DatabaseValue, x: f64, ty: &Type, out: &mut BytesMut) -> EncodeResult {
    match *ty {
        Type::FLOAT4 => (x as f32).to_sql(ty, out),
        Type::FLOAT8 => x.to_sql(ty, out),
        _ if is_text(ty) => x.to_string().to_sql(ty, out),
        _ => mismatch(value, ty),
    }
}

impl ToSql for PgValue<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        let value = self.0;
        match value {
            DatabaseValue::Null => Ok(IsNull::Yes),
            DatabaseValue::Bool(b) if *ty == Type::BOOL => b.to_sql(ty, out),
            DatabaseValue::Bool(b) => encode_integral(value, i64::from(*b), ty, out),
            DatabaseValue::Int(n) => encode_integral(value, i64::from(*n), ty, out),
            DatabaseValue::Long(n) => encode_integral(value, *n, ty, out),
            DatabaseValue::Float(x) => encode_real(value, f64::from(*x), ty, out),
            DatabaseValue::Double(x) => encode_real(value, *x, ty, out),
            DatabaseValue::String(s) if is_text(ty) => s.to_sql(ty, out),
            DatabaseValue::Bytes(b) if *ty == Type::BYTEA => b.to_sql(ty, out),
            DatabaseValue::DateTime(dt) => match *ty {
                Type::TIMESTAMP => dt.to_sql(ty, out),
                Type::TIMESTAMPTZ => Utc.from_utc_datetime(dt).to_sql(ty, out),
                Type::DATE => dt.date().to_sql(ty, out),
                _ if is_text(ty) => dt.to_string().to_sql(ty, out),
                _ => mismatch(value, ty),
            },
            _ => mismatch(value, ty),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::BYTEA
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
        ) || is_text(ty)
    }

    /// Null goes to a column of any type
    fn to_sql_checked(&self, ty: &Type, out: &mut BytesMut) -> EncodeResult {
        if self.0.is_null() {
            return Ok(IsNull::Yes);
        }
        if !Self::accepts(ty) {
            return Err(Box::new(WrongType::new::<Self>(ty.clone())));
        }
        self.to_sql(ty, out)
    }
}

struct PostgresCancel(CancelToken);

impl CancelQuery for PostgresCancel {
    fn cancel(&self) {
        let token = self.0.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = token.cancel_query(NoTls).await {
                    warn!(error = %e, "postgres cancel request failed");
                }
            });
        }
    }
}

/// An open PostgreSQL connection
pub struct PostgresConnection {
    client: Option<Client>,
    cancel: CancelToken,
}

impl PostgresConnection {
    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))
    }

    /// Await `fut`, asking the server to cancel the statement on timeout
    async fn with_timeout<T, F>(&self, timeout: Option<Duration>, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, tokio_postgres::Error>>,
    {
        let limit = timeout.unwrap_or(DEFAULT_OPERATION_TIMEOUT);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(map_error),
            Err(_) => {
                PostgresCancel(self.cancel.clone()).cancel();
                Err(DatabaseError::query_timeout(limit.as_millis() as u64))
            }
        }
    }

    fn statement_text(command: &Command) -> String {
        match command.command_type {
            CommandType::Text => command.text.clone(),
            CommandType::StoredProcedure => {
                let args: Vec<String> = (1..=command.values.len())
                    .map(|i| format!("${}", i))
                    .collect();
                format!("CALL {}({})", command.text, args.join(", "))
            }
        }
    }

    fn read<'a, T, F>(row: &'a Row, idx: usize, wrap: F) -> DatabaseValue
    where
        T: FromSql<'a>,
        F: FnOnce(T) -> DatabaseValue,
    {
        row.try_get::<_, Option<T>>(idx)
            .ok()
            .flatten()
            .map(wrap)
            .unwrap_or(DatabaseValue::Null)
    }

    fn row_values(row: &Row) -> Vec<DatabaseValue> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, column)| match column.type_().name() {
                "bool" => Self::read(row, idx, DatabaseValue::Bool),
                "int2" => Self::read(row, idx, |v: i16| DatabaseValue::Int(i32::from(v))),
                "int4" => Self::read(row, idx, DatabaseValue::Int),
                "int8" => Self::read(row, idx, DatabaseValue::Long),
                "float4" => Self::read(row, idx, DatabaseValue::Float),
                "float8" => Self::read(row, idx, DatabaseValue::Double),
                "bytea" => Self::read(row, idx, DatabaseValue::Bytes),
                "timestamp" => Self::read(row, idx, |v: NaiveDateTime| DatabaseValue::DateTime(v)),
                "timestamptz" => Self::read(row, idx, |v: chrono::DateTime<Utc>| {
                    DatabaseValue::DateTime(v.naive_utc())
                }),
                "date" => Self::read(row, idx, |v: NaiveDate| DatabaseValue::from(v)),
                _ => Self::read(row, idx, DatabaseValue::String),
            })
            .collect()
    }

    async fn batch(&self, sql: String) -> Result<()> {
        if sql.is_empty() {
            return Ok(());
        }
        let client = self.client()?;
        self.with_timeout(None, client.batch_execute(&sql)).await
    }
}

fn map_error(err: tokio_postgres::Error) -> DatabaseError {
    match err.code() {
        Some(code) if *code == tokio_postgres::error::SqlState::QUERY_CANCELED => {
            DatabaseError::Cancelled
        }
        _ => DatabaseError::PostgresError(err),
    }
}

#[async_trait]
impl ProviderConnection for PostgresConnection {
    async fn begin(&mut self, tx: &TransactionHandle) -> Result<()> {
        self.batch(tx.begin_sql(Dialect::Postgres)).await
    }

    async fn commit(&mut self, tx: &TransactionHandle) -> Result<()> {
        self.batch(tx.commit_sql(Dialect::Postgres)).await
    }

    async fn rollback(&mut self, tx: &TransactionHandle) -> Result<()> {
        self.batch(tx.rollback_sql(Dialect::Postgres)).await
    }

    async fn execute(&mut self, command: &Command) -> Result<u64> {
        let client = self.client()?;
        let sql = Self::statement_text(command);
        let values: Vec<PgValue<'_>> = command.values.iter().map(PgValue).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let statement = self.with_timeout(command.timeout, client.prepare(&sql)).await?;
        self.with_timeout(command.timeout, client.execute(&statement, &param_refs))
            .await
    }

    async fn query(&mut self, command: &Command) -> Result<DataTable> {
        let client = self.client()?;
        let sql = Self::statement_text(command);
        let values: Vec<PgValue<'_>> = command.values.iter().map(PgValue).collect();
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let statement = self.with_timeout(command.timeout, client.prepare(&sql)).await?;
        let rows = self
            .with_timeout(command.timeout, client.query(&statement, &param_refs))
            .await?;

        let mut table = DataTable::new(statement.columns().iter().map(|c| c.name().to_string()));
        for row in &rows {
            table.push_row(Self::row_values(row));
        }
        Ok(table)
    }

    fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(PostgresCancel(self.cancel.clone()))
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the client ends the background connection task
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_procedure_text() {
        let mut command = Command::text("archive_orders");
        command.command_type = CommandType::StoredProcedure;
        command.values = vec![1.into(), "x".into()];
        assert_eq!(
            PostgresConnection::statement_text(&command),
            "CALL archive_orders($1, $2)"
        );
    }

    fn encode(value: DatabaseValue, ty: &Type) -> std::result::Result<(bool, usize), String> {
        let mut out = BytesMut::new();
        PgValue(&value)
            .to_sql_checked(ty, &mut out)
            .map(|is_null| (matches!(is_null, IsNull::Yes), out.len()))
            .map_err(|e| e.to_string())
    }

    #[test]
    fn test_integers_follow_column_width() {
        assert_eq!(encode(DatabaseValue::Int(7), &Type::INT8), Ok((false, 8)));
        assert_eq!(encode(DatabaseValue::Long(7), &Type::INT4), Ok((false, 4)));
        assert_eq!(encode(DatabaseValue::Long(7), &Type::INT2), Ok((false, 2)));
        assert!(encode(DatabaseValue::Long(70_000), &Type::INT2).is_err());
        assert_eq!(encode(DatabaseValue::Int(1), &Type::FLOAT8), Ok((false, 8)));
    }

    #[test]
    fn test_null_fits_any_column() {
        for ty in [Type::INT4, Type::INT8, Type::DATE, Type::NUMERIC, Type::JSONB] {
            assert_eq!(encode(DatabaseValue::Null, &ty), Ok((true, 0)));
        }
    }

    #[test]
    fn test_dates_and_text() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap();
        assert_eq!(encode(DatabaseValue::DateTime(dt), &Type::DATE), Ok((false, 4)));
        assert_eq!(encode(DatabaseValue::DateTime(dt), &Type::TIMESTAMPTZ), Ok((false, 8)));
        assert_eq!(encode(DatabaseValue::from("abc"), &Type::VARCHAR), Ok((false, 3)));
        assert!(encode(DatabaseValue::from("abc"), &Type::INT4).is_err());
        assert!(encode(DatabaseValue::Int(1), &Type::NUMERIC).is_err());
    }

    #[test]
    fn test_provider_dialect() {
        let provider = PostgresProvider::new();
        assert_eq!(provider.name(), "postgres");
        assert_eq!(provider.dialect(), Dialect::Postgres);
    }
}
