//! SQL dialect definitions
//!
//! A dialect decides how canonical `@name` placeholders are rendered, how a
//! value is truncated to its day, and which statements read the server clock
//! or ping the server.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a dialect spells bind placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// Bound by name with the given prefix, e.g. `@id` or `:id`
    Named(char),
    /// Bound by position, one `?` per occurrence
    Positional,
    /// Bound by number with the given prefix, e.g. `?1` or `$1`
    Numbered(char),
}

/// SQL dialects understood by the connection wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Dialect {
    /// Microsoft SQL Server (`@name`)
    SqlServer,
    /// Generic OLE DB driver (`?`)
    OleDb,
    /// Oracle (`:name`)
    #[default]
    Oracle,
    /// SQLite (`?N`)
    Sqlite,
    /// PostgreSQL (`$N`)
    Postgres,
}

impl Dialect {
    /// Convert dialect to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::OleDb => "oledb",
            Dialect::Oracle => "oracle",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    /// Infer the dialect from a provider name such as
    /// `System.Data.SqlClient` or `Oracle.DataAccess.Client`.
    ///
    /// Anything unrecognised is treated as Oracle.
    pub fn from_provider_name(provider: &str) -> Self {
        let p = provider.to_ascii_lowercase();
        if p.contains("sqlite") {
            Dialect::Sqlite
        } else if p.contains("postgres") || p.contains("npgsql") {
            Dialect::Postgres
        } else if p.contains("oledb") {
            Dialect::OleDb
        } else if p.contains("sqlclient") || p.contains("sqlserver") || p.contains("mssql") {
            Dialect::SqlServer
        } else {
            Dialect::Oracle
        }
    }

    pub fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Dialect::SqlServer => PlaceholderStyle::Named('@'),
            Dialect::Oracle => PlaceholderStyle::Named(':'),
            Dialect::OleDb => PlaceholderStyle::Positional,
            Dialect::Sqlite => PlaceholderStyle::Numbered('?'),
            Dialect::Postgres => PlaceholderStyle::Numbered('$'),
        }
    }

    /// Statement returning the server's current date/time as one value
    pub fn system_date_sql(&self) -> &'static str {
        match self {
            Dialect::SqlServer => "SELECT GETDATE()",
            Dialect::Oracle | Dialect::OleDb => "SELECT SYSDATE FROM DUAL",
            Dialect::Sqlite => "SELECT datetime('now', 'localtime')",
            Dialect::Postgres => "SELECT LOCALTIMESTAMP",
        }
    }

    /// Cheapest statement that proves the connection works
    pub fn ping_sql(&self) -> &'static str {
        match self {
            Dialect::Oracle | Dialect::OleDb => "SELECT 1 FROM DUAL",
            _ => "SELECT 1",
        }
    }

    /// Wrap `expr` so that it compares by day only
    pub fn truncate_to_day(&self, expr: &str) -> String {
        match self {
            Dialect::Oracle | Dialect::OleDb => format!("TRUNC({})", expr),
            Dialect::SqlServer => format!("CAST(FLOOR(CAST({} AS FLOAT)) AS DATETIME)", expr),
            Dialect::Sqlite => format!("date({})", expr),
            Dialect::Postgres => format!("date_trunc('day', {})", expr),
        }
    }

    /// Whether nested transactions can be emulated with savepoints
    pub fn supports_savepoints(&self) -> bool {
        !matches!(self, Dialect::OleDb)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            "oledb" | "ole" => Ok(Dialect::OleDb),
            "oracle" => Ok(Dialect::Oracle),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            _ => Err(format!("Invalid dialect: '{}'", s)),
        }
    }
}
