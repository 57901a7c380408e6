//! Error taxonomy
//!
//! Provider and SQL failures propagate after the connection has been cleaned
//! up; call-sequencing mistakes surface as [`DatabaseError::InvalidOperation`].
//! Nothing in the crate retries.

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// The physical connection could not be opened or is gone
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    /// Call made in the wrong order, e.g. commit without an open transaction
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Unknown connection key: {0}")]
    UnknownConnection(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// SQL references a parameter that was not supplied
    #[error("Missing value for parameter @{0}")]
    MissingParameter(String),

    /// Two supplied parameters answer to the same placeholder
    #[error("Parameter @{0} supplied more than once")]
    DuplicateParameter(String),

    /// The command timeout elapsed; the driver was interrupted
    #[error("Command timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Interrupted through the driver's cancel hook
    #[error("Query cancelled")]
    Cancelled,

    #[error("Cannot read {actual} value as {expected}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Generated sequence number no longer fits the requested width
    #[error("Sequence exhausted for prefix {prefix}: next value {next} exceeds width {width}")]
    SequenceExhausted {
        prefix: String,
        next: u64,
        width: usize,
    },

    /// Configuration file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider or dialect cannot do what was asked
    #[error("Not supported: {0}")]
    UnsupportedOperation(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[cfg(feature = "postgres")]
    #[error("PostgreSQL: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionError(msg.into())
    }

    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Timeout error for a command that ran longer than `timeout_ms`
    pub fn query_timeout(timeout_ms: u64) -> Self {
        Self::QueryTimeout { timeout_ms }
    }

    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Whether the error is a call-sequencing error
    pub fn is_invalid_operation(&self) -> bool {
        matches!(self, Self::InvalidOperation(_))
    }
}
