//! Transaction handles
//!
//! The connection wrapper keeps a stack of [`TransactionHandle`]s. The
//! outermost handle maps to a real `BEGIN`/`COMMIT`/`ROLLBACK`; every nested
//! handle maps to a savepoint named after its depth.

use super::dialect::Dialect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One level of the transaction stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle {
    depth: usize,
    isolation: IsolationLevel,
}

impl TransactionHandle {
    /// Handle for stack depth `depth` (1 = outermost)
    pub fn new(depth: usize, isolation: IsolationLevel) -> Self {
        Self {
            depth: depth.max(1),
            isolation,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    pub fn savepoint_name(&self) -> String {
        format!("sp_{}", self.depth)
    }

    /// Statement opening this level
    pub fn begin_sql(&self, dialect: Dialect) -> String {
        if !self.is_outermost() {
            return match dialect {
                Dialect::SqlServer => format!("SAVE TRANSACTION {}", self.savepoint_name()),
                _ => format!("SAVEPOINT {}", self.savepoint_name()),
            };
        }
        match dialect {
            Dialect::Sqlite => match self.isolation {
                IsolationLevel::Serializable => "BEGIN IMMEDIATE".to_string(),
                _ => "BEGIN DEFERRED".to_string(),
            },
            Dialect::Postgres => format!("BEGIN ISOLATION LEVEL {}", self.isolation.as_sql()),
            Dialect::SqlServer => format!(
                "SET TRANSACTION ISOLATION LEVEL {}; BEGIN TRANSACTION",
                self.isolation.as_sql()
            ),
            Dialect::Oracle | Dialect::OleDb => {
                format!("SET TRANSACTION ISOLATION LEVEL {}", self.isolation.as_sql())
            }
        }
    }

    /// Statement making this level's work permanent (or folding it into the
    /// enclosing level)
    pub fn commit_sql(&self, dialect: Dialect) -> String {
        if self.is_outermost() {
            return "COMMIT".to_string();
        }
        match dialect {
            // SQL Server has no savepoint release; the save point simply lapses
            Dialect::SqlServer => String::new(),
            _ => format!("RELEASE SAVEPOINT {}", self.savepoint_name()),
        }
    }

    /// Statement discarding this level's work
    pub fn rollback_sql(&self, dialect: Dialect) -> String {
        if self.is_outermost() {
            return "ROLLBACK".to_string();
        }
        match dialect {
            Dialect::SqlServer => format!("ROLLBACK TRANSACTION {}", self.savepoint_name()),
            Dialect::Oracle => format!("ROLLBACK TO SAVEPOINT {}", self.savepoint_name()),
            _ => format!(
                "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
                self.savepoint_name()
            ),
        }
    }
}
