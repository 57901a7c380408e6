//! Materialized result sets
//!
//! A [`DataTable`] keeps the column order reported by the provider and hands
//! out [`DataRow`]s that can be read by position or by (case-insensitive)
//! column name.

use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use std::ops::Index;
use std::sync::Arc;

/// One row of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    columns: Arc<[String]>,
    values: Vec<DatabaseValue>,
}

impl DataRow {
    /// Column position for `name`, ignoring case
    pub fn ordinal(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of the named column
    pub fn get(&self, name: &str) -> Option<&DatabaseValue> {
        self.ordinal(name).and_then(|i| self.values.get(i))
    }

    /// Value of the named column, or `ColumnNotFound`
    pub fn try_get(&self, name: &str) -> Result<&DatabaseValue> {
        self.get(name)
            .ok_or_else(|| DatabaseError::ColumnNotFound(name.to_string()))
    }

    /// Value at a column position
    pub fn get_index(&self, index: usize) -> Option<&DatabaseValue> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row, returning its values in column order
    pub fn into_values(self) -> Vec<DatabaseValue> {
        self.values
    }
}

impl Index<usize> for DataRow {
    type Output = DatabaseValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

/// Rows returned by a query, sharing one column list
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    columns: Arc<[String]>,
    rows: Vec<DataRow>,
}

impl DataTable {
    /// Create an empty table with the given columns
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// A table with no columns and no rows
    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Append a row. Short rows are padded with nulls, long rows truncated.
    pub fn push_row(&mut self, mut values: Vec<DatabaseValue>) {
        values.resize(self.columns.len(), DatabaseValue::Null);
        self.rows.push(DataRow {
            columns: Arc::clone(&self.columns),
            values,
        });
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&DataRow> {
        self.rows.first()
    }

    /// First column of the first row
    pub fn scalar(&self) -> Option<&DatabaseValue> {
        self.rows.first().and_then(|r| r.get_index(0))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataRow> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }
}

impl IntoIterator for DataTable {
    type Item = DataRow;
    type IntoIter = std::vec::IntoIter<DataRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a DataTable {
    type Item = &'a DataRow;
    type IntoIter = std::slice::Iter<'a, DataRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Typed materialization of a row, used by `DbConnection::get_list`
pub trait FromRow: Sized {
    fn from_row(row: &DataRow) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataTable {
        let mut table = DataTable::new(["ID", "Name"]);
        table.push_row(vec![1.into(), "Alice".into()]);
        table.push_row(vec![2.into()]);
        table
    }

    #[test]
    fn test_lookup_by_name_ignores_case() {
        let table = sample();
        let row = table.first().unwrap();
        assert_eq!(row.get("name").unwrap().as_string(), "Alice");
        assert_eq!(row.get("id").unwrap().as_int(), Some(1));
        assert!(row.get("missing").is_none());
        assert!(matches!(
            row.try_get("missing"),
            Err(DatabaseError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = sample();
        assert_eq!(table.len(), 2);
        assert!(table.rows()[1][1].is_null());
    }

    #[test]
    fn test_scalar() {
        assert_eq!(sample().scalar().unwrap().as_int(), Some(1));
        assert!(DataTable::empty().scalar().is_none());
    }
}
