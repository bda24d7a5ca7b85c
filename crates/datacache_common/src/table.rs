//! Columnar tabular values.
//!
//! A [`Table`] is an ordered list of named, typed columns of equal length.
//! It is the in-memory value produced by decoding a delimited text file and
//! the value persisted in binary cache entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row count by column count of a table.
///
/// Used as a cheap integrity check after encode/decode round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub columns: usize,
}

impl Shape {
    /// Creates a new shape.
    pub fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} rows x {} columns)", self.rows, self.columns)
    }
}

/// Errors raised when constructing a table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    /// Columns have differing lengths.
    #[error("column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumns {
        /// Name of the offending column.
        column: String,
        /// Row count of the first column.
        expected: usize,
        /// Row count of the offending column.
        actual: usize,
    },
}

/// Typed cell storage for a single column. `None` is a null cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnData {
    /// 64-bit signed integers.
    Int(Vec<Option<i64>>),
    /// 64-bit floats.
    Float(Vec<Option<f64>>),
    /// Booleans.
    Bool(Vec<Option<bool>>),
    /// UTF-8 strings.
    Text(Vec<Option<String>>),
}

impl ColumnData {
    /// Number of cells in the column.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    /// Returns `true` if the column has no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the column's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Int(_) => "int",
            ColumnData::Float(_) => "float",
            ColumnData::Bool(_) => "bool",
            ColumnData::Text(_) => "text",
        }
    }

    /// Number of null cells.
    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Float(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Bool(v) => v.iter().filter(|c| c.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column header.
    pub name: String,
    /// Cell values.
    pub data: ColumnData,
}

impl Column {
    /// Creates a column from a name and its data.
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// An ordered collection of equal-length columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Builds a table, rejecting columns of unequal length.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        if let Some(first) = columns.first() {
            let expected = first.data.len();
            for column in &columns[1..] {
                if column.data.len() != expected {
                    return Err(TableError::RaggedColumns {
                        column: column.name.clone(),
                        expected,
                        actual: column.data.len(),
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Returns an empty table with no columns.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows. A table without columns has zero rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Row count by column count.
    pub fn shape(&self) -> Shape {
        Shape::new(self.row_count(), self.column_count())
    }

    /// All columns in order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Consumes the table, returning its columns.
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}
