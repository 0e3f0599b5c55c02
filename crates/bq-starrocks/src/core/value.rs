//! Row values on both sides of a load.
//!
//! [`WarehouseValue`] is what the warehouse hands back: scalars arrive in
//! their textual wire form and are only interpreted against the field type
//! right before binding. [`SqlValue`] is the typed value bound to a
//! destination statement parameter.

use chrono::{NaiveDate, NaiveDateTime};

/// A single cell of a warehouse result row.
#[derive(Debug, Clone, PartialEq)]
pub enum WarehouseValue {
    Null,
    /// Scalar in its wire representation.
    Scalar(String),
    /// Array value of a REPEATED field.
    Repeated(Vec<WarehouseValue>),
    /// Struct value of a RECORD field, positional.
    Record(Vec<WarehouseValue>),
}

impl WarehouseValue {
    pub fn scalar(s: impl Into<String>) -> Self {
        WarehouseValue::Scalar(s.into())
    }
}

impl From<&str> for WarehouseValue {
    fn from(v: &str) -> Self {
        WarehouseValue::Scalar(v.to_string())
    }
}

impl From<String> for WarehouseValue {
    fn from(v: String) -> Self {
        WarehouseValue::Scalar(v)
    }
}

impl From<i64> for WarehouseValue {
    fn from(v: i64) -> Self {
        WarehouseValue::Scalar(v.to_string())
    }
}

/// One result row, positionally aligned with the query schema.
pub type Row = Vec<WarehouseValue>;

/// Destination-bound SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Fixed-point number as normalized decimal text, bound without rounding.
    Decimal(String),
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    /// JSON document, already validated.
    Json(String),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// Rows accumulated for one multi-row insert.
///
/// Owned by the batch loader for the duration of a single load call and
/// cleared after every flush.
#[derive(Debug)]
pub struct Batch {
    rows: Vec<Row>,
    capacity: usize,
}

impl Batch {
    /// Create an empty batch that is full at `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
