//! Source schema and destination table metadata.
//!
//! A [`Schema`] is discovered from the warehouse query result and never
//! changes afterwards; its field order defines positional correspondence with
//! row values. Destination metadata ([`ExistingColumn`]) is read back from the
//! destination's `information_schema`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical type of a warehouse result field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    String,
    Bytes,
    Integer,
    Float,
    Boolean,
    Timestamp,
    DateTime,
    Date,
    Time,
    Numeric,
    Geography,
    Json,
    /// Anything the loader has no dedicated handling for (INTERVAL, RANGE, ...).
    Other,
}

impl FieldType {
    /// Parse a BigQuery type name (`INT64`, `FLOAT64`, `STRUCT`, ...).
    ///
    /// Record types parse as [`FieldType::Other`]; nesting is tracked on the
    /// [`Field`] itself.
    pub fn from_bigquery(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "STRING" => FieldType::String,
            "BYTES" => FieldType::Bytes,
            "INTEGER" | "INT64" => FieldType::Integer,
            "FLOAT" | "FLOAT64" => FieldType::Float,
            "BOOLEAN" | "BOOL" => FieldType::Boolean,
            "TIMESTAMP" => FieldType::Timestamp,
            "DATETIME" => FieldType::DateTime,
            "DATE" => FieldType::Date,
            "TIME" => FieldType::Time,
            "NUMERIC" | "DECIMAL" | "BIGNUMERIC" | "BIGDECIMAL" => FieldType::Numeric,
            "GEOGRAPHY" => FieldType::Geography,
            "JSON" => FieldType::Json,
            _ => FieldType::Other,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "STRING",
            FieldType::Bytes => "BYTES",
            FieldType::Integer => "INTEGER",
            FieldType::Float => "FLOAT",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::DateTime => "DATETIME",
            FieldType::Date => "DATE",
            FieldType::Time => "TIME",
            FieldType::Numeric => "NUMERIC",
            FieldType::Geography => "GEOGRAPHY",
            FieldType::Json => "JSON",
            FieldType::Other => "OTHER",
        };
        f.write_str(name)
    }
}

/// A single field of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field name (unique within a schema).
    pub name: String,

    /// Logical type.
    pub field_type: FieldType,

    /// Mode REPEATED (array) in the warehouse.
    #[serde(default)]
    pub repeated: bool,

    /// RECORD/STRUCT with sub-fields.
    #[serde(default)]
    pub nested: bool,
}

impl Field {
    /// Create a flat, non-repeated field.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            repeated: false,
            nested: false,
        }
    }

    /// Mark the field as repeated.
    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Mark the field as a nested record.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }
}

/// Ordered sequence of fields describing a query result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The first field, used as the duplicate/distribution key on table creation.
    pub fn key_field(&self) -> Option<&Field> {
        self.fields.first()
    }
}

/// A column that already exists in the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingColumn {
    /// Column name as stored by the destination.
    pub name: String,

    /// Destination `data_type` (e.g. "varchar", "bigint").
    pub data_type: String,
}

impl ExistingColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bigquery_aliases() {
        assert_eq!(FieldType::from_bigquery("INT64"), FieldType::Integer);
        assert_eq!(FieldType::from_bigquery("integer"), FieldType::Integer);
        assert_eq!(FieldType::from_bigquery("FLOAT64"), FieldType::Float);
        assert_eq!(FieldType::from_bigquery("BOOL"), FieldType::Boolean);
        assert_eq!(FieldType::from_bigquery("BIGNUMERIC"), FieldType::Numeric);
        assert_eq!(FieldType::from_bigquery("INTERVAL"), FieldType::Other);
    }

    #[test]
    fn test_field_builders_set_flags() {
        let id = Field::new("id", FieldType::Integer);
        assert!(!id.repeated && !id.nested);
        assert!(Field::new("tags", FieldType::String).repeated().repeated);
        assert!(Field::new("addr", FieldType::Other).nested().nested);
    }

    #[test]
    fn test_schema_key_field_is_first() {
        let schema = Schema::new(vec![
            Field::new("user_id", FieldType::Integer),
            Field::new("name", FieldType::String),
        ]);
        assert_eq!(schema.key_field().map(|f| f.name.as_str()), Some("user_id"));
        assert!(Schema::default().key_field().is_none());
    }
}
