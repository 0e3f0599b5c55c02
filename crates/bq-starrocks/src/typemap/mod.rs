//! Type mapping between BigQuery and StarRocks.

use std::fmt;

use crate::core::schema::{Field, FieldType};
use crate::core::traits::{TypeMapper, TypeMapping};
use crate::error::{LoadError, Result};

/// Width of generic text columns.
pub const TEXT_WIDTH: u32 = 1024;
/// Width of binary columns.
pub const BINARY_WIDTH: u32 = 1024;
/// Width of TIME-as-text columns.
pub const TIME_WIDTH: u32 = 64;
/// Width of GEOGRAPHY (WKT) columns.
pub const GEOGRAPHY_WIDTH: u32 = 2048;

/// A StarRocks column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Varchar(u32),
    Varbinary(u32),
    BigInt,
    Double,
    Boolean,
    DateTime,
    Date,
    Decimal { precision: u8, scale: u8 },
    Json,
}

impl ColumnType {
    /// Base type name as reported in `information_schema.columns.data_type`.
    pub fn base_name(&self) -> &'static str {
        match self {
            ColumnType::Varchar(_) => "varchar",
            ColumnType::Varbinary(_) => "varbinary",
            ColumnType::BigInt => "bigint",
            ColumnType::Double => "double",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
            ColumnType::Date => "date",
            ColumnType::Decimal { .. } => "decimal",
            ColumnType::Json => "json",
        }
    }

    /// Whether an existing column's `data_type` is compatible with this type.
    ///
    /// Only the base type is compared; widths are not. StarRocks reports
    /// DECIMAL(38,9) as `decimal128` and BOOLEAN as `tinyint` on some
    /// versions, both are accepted.
    pub fn matches_data_type(&self, data_type: &str) -> bool {
        let existing = data_type.trim().to_lowercase();
        let base = existing.split('(').next().unwrap_or_default().trim();
        match self {
            ColumnType::Varchar(_) => matches!(base, "varchar" | "char" | "string"),
            ColumnType::Varbinary(_) => matches!(base, "varbinary" | "binary"),
            ColumnType::Decimal { .. } => base.starts_with("decimal"),
            ColumnType::Boolean => matches!(base, "boolean" | "tinyint"),
            other => base == other.base_name(),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Varchar(n) => write!(f, "VARCHAR({})", n),
            ColumnType::Varbinary(n) => write!(f, "VARBINARY({})", n),
            ColumnType::BigInt => f.write_str("BIGINT"),
            ColumnType::Double => f.write_str("DOUBLE"),
            ColumnType::Boolean => f.write_str("BOOLEAN"),
            ColumnType::DateTime => f.write_str("DATETIME"),
            ColumnType::Date => f.write_str("DATE"),
            ColumnType::Decimal { precision, scale } => {
                write!(f, "DECIMAL({},{})", precision, scale)
            }
            ColumnType::Json => f.write_str("JSON"),
        }
    }
}

/// BigQuery to StarRocks type mapper.
#[derive(Debug, Clone, Default)]
pub struct StarRocksTypeMapper;

impl StarRocksTypeMapper {
    pub fn new() -> Self {
        Self
    }
}

impl TypeMapper for StarRocksTypeMapper {
    fn map_field(&self, field: &Field) -> Result<TypeMapping> {
        if field.repeated {
            return Err(LoadError::unsupported(&field.name, "repeated field"));
        }
        if field.nested {
            return Err(LoadError::unsupported(&field.name, "nested field"));
        }
        Ok(bigquery_to_starrocks(field.field_type))
    }
}

/// Map a flat BigQuery field type to StarRocks.
pub fn bigquery_to_starrocks(field_type: FieldType) -> TypeMapping {
    match field_type {
        FieldType::String => TypeMapping::lossless(ColumnType::Varchar(TEXT_WIDTH)),
        FieldType::Bytes => TypeMapping::lossless(ColumnType::Varbinary(BINARY_WIDTH)),
        FieldType::Integer => TypeMapping::lossless(ColumnType::BigInt),
        FieldType::Float => TypeMapping::lossless(ColumnType::Double),
        FieldType::Boolean => TypeMapping::lossless(ColumnType::Boolean),
        FieldType::Timestamp | FieldType::DateTime => TypeMapping::lossless(ColumnType::DateTime),
        FieldType::Date => TypeMapping::lossless(ColumnType::Date),
        FieldType::Time => TypeMapping::lossy(
            ColumnType::Varchar(TIME_WIDTH),
            "TIME stored as text (no time-of-day type in StarRocks)",
        ),
        FieldType::Numeric => TypeMapping::lossless(ColumnType::Decimal {
            precision: 38,
            scale: 9,
        }),
        FieldType::Geography => TypeMapping::lossy(
            ColumnType::Varchar(GEOGRAPHY_WIDTH),
            "GEOGRAPHY stored as WKT text",
        ),
        FieldType::Json => TypeMapping::lossless(ColumnType::Json),
        FieldType::Other => TypeMapping::lossy(
            ColumnType::Varchar(TEXT_WIDTH),
            "unrecognized type stored as text",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(t: FieldType) -> String {
        bigquery_to_starrocks(t).target_type.to_string()
    }

    #[test]
    fn test_scalar_types() {
        assert_eq!(map(FieldType::String), "VARCHAR(1024)");
        assert_eq!(map(FieldType::Bytes), "VARBINARY(1024)");
        assert_eq!(map(FieldType::Integer), "BIGINT");
        assert_eq!(map(FieldType::Float), "DOUBLE");
        assert_eq!(map(FieldType::Boolean), "BOOLEAN");
    }

    #[test]
    fn test_datetime_types() {
        assert_eq!(map(FieldType::Timestamp), "DATETIME");
        assert_eq!(map(FieldType::DateTime), "DATETIME");
        assert_eq!(map(FieldType::Date), "DATE");
        assert_eq!(map(FieldType::Time), "VARCHAR(64)");
    }

    #[test]
    fn test_special_types() {
        assert_eq!(map(FieldType::Numeric), "DECIMAL(38,9)");
        assert_eq!(map(FieldType::Geography), "VARCHAR(2048)");
        assert_eq!(map(FieldType::Json), "JSON");
    }

    #[test]
    fn test_unknown_type_falls_back_to_text() {
        let mapping = bigquery_to_starrocks(FieldType::Other);
        assert_eq!(mapping.target_type, ColumnType::Varchar(1024));
        assert!(mapping.warning.is_some());
    }

    #[test]
    fn test_complex_fields_rejected_regardless_of_type() {
        let mapper = StarRocksTypeMapper::new();
        for t in [FieldType::String, FieldType::Integer, FieldType::Other] {
            let err = mapper
                .map_field(&Field::new("tags", t).repeated())
                .unwrap_err();
            assert!(matches!(err, LoadError::UnsupportedType { ref column, .. } if column == "tags"));

            let err = mapper
                .map_field(&Field::new("addr", t).nested())
                .unwrap_err();
            assert!(matches!(err, LoadError::UnsupportedType { ref column, .. } if column == "addr"));
        }
    }

    #[test]
    fn test_matches_data_type() {
        assert!(ColumnType::Varchar(1024).matches_data_type("varchar"));
        assert!(ColumnType::Varchar(1024).matches_data_type("VARCHAR(65533)"));
        assert!(ColumnType::BigInt.matches_data_type("bigint"));
        assert!(!ColumnType::BigInt.matches_data_type("varchar"));
        assert!(ColumnType::Decimal { precision: 38, scale: 9 }.matches_data_type("decimal128"));
        assert!(ColumnType::Boolean.matches_data_type("tinyint"));
        assert!(ColumnType::Json.matches_data_type("json"));
    }
}
