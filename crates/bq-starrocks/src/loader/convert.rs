//! Conversion of warehouse cells into destination-bound values.
//!
//! BigQuery returns every scalar as text. Each cell is interpreted against
//! its field type right before binding. A cell that cannot be represented
//! in its destination column is loaded as NULL with a warning, or fails the
//! load when strict conversion is enabled.

use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::warn;

use crate::core::schema::{Field, FieldType, Schema};
use crate::core::value::{Row, SqlValue, WarehouseValue};
use crate::error::{LoadError, Result};

/// Converts rows of one schema.
#[derive(Debug, Clone, Copy)]
pub struct RowConverter<'a> {
    schema: &'a Schema,
    strict: bool,
}

impl<'a> RowConverter<'a> {
    pub fn new(schema: &'a Schema, strict: bool) -> Self {
        Self { schema, strict }
    }

    /// Convert a row, appending its values to `out` in schema order.
    pub fn convert_into(&self, row: &Row, out: &mut Vec<SqlValue>) -> Result<()> {
        if row.len() != self.schema.len() {
            return Err(LoadError::QueryExecution(format!(
                "row has {} values but the schema has {} fields",
                row.len(),
                self.schema.len()
            )));
        }
        for (field, value) in self.schema.fields.iter().zip(row) {
            out.push(convert_value(field, value, self.strict)?);
        }
        Ok(())
    }
}

/// Convert one cell for `field`.
pub fn convert_value(field: &Field, value: &WarehouseValue, strict: bool) -> Result<SqlValue> {
    let text = match value {
        WarehouseValue::Null => return Ok(SqlValue::Null),
        WarehouseValue::Scalar(s) => s,
        WarehouseValue::Repeated(_) => {
            return unrepresentable(field, "array value has no scalar column type", strict)
        }
        WarehouseValue::Record(_) => {
            return unrepresentable(field, "struct value has no scalar column type", strict)
        }
    };

    match parse_scalar(field.field_type, text) {
        Ok(v) => Ok(v),
        Err(reason) => unrepresentable(field, &reason, strict),
    }
}

fn unrepresentable(field: &Field, reason: &str, strict: bool) -> Result<SqlValue> {
    if strict {
        return Err(LoadError::Conversion {
            column: field.name.clone(),
            message: reason.to_string(),
        });
    }
    warn!(column = %field.name, "{}; loading NULL", reason);
    Ok(SqlValue::Null)
}

fn parse_scalar(field_type: FieldType, s: &str) -> std::result::Result<SqlValue, String> {
    match field_type {
        FieldType::String | FieldType::Geography | FieldType::Time | FieldType::Other => {
            Ok(SqlValue::Text(s.to_string()))
        }
        FieldType::Bytes => BASE64
            .decode(s)
            .map(SqlValue::Bytes)
            .map_err(|e| format!("invalid base64 bytes: {}", e)),
        FieldType::Integer => s
            .parse::<i64>()
            .map(SqlValue::I64)
            .map_err(|_| format!("invalid INTEGER {:?}", s)),
        FieldType::Float => match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(SqlValue::F64(f)),
            Ok(_) => Err(format!("non-finite FLOAT {:?}", s)),
            Err(_) => Err(format!("invalid FLOAT {:?}", s)),
        },
        FieldType::Boolean => match s.to_ascii_lowercase().as_str() {
            "true" => Ok(SqlValue::Bool(true)),
            "false" => Ok(SqlValue::Bool(false)),
            _ => Err(format!("invalid BOOLEAN {:?}", s)),
        },
        FieldType::Timestamp => parse_timestamp(s)
            .map(SqlValue::DateTime)
            .ok_or_else(|| format!("invalid TIMESTAMP {:?}", s)),
        FieldType::DateTime => parse_datetime(s)
            .map(SqlValue::DateTime)
            .ok_or_else(|| format!("invalid DATETIME {:?}", s)),
        FieldType::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(SqlValue::Date)
            .map_err(|_| format!("invalid DATE {:?}", s)),
        FieldType::Numeric => normalize_numeric(s).map(SqlValue::Decimal),
        FieldType::Json => serde_json::from_str::<serde_json::Value>(s)
            .map(|_| SqlValue::Json(s.to_string()))
            .map_err(|e| format!("invalid JSON: {}", e)),
    }
}

/// Integer digits of the DECIMAL(38,9) destination column.
const NUMERIC_INTEGER_DIGITS: i64 = 29;
/// Fractional digits of the DECIMAL(38,9) destination column.
const NUMERIC_SCALE: i64 = 9;

/// Normalize a NUMERIC wire value into plain decimal text for DECIMAL(38,9).
///
/// The check is lexical so every one of the 38 digits survives. Scientific
/// notation is expanded, and leading and trailing zeros are dropped. Values
/// needing more integer or fractional digits than the column has are
/// rejected rather than rounded.
pub fn normalize_numeric(s: &str) -> std::result::Result<String, String> {
    let invalid = || format!("invalid NUMERIC {:?}", s);
    let trimmed = s.trim();

    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(i) => {
            let exp = body[i + 1..].parse::<i32>().map_err(|_| invalid())?;
            (&body[..i], i64::from(exp))
        }
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(invalid());
    }

    // Significant digits with the decimal point `point` places from the left.
    let joined = format!("{}{}", int_part, frac_part);
    let leading = joined.len() - joined.trim_start_matches('0').len();
    let digits = joined.trim_start_matches('0').trim_end_matches('0');
    if digits.is_empty() {
        return Ok("0".to_string());
    }
    let point = int_part.len() as i64 + exponent - leading as i64;
    let len = digits.len() as i64;

    if point > NUMERIC_INTEGER_DIGITS {
        return Err(format!(
            "NUMERIC {:?} needs more than {} integer digits",
            s, NUMERIC_INTEGER_DIGITS
        ));
    }
    if len - point > NUMERIC_SCALE {
        return Err(format!(
            "NUMERIC {:?} needs more than {} fractional digits",
            s, NUMERIC_SCALE
        ));
    }

    let mut out = String::with_capacity(digits.len() + 12);
    if negative {
        out.push('-');
    }
    if point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-point) as usize));
        out.push_str(digits);
    } else if point >= len {
        out.push_str(digits);
        out.extend(std::iter::repeat('0').take((point - len) as usize));
    } else {
        let (int_digits, frac_digits) = digits.split_at(point as usize);
        out.push_str(int_digits);
        out.push('.');
        out.push_str(frac_digits);
    }
    Ok(out)
}

/// Parse a BigQuery TIMESTAMP into a UTC naive datetime.
///
/// The REST API returns epoch seconds as a decimal, often in scientific
/// notation (`1.7040672E9`). RFC 3339 and the `YYYY-MM-DD HH:MM:SS[.f] UTC`
/// form are accepted too.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Some(seconds) = parse_epoch_seconds(s) {
        let micros = (seconds * Decimal::from(1_000_000)).round().to_i64()?;
        return DateTime::<Utc>::from_timestamp_micros(micros).map(|dt| dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    parse_datetime(s.trim_end_matches("UTC").trim_end())
}

fn parse_epoch_seconds(s: &str) -> Option<Decimal> {
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }
    if s.contains(['e', 'E']) {
        Decimal::from_scientific(&s.to_ascii_lowercase()).ok()
    } else {
        Decimal::from_str(s).ok()
    }
}

/// Parse a BigQuery DATETIME (`YYYY-MM-DD[T| ]HH:MM:SS[.ffffff]`).
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}
