//! Identifier validation, quoting and destination table resolution.
//!
//! SQL identifiers (database, table and column names) cannot be passed as
//! statement parameters, so every identifier that ends up in generated DDL or
//! DML goes through [`quote_ident`] (databases, tables) or [`quote_column`]:
//! it is validated, then wrapped in backticks with embedded backticks doubled.
//! Column names come from the query result and get the destination's longer
//! column-name limit.

use std::fmt;

use crate::error::{LoadError, Result};

/// Maximum database and table name length.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Maximum column name length accepted by StarRocks.
const MAX_COLUMN_NAME_LENGTH: usize = 1024;

fn check_identifier(name: &str, max_len: usize) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    if name.contains('\0') {
        return Err(format!("Identifier contains null byte: {:?}", name));
    }

    if name.chars().count() > max_len {
        return Err(format!(
            "Identifier exceeds maximum length of {} characters",
            max_len
        ));
    }

    Ok(())
}

/// Validate a database or table name.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than the destination allows.
pub fn validate_identifier(name: &str) -> Result<()> {
    check_identifier(name, MAX_IDENTIFIER_LENGTH)
        .map_err(|reason| LoadError::Config(format!("{}: {:?}", reason, name)))
}

/// Validate a column name coming from the query schema.
///
/// A name the destination cannot hold is reported against the column.
pub fn validate_column_name(name: &str) -> Result<()> {
    check_identifier(name, MAX_COLUMN_NAME_LENGTH)
        .map_err(|reason| LoadError::unsupported(name, reason))
}

fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a database or table name using backticks.
///
/// ```ignore
/// assert_eq!(quote_ident("users")?, "`users`");
/// assert_eq!(quote_ident("table`name")?, "`table``name`");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(quote(name))
}

/// Quote a column name using backticks.
pub fn quote_column(name: &str) -> Result<String> {
    validate_column_name(name)?;
    Ok(quote(name))
}

/// A fully resolved destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

impl TableRef {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Resolve a `table` or `database.table` identifier.
    ///
    /// A bare table name (or one with an empty database part, `.table`) takes
    /// `default_database`. Fails when neither the identifier nor the default
    /// supplies a database, or when the table part is empty.
    pub fn resolve(identifier: &str, default_database: Option<&str>) -> Result<Self> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(LoadError::Config("table name is empty".into()));
        }

        let (database, table) = match identifier.split_once('.') {
            Some((db, tbl)) => (db.trim(), tbl.trim()),
            None => ("", identifier),
        };

        if table.is_empty() {
            return Err(LoadError::Config(format!(
                "table name is empty in {:?}",
                identifier
            )));
        }

        let database = if database.is_empty() {
            default_database
                .map(str::trim)
                .filter(|db| !db.is_empty())
                .ok_or_else(|| {
                    LoadError::Config(
                        "database not specified; provide 'database' or use table in 'db.table' format"
                            .into(),
                    )
                })?
        } else {
            database
        };

        Ok(Self::new(database, table))
    }

    /// Backtick-quoted `` `db`.`table` `` for use in statements.
    pub fn qualified(&self) -> Result<String> {
        Ok(format!(
            "{}.{}",
            quote_ident(&self.database)?,
            quote_ident(&self.table)?
        ))
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}
