//! Core traits for the warehouse-to-destination pipeline.
//!
//! - [`Warehouse`]: Executes queries and hands back a one-pass [`RowStream`]
//! - [`RowStream`]: Single-pass, non-restartable producer of result rows
//! - [`Destination`]: DDL, metadata lookups and transactions on the target
//! - [`LoadTransaction`]: One open destination transaction
//! - [`TypeMapper`]: Maps warehouse fields to destination column types
//!
//! The warehouse and destination sides are trait objects so that a load can
//! be driven against in-memory fakes exactly as it is against BigQuery and
//! StarRocks.

use async_trait::async_trait;

use crate::error::Result;
use crate::typemap::ColumnType;

use super::schema::{ExistingColumn, Field, Schema};
use super::value::{Row, SqlValue};

/// Execute SQL against the analytical warehouse.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submit a query pinned to `location` and return its result stream.
    ///
    /// The returned stream's schema may still be empty if the warehouse has
    /// not materialized it yet; see [`crate::source::ReplayStream`].
    async fn run(&self, query: &str, location: &str) -> Result<Box<dyn RowStream>>;

    /// Submit a statement that produces no rows of interest (e.g. `EXPORT DATA`)
    /// and wait for it to finish. Returns the job identifier.
    async fn run_statement(&self, sql: &str, location: &str) -> Result<String>;
}

/// A single-pass stream of result rows paired with exactly one schema.
#[async_trait]
pub trait RowStream: Send {
    /// Current schema. May be empty until the first row has been fetched.
    fn schema(&self) -> &Schema;

    /// Pull the next row; `Ok(None)` signals end of data.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Destination engine operations used by schema reconciliation and loading.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Database used when the caller names only a table.
    fn default_database(&self) -> Option<&str>;

    /// Execute a statement outside of any load transaction (DDL).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Check if a table exists.
    async fn table_exists(&self, database: &str, table: &str) -> Result<bool>;

    /// Existing columns of a table in ordinal order.
    async fn existing_columns(&self, database: &str, table: &str) -> Result<Vec<ExistingColumn>>;

    /// Open a transaction on a dedicated connection.
    async fn begin(&self) -> Result<Box<dyn LoadTransaction>>;

    /// Test the database connection.
    async fn test_connection(&self) -> Result<()>;

    /// Close the connection pool.
    async fn close(&self);
}

/// An open destination transaction.
#[async_trait]
pub trait LoadTransaction: Send {
    /// Execute a parameterized statement; returns affected rows.
    async fn exec(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<u64>;

    /// Commit everything executed on this transaction.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard everything executed on this transaction.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Maps warehouse fields to destination column types.
pub trait TypeMapper: Send + Sync {
    /// Map a field. Repeated and nested fields are rejected with
    /// [`crate::LoadError::UnsupportedType`].
    fn map_field(&self, field: &Field) -> Result<TypeMapping>;
}

/// Result of mapping a field to a destination column type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    /// Target column type.
    pub target_type: ColumnType,
    /// Set when the mapping loses data or precision.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: ColumnType) -> Self {
        Self {
            target_type,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: ColumnType, warning: impl Into<String>) -> Self {
        Self {
            target_type,
            warning: Some(warning.into()),
        }
    }
}
