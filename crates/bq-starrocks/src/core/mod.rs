//! Core abstractions shared by the warehouse, reconciler, loader and drivers.
//!
//! - [`schema`]: Source fields and destination column metadata
//! - [`value`]: Warehouse cells, destination-bound values and batches
//! - [`identifier`]: Identifier quoting and `db.table` resolution
//! - [`traits`]: Warehouse, row stream, destination and type mapper traits
//! - [`cancel`]: Cancellation of suspension points

pub mod cancel;
pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use cancel::cancellable;
pub use identifier::{quote_ident, TableRef};
pub use schema::{ExistingColumn, Field, FieldType, Schema};
pub use traits::{Destination, LoadTransaction, RowStream, TypeMapper, TypeMapping, Warehouse};
pub use value::{Batch, Row, SqlValue, WarehouseValue};
