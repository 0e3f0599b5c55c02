//! # bq-starrocks
//!
//! Move BigQuery query results into StarRocks tables or Parquet files on
//! Cloud Storage.
//!
//! A request names a query and its execution location. The configured
//! driver then either:
//!
//! - **exports** the result as Parquet with `EXPORT DATA` ([`GcsDriver`]), or
//! - **loads** it into StarRocks ([`StarRocksDriver`]): the destination table
//!   is created or evolved from the result schema, and every row is inserted
//!   in batched multi-row `INSERT`s inside one transaction
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bq_starrocks::{BigQueryWarehouse, Config, DriverImpl, ExportDriver, ExportParams};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> bq_starrocks::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let warehouse = Arc::new(BigQueryWarehouse::new(&config.warehouse).await?);
//!     let driver = DriverImpl::from_config(&config).await?;
//!
//!     let params = ExportParams {
//!         query: "SELECT id, name FROM dataset.users".into(),
//!         query_location: "US".into(),
//!         table: Some("analytics.users".into()),
//!         ..Default::default()
//!     };
//!     let result = driver
//!         .execute(warehouse.as_ref(), &params, &CancellationToken::new())
//!         .await?;
//!     println!("{:?}", result);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod driver;
pub mod error;
pub mod loader;
pub mod reconcile;
pub mod source;
pub mod target;
pub mod typemap;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{Config, DestinationConfig, DriverKind, LoadConfig, WarehouseConfig};
pub use driver::{
    DriverImpl, ExportDriver, ExportParams, ExportResult, GcsDriver, LoadResult, StarRocksDriver,
};
pub use error::{LoadError, Result};
pub use loader::BatchLoader;
pub use reconcile::SchemaReconciler;
pub use source::{run_query, BigQueryWarehouse};
pub use target::StarRocksDestination;
pub use typemap::StarRocksTypeMapper;
