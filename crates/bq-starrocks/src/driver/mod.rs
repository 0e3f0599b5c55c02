//! Export drivers.
//!
//! A driver turns one [`ExportParams`] request into an [`ExportResult`]:
//!
//! - [`GcsDriver`]: Parquet export to Cloud Storage via `EXPORT DATA`
//! - [`StarRocksDriver`]: Row load into a StarRocks table
//!
//! [`DriverImpl`] is the closed set of drivers selected by configuration.
//! New destinations are added as a variant plus an [`ExportDriver`] impl.

mod gcs;
mod starrocks;

pub use gcs::{build_export_uri, GcsDriver};
pub use starrocks::StarRocksDriver;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{parse_flag, Config, DriverKind};
use crate::core::traits::Warehouse;
use crate::error::{LoadError, Result};
use crate::target::StarRocksDestination;

/// One export or load request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportParams {
    /// Warehouse SQL.
    pub query: String,

    /// Warehouse execution location (e.g. `US`, `asia-northeast1`).
    pub query_location: String,

    /// Destination `table` or `db.table` (load driver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Database for a bare table name (load driver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// DDL run verbatim instead of create-or-evolve (load driver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_ddl: Option<String>,

    /// `gs://` folder or URI pattern (export driver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// File name prefix (export driver).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Add a timestamp to exported file names.
    #[serde(default)]
    pub use_timestamp: bool,
}

impl ExportParams {
    /// Check the fields every driver needs.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(LoadError::Config("query is required".into()));
        }
        if self.query_location.trim().is_empty() {
            return Err(LoadError::Config("query_location is required".into()));
        }
        Ok(())
    }

    /// Read a job request from `JOB_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read a job request from an environment-style lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let params = Self {
            query: get("JOB_QUERY").unwrap_or_default(),
            query_location: get("JOB_QUERY_LOCATION").unwrap_or_default(),
            table: get("JOB_TABLE"),
            database: get("JOB_DATABASE"),
            create_ddl: get("JOB_CREATE_DDL"),
            output: get("JOB_OUTPUT"),
            filename: get("JOB_FILENAME"),
            use_timestamp: get("JOB_USE_TIMESTAMP")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        };

        if params.query.is_empty() || params.query_location.is_empty() {
            return Err(LoadError::Config(
                "JOB_QUERY or JOB_QUERY_LOCATION is empty".into(),
            ));
        }
        Ok(params)
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportResult {
    /// Files written by the export driver.
    Exported { gcs_path: String },
    /// Rows committed by the load driver.
    Loaded(LoadResult),
}

/// Rows committed into one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    /// `db.table`
    pub table: String,
    pub rows_loaded: i64,
}

/// Executes requests against a warehouse.
#[async_trait]
pub trait ExportDriver: Send + Sync {
    /// Driver name for logs.
    fn name(&self) -> &str;

    async fn execute(
        &self,
        warehouse: &dyn Warehouse,
        params: &ExportParams,
        cancel: &CancellationToken,
    ) -> Result<ExportResult>;

    /// Check connectivity of whatever the driver writes to.
    async fn health_check(&self) -> Result<()>;

    /// Release pooled resources.
    async fn close(&self);
}

/// Enum-based static dispatch over the available drivers.
pub enum DriverImpl {
    Gcs(GcsDriver),
    StarRocks(StarRocksDriver),
}

impl DriverImpl {
    /// Create the configured driver, connecting to the destination if needed.
    pub async fn from_config(config: &Config) -> Result<Self> {
        match config.driver {
            DriverKind::Gcs => Ok(Self::Gcs(GcsDriver::new())),
            DriverKind::Starrocks => {
                let dest = StarRocksDestination::new(config.destination()?).await?;
                Ok(Self::StarRocks(StarRocksDriver::new(
                    Arc::new(dest),
                    &config.load,
                )))
            }
        }
    }
}

#[async_trait]
impl ExportDriver for DriverImpl {
    fn name(&self) -> &str {
        match self {
            Self::Gcs(d) => d.name(),
            Self::StarRocks(d) => d.name(),
        }
    }

    async fn execute(
        &self,
        warehouse: &dyn Warehouse,
        params: &ExportParams,
        cancel: &CancellationToken,
    ) -> Result<ExportResult> {
        match self {
            Self::Gcs(d) => d.execute(warehouse, params, cancel).await,
            Self::StarRocks(d) => d.execute(warehouse, params, cancel).await,
        }
    }

    async fn health_check(&self) -> Result<()> {
        match self {
            Self::Gcs(d) => d.health_check().await,
            Self::StarRocks(d) => d.health_check().await,
        }
    }

    async fn close(&self) {
        match self {
            Self::Gcs(d) => d.close().await,
            Self::StarRocks(d) => d.close().await,
        }
    }
}
