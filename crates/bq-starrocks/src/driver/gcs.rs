//! Parquet export to Cloud Storage.

use async_trait::async_trait;
use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ExportDriver, ExportParams, ExportResult};
use crate::core::cancel::cancellable;
use crate::core::traits::Warehouse;
use crate::error::{LoadError, Result};

/// File name prefix when the request names none.
const DEFAULT_FILENAME: &str = "export";

/// Exports query results with BigQuery `EXPORT DATA`.
#[derive(Debug, Clone, Default)]
pub struct GcsDriver;

impl GcsDriver {
    pub fn new() -> Self {
        Self
    }
}

/// Build the export URI.
///
/// - `output` ending in `/` is a folder: `<output><base>[-<ts>]-*.parquet`
/// - `output` with neither a `.parquet` suffix nor a `*` is a folder missing
///   its slash: `<output>/<base>[-<ts>]-*.parquet`
/// - anything else is an explicit pattern and is used as given
pub fn build_export_uri(output: &str, filename: Option<&str>, timestamp: Option<&str>) -> String {
    let base = filename
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FILENAME);
    let stem = match timestamp {
        Some(ts) => format!("{}-{}", base, ts),
        None => base.to_string(),
    };

    if output.ends_with('/') {
        format!("{}{}-*.parquet", output, stem)
    } else if !output.ends_with(".parquet") && !output.contains('*') {
        format!("{}/{}-*.parquet", output, stem)
    } else {
        output.to_string()
    }
}

fn export_statement(uri: &str, query: &str) -> String {
    format!(
        "EXPORT DATA OPTIONS(uri='{}', format='PARQUET', overwrite=true) AS ({})",
        uri, query
    )
}

#[async_trait]
impl ExportDriver for GcsDriver {
    fn name(&self) -> &str {
        "gcs"
    }

    async fn execute(
        &self,
        warehouse: &dyn Warehouse,
        params: &ExportParams,
        cancel: &CancellationToken,
    ) -> Result<ExportResult> {
        params.validate()?;
        let output = params
            .output
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| LoadError::Config("output is required for GCS export".into()))?;

        let timestamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let uri = build_export_uri(
            output,
            params.filename.as_deref(),
            params.use_timestamp.then_some(timestamp.as_str()),
        );
        if uri.contains('\'') {
            return Err(LoadError::Config(format!(
                "output must not contain quotes: {}",
                uri
            )));
        }

        info!(
            output_uri = %output,
            export_uri = %uri,
            use_timestamp = params.use_timestamp,
            "Starting BigQuery export"
        );

        let sql = export_statement(&uri, &params.query);
        let job_id = cancellable(cancel, warehouse.run_statement(&sql, &params.query_location)).await?;

        info!(job_id = %job_id, export_uri = %uri, "Export job completed successfully");
        Ok(ExportResult::Exported { gcs_path: uri })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}
