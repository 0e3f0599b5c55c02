//! BigQuery warehouse implementation.
//!
//! Queries go through `jobs.query`; when the job does not finish within the
//! server-side wait the response carries no schema and no rows, and the
//! stream keeps polling `jobs.getQueryResults` until it does. That is the
//! deferred-schema case handled by [`super::run_query`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use google_cloud_bigquery::client::{Client, ClientConfig};
use google_cloud_bigquery::http::job::get::GetJobRequest;
use google_cloud_bigquery::http::job::get_query_results::GetQueryResultsRequest;
use google_cloud_bigquery::http::job::query::QueryRequest;
use google_cloud_bigquery::http::job::JobState;
use google_cloud_bigquery::http::table::{TableFieldSchema, TableSchema};
use google_cloud_bigquery::http::tabledata::list::{Tuple, Value as BqValue};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WarehouseConfig;
use crate::core::schema::{Field, FieldType, Schema};
use crate::core::traits::{RowStream, Warehouse};
use crate::core::value::{Row, WarehouseValue};
use crate::error::{LoadError, Result};

/// BigQuery client bound to one project.
pub struct BigQueryWarehouse {
    client: Arc<Client>,
    project_id: String,
    query_timeout_ms: Option<i64>,
}

impl BigQueryWarehouse {
    /// Authenticate with application default credentials.
    ///
    /// The project comes from configuration, or from the credentials when
    /// configuration leaves it unset.
    pub async fn new(config: &WarehouseConfig) -> Result<Self> {
        let (client_config, detected_project) = ClientConfig::new_with_auth()
            .await
            .map_err(|e| LoadError::Config(format!("failed to find default credentials: {}", e)))?;

        let project_id = match config.project_id.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p.to_string(),
            _ => {
                let detected = detected_project.filter(|p| !p.is_empty()).ok_or_else(|| {
                    LoadError::Config(
                        "GCP_PROJECT_ID is not set and could not be detected from credentials"
                            .into(),
                    )
                })?;
                info!(project_id = %detected, "Detected project ID from credentials");
                detected
            }
        };

        let client = Client::new(client_config).await.map_err(|e| {
            LoadError::Config(format!("failed to create BigQuery client: {}", e))
        })?;

        Ok(Self {
            client: Arc::new(client),
            project_id,
            query_timeout_ms: config.query_timeout_ms,
        })
    }

    fn query_request(&self, sql: &str, location: &str) -> QueryRequest {
        QueryRequest {
            query: sql.to_string(),
            use_legacy_sql: false,
            location: location.to_string(),
            timeout_ms: self.query_timeout_ms,
            request_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        }
    }

    /// Poll a job until it reaches DONE, backing off up to 30s between polls.
    async fn wait_for_job(&self, job_id: &str, location: &str) -> Result<()> {
        let mut interval = Duration::from_secs(1);
        let max_interval = Duration::from_secs(30);
        let mut poll_count = 0u32;

        loop {
            poll_count += 1;
            let request = GetJobRequest {
                location: Some(location.to_string()),
            };
            let job = self
                .client
                .job()
                .get(&self.project_id, job_id, &request)
                .await
                .map_err(|e| {
                    LoadError::QueryExecution(format!("job failed during execution: {}", e))
                })?;

            if job.status.state == JobState::Done {
                if let Some(err) = &job.status.error_result {
                    return Err(LoadError::QueryExecution(format!(
                        "job completed with error: {:?}",
                        err.message
                    )));
                }
                debug!(job_id = %job_id, poll_count, "BigQuery job completed");
                return Ok(());
            }

            if poll_count % 10 == 0 {
                info!(job_id = %job_id, poll_count, "BigQuery job still running");
            }

            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(max_interval);
        }
    }
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn run(&self, query: &str, location: &str) -> Result<Box<dyn RowStream>> {
        let request = self.query_request(query, location);
        let response = self
            .client
            .job()
            .query(&self.project_id, &request)
            .await
            .map_err(|e| {
                LoadError::QueryExecution(format!("failed to execute query on BigQuery: {}", e))
            })?;

        let job_id = response.job_reference.job_id.clone();
        if job_id.is_empty() {
            return Err(LoadError::QueryExecution(
                "query accepted but no job ID returned".into(),
            ));
        }
        info!(
            job_id = %job_id,
            location = %location,
            job_complete = response.job_complete,
            "BigQuery query submitted"
        );

        let schema = response
            .schema
            .as_ref()
            .map(convert_schema)
            .unwrap_or_default();

        let mut stream = BigQueryRowStream {
            client: Arc::clone(&self.client),
            project_id: self.project_id.clone(),
            job_id,
            location: location.to_string(),
            timeout_ms: self.query_timeout_ms,
            schema,
            rows: VecDeque::new(),
            page_token: None,
            job_complete: response.job_complete,
        };
        if response.job_complete {
            stream.page_token = response.page_token;
            stream.rows.extend(response.rows.unwrap_or_default());
        }

        Ok(Box::new(stream))
    }

    async fn run_statement(&self, sql: &str, location: &str) -> Result<String> {
        let request = self.query_request(sql, location);
        let response = self
            .client
            .job()
            .query(&self.project_id, &request)
            .await
            .map_err(|e| LoadError::QueryExecution(format!("failed to start job: {}", e)))?;

        let job_id = response.job_reference.job_id.clone();
        if job_id.is_empty() {
            return Err(LoadError::QueryExecution(
                "statement accepted but no job ID returned".into(),
            ));
        }
        info!(job_id = %job_id, "BigQuery job submitted");

        if !response.job_complete {
            self.wait_for_job(&job_id, location).await?;
        }

        info!(job_id = %job_id, "BigQuery job completed successfully");
        Ok(job_id)
    }
}

/// Result rows of one BigQuery job, fetched page by page.
pub struct BigQueryRowStream {
    client: Arc<Client>,
    project_id: String,
    job_id: String,
    location: String,
    timeout_ms: Option<i64>,
    schema: Schema,
    rows: VecDeque<Tuple>,
    page_token: Option<String>,
    job_complete: bool,
}

impl BigQueryRowStream {
    /// Fetch the next page, or wait for the job if it is still running.
    async fn fetch_page(&mut self) -> Result<()> {
        let request = GetQueryResultsRequest {
            page_token: self.page_token.clone(),
            location: Some(self.location.clone()),
            timeout_ms: self.timeout_ms,
            ..Default::default()
        };

        let response = self
            .client
            .job()
            .get_query_results(&self.project_id, &self.job_id, &request)
            .await
            .map_err(|e| {
                LoadError::QueryExecution(format!("failed to fetch BigQuery rows: {}", e))
            })?;

        if self.schema.is_empty() {
            if let Some(schema) = response.schema.as_ref() {
                self.schema = convert_schema(schema);
                debug!(
                    job_id = %self.job_id,
                    fields = self.schema.len(),
                    "BigQuery schema materialized"
                );
            }
        }

        self.job_complete = response.job_complete;
        if response.job_complete {
            self.page_token = response.page_token;
            self.rows.extend(response.rows.unwrap_or_default());
        }
        Ok(())
    }
}

#[async_trait]
impl RowStream for BigQueryRowStream {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(tuple) = self.rows.pop_front() {
                return Ok(Some(decode_tuple(tuple)));
            }
            if self.job_complete && self.page_token.is_none() {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }
}

/// Convert a BigQuery table schema into the loader's schema.
fn convert_schema(schema: &TableSchema) -> Schema {
    Schema::new(schema.fields.iter().map(convert_field).collect())
}

fn convert_field(field: &TableFieldSchema) -> Field {
    // Enum names go through serde so that types added by newer API versions
    // (GEOGRAPHY, RANGE, ...) still resolve by name.
    let type_name = serde_name(&field.data_type);
    let mode = field.mode.as_ref().map(serde_name).unwrap_or_default();
    let has_subfields = field.fields.as_ref().is_some_and(|f| !f.is_empty());

    Field {
        name: field.name.clone(),
        field_type: FieldType::from_bigquery(&type_name),
        repeated: mode.eq_ignore_ascii_case("REPEATED"),
        nested: has_subfields || matches!(type_name.as_str(), "RECORD" | "STRUCT"),
    }
}

fn serde_name<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_uppercase))
        .unwrap_or_default()
}

fn decode_tuple(tuple: Tuple) -> Row {
    tuple.f.into_iter().map(|cell| decode_value(cell.v)).collect()
}

fn decode_value(value: BqValue) -> WarehouseValue {
    match value {
        BqValue::Null => WarehouseValue::Null,
        BqValue::String(s) => WarehouseValue::Scalar(s),
        BqValue::Array(cells) => {
            WarehouseValue::Repeated(cells.into_iter().map(|c| decode_value(c.v)).collect())
        }
        BqValue::Struct(tuple) => WarehouseValue::Record(decode_tuple(tuple)),
    }
}
