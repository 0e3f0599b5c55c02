//! Row load into StarRocks.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{ExportDriver, ExportParams, ExportResult, LoadResult};
use crate::config::LoadConfig;
use crate::core::traits::{Destination, TypeMapper, Warehouse};
use crate::error::Result;
use crate::loader::BatchLoader;
use crate::reconcile::{SchemaReconciler, TableLayout};
use crate::source::run_query;
use crate::typemap::StarRocksTypeMapper;

/// Runs the query, reconciles the destination table and loads every row in
/// one transaction.
pub struct StarRocksDriver {
    dest: Arc<dyn Destination>,
    reconciler: SchemaReconciler,
    loader: BatchLoader,
    default_table: String,
}

impl StarRocksDriver {
    pub fn new(dest: Arc<dyn Destination>, load: &LoadConfig) -> Self {
        Self::with_mapper(dest, Arc::new(StarRocksTypeMapper::new()), load)
    }

    /// Same as [`StarRocksDriver::new`] with a custom type mapper.
    pub fn with_mapper(
        dest: Arc<dyn Destination>,
        mapper: Arc<dyn TypeMapper>,
        load: &LoadConfig,
    ) -> Self {
        let reconciler = SchemaReconciler::new(mapper, TableLayout::from(load))
            .with_strict_schema(load.strict_schema);
        Self {
            dest,
            reconciler,
            loader: BatchLoader::from(load),
            default_table: load.default_table.clone(),
        }
    }

    fn default_database<'a>(&'a self, params: &'a ExportParams) -> Option<&'a str> {
        params
            .database
            .as_deref()
            .map(str::trim)
            .filter(|db| !db.is_empty())
            .or_else(|| self.dest.default_database())
    }
}

#[async_trait]
impl ExportDriver for StarRocksDriver {
    fn name(&self) -> &str {
        "starrocks"
    }

    async fn execute(
        &self,
        warehouse: &dyn Warehouse,
        params: &ExportParams,
        cancel: &CancellationToken,
    ) -> Result<ExportResult> {
        params.validate()?;

        let identifier = params
            .table
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.default_table);
        let table = SchemaReconciler::resolve_table(identifier, self.default_database(params))?;

        info!(
            table = %table,
            location = %params.query_location,
            "Starting StarRocks load"
        );

        let result = run_query(warehouse, &params.query, &params.query_location, cancel).await?;
        let (schema, prefetched, mut stream) = result.into_parts();

        self.reconciler
            .ensure_table(
                self.dest.as_ref(),
                &table,
                &schema,
                params.create_ddl.as_deref(),
            )
            .await?;

        let rows_loaded = self
            .loader
            .load_all(
                self.dest.as_ref(),
                &mut stream,
                &schema,
                &table,
                prefetched,
                cancel,
            )
            .await?;

        info!(table = %table, rows_loaded, "StarRocks load completed");
        Ok(ExportResult::Loaded(LoadResult {
            table: table.to_string(),
            rows_loaded,
        }))
    }

    async fn health_check(&self) -> Result<()> {
        self.dest.test_connection().await
    }

    async fn close(&self) {
        self.dest.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Field, FieldType, Schema};
    use crate::error::LoadError;
    use crate::testing::{rows, CountingTypeMapper, MockDestination, MockWarehouse, ScriptedStream};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", FieldType::Integer),
            Field::new("name", FieldType::String),
        ])
    }

    fn params() -> ExportParams {
        ExportParams {
            query: "SELECT id, name FROM ds.t".into(),
            query_location: "US".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_into_new_default_table() {
        let dest = MockDestination::new().with_default_database("analytics");
        let driver = StarRocksDriver::new(Arc::new(dest.clone()), &LoadConfig::default());
        let warehouse = MockWarehouse::new(ScriptedStream::new(schema(), rows(2500)));

        let result = driver
            .execute(&warehouse, &params(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            result,
            ExportResult::Loaded(LoadResult {
                table: "analytics.export".into(),
                rows_loaded: 2500,
            })
        );
        let executed = dest.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].starts_with("CREATE DATABASE IF NOT EXISTS `analytics`"));
        assert!(executed[1].starts_with("CREATE TABLE IF NOT EXISTS `analytics`.`export`"));
        assert_eq!(dest.attempted().len(), 3);
        assert_eq!(dest.commits(), 1);
        assert_eq!(dest.visible_rows(), 2500);
    }

    #[tokio::test]
    async fn test_request_database_overrides_default() {
        let dest = MockDestination::new().with_default_database("analytics");
        let driver = StarRocksDriver::new(Arc::new(dest.clone()), &LoadConfig::default());
        let warehouse = MockWarehouse::new(ScriptedStream::new(schema(), rows(1)));
        let params = ExportParams {
            table: Some("events".into()),
            database: Some("staging".into()),
            ..params()
        };

        let result = driver
            .execute(&warehouse, &params, &CancellationToken::new())
            .await
            .unwrap();
        let ExportResult::Loaded(loaded) = result else {
            panic!("expected load result");
        };
        assert_eq!(loaded.table, "staging.events");
    }

    #[tokio::test]
    async fn test_explicit_ddl_skips_type_mapping() {
        let dest = MockDestination::new();
        let mapper = Arc::new(CountingTypeMapper::default());
        let driver = StarRocksDriver::with_mapper(
            Arc::new(dest.clone()),
            mapper.clone(),
            &LoadConfig::default(),
        );
        let warehouse = MockWarehouse::new(ScriptedStream::new(schema(), rows(3)));
        let ddl = "CREATE TABLE IF NOT EXISTS raw.events (id BIGINT, name STRING)";
        let params = ExportParams {
            table: Some("raw.events".into()),
            create_ddl: Some(ddl.into()),
            ..params()
        };

        driver
            .execute(&warehouse, &params, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(mapper.calls(), 0);
        assert_eq!(dest.executed().last().map(String::as_str), Some(ddl));
        assert_eq!(dest.visible_rows(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_field_aborts_before_ddl() {
        let dest = MockDestination::new();
        let driver = StarRocksDriver::new(Arc::new(dest.clone()), &LoadConfig::default());
        let schema = Schema::new(vec![
            Field::new("id", FieldType::Integer),
            Field::new("tags", FieldType::String).repeated(),
        ]);
        let warehouse = MockWarehouse::new(ScriptedStream::new(schema, Vec::new()));
        let params = ExportParams {
            table: Some("raw.events".into()),
            ..params()
        };

        let err = driver
            .execute(&warehouse, &params, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::UnsupportedType { ref column, .. } if column == "tags"));
        assert!(dest.executed().is_empty());
        assert!(dest.attempted().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_database_is_config_error() {
        let dest = MockDestination::new();
        let driver = StarRocksDriver::new(Arc::new(dest.clone()), &LoadConfig::default());
        let warehouse = MockWarehouse::new(ScriptedStream::new(schema(), rows(1)));

        let err = driver
            .execute(&warehouse, &params(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Config(_)));
        assert!(warehouse.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_leaves_destination_untouched() {
        let dest = MockDestination::new();
        let driver = StarRocksDriver::new(Arc::new(dest.clone()), &LoadConfig::default());
        let warehouse = MockWarehouse::failing("Syntax error: Unexpected keyword");
        let params = ExportParams {
            table: Some("raw.events".into()),
            ..params()
        };

        let err = driver
            .execute(&warehouse, &params, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::QueryExecution(_)));
        assert!(dest.executed().is_empty());
        assert_eq!(dest.commits(), 0);
    }
}
