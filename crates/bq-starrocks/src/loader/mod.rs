//! Transactional batch loading.
//!
//! [`BatchLoader::load_all`] drains a row stream into bounded batches and
//! writes each batch as one parameterized multi-row INSERT. Every batch of a
//! call runs inside a single transaction, committed only after the stream is
//! exhausted. Any failure or cancellation rolls back the whole call, including
//! batches already flushed.

mod convert;

pub use convert::{convert_value, parse_datetime, parse_timestamp, RowConverter};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::LoadConfig;
use crate::core::cancel::cancellable;
use crate::core::identifier::{quote_column, TableRef};
use crate::core::schema::Schema;
use crate::core::traits::{Destination, LoadTransaction, RowStream};
use crate::core::value::{Batch, Row, SqlValue};
use crate::error::{LoadError, Result};
use crate::target::clamp_batch_size;

/// Default rows per INSERT.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Loads query results into one destination table.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    batch_size: usize,
    strict_conversion: bool,
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl From<&LoadConfig> for BatchLoader {
    fn from(config: &LoadConfig) -> Self {
        Self::new(config.batch_size).with_strict_conversion(config.strict_conversion)
    }
}

impl BatchLoader {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            strict_conversion: false,
        }
    }

    /// Fail on unrepresentable values instead of loading NULL.
    pub fn with_strict_conversion(mut self, strict: bool) -> Self {
        self.strict_conversion = strict;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Load every row of `stream` into `table` and return the row count.
    ///
    /// `prefetched` is a row already pulled from `stream` (the schema peek)
    /// and is loaded first. The result is all-or-nothing: on any error no
    /// row of this call stays visible.
    pub async fn load_all(
        &self,
        dest: &dyn Destination,
        stream: &mut dyn RowStream,
        schema: &Schema,
        table: &TableRef,
        prefetched: Option<Row>,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        if schema.is_empty() {
            return Err(LoadError::SchemaUnavailable);
        }

        let insert = InsertTemplate::new(table, schema)?;
        let capacity = clamp_batch_size(self.batch_size, schema.len());
        let converter = RowConverter::new(schema, self.strict_conversion);

        let mut tx = cancellable(cancel, dest.begin()).await?;

        let drained = self
            .drain(
                tx.as_mut(),
                stream,
                &insert,
                converter,
                capacity,
                prefetched,
                cancel,
            )
            .await;

        match drained {
            Ok((total, statements)) => {
                // A cancelled commit drops the transaction, which rolls it back.
                cancellable(cancel, tx.commit()).await?;
                info!(
                    table = %table,
                    rows = total,
                    statements,
                    "Committed load"
                );
                Ok(total)
            }
            Err(e) => {
                match tx.rollback().await {
                    Ok(()) => info!(table = %table, "Rolled back load: {}", e),
                    Err(rb) => warn!(table = %table, "Rollback failed after {}: {}", e, rb),
                }
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drain(
        &self,
        tx: &mut dyn LoadTransaction,
        stream: &mut dyn RowStream,
        insert: &InsertTemplate,
        converter: RowConverter<'_>,
        capacity: usize,
        prefetched: Option<Row>,
        cancel: &CancellationToken,
    ) -> Result<(i64, usize)> {
        let mut batch = Batch::with_capacity(capacity);
        let mut total = 0i64;
        let mut statements = 0usize;

        if let Some(row) = prefetched {
            batch.push(row);
        }

        loop {
            if batch.is_full() {
                total += flush(tx, insert, converter, &mut batch, cancel).await?;
                statements += 1;
            }
            match cancellable(cancel, stream.next_row()).await? {
                Some(row) => batch.push(row),
                None => break,
            }
        }

        if !batch.is_empty() {
            total += flush(tx, insert, converter, &mut batch, cancel).await?;
            statements += 1;
        }

        Ok((total, statements))
    }
}

async fn flush(
    tx: &mut dyn LoadTransaction,
    insert: &InsertTemplate,
    converter: RowConverter<'_>,
    batch: &mut Batch,
    cancel: &CancellationToken,
) -> Result<i64> {
    let (sql, params) = insert.build(batch.rows(), converter)?;
    cancellable(cancel, tx.exec(&sql, params)).await?;

    let rows = batch.len() as i64;
    debug!("Flushed batch of {} rows", rows);
    batch.clear();
    Ok(rows)
}

/// `INSERT INTO <table> (<cols>) VALUES` prefix and per-row placeholder group.
#[derive(Debug, Clone)]
pub struct InsertTemplate {
    prefix: String,
    row_placeholders: String,
}

impl InsertTemplate {
    /// Column order follows the schema exactly.
    pub fn new(table: &TableRef, schema: &Schema) -> Result<Self> {
        let columns = schema
            .fields
            .iter()
            .map(|f| quote_column(&f.name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefix: format!(
                "INSERT INTO {} ({}) VALUES ",
                table.qualified()?,
                columns.join(", ")
            ),
            row_placeholders: format!("({})", vec!["?"; columns.len()].join(", ")),
        })
    }

    /// Build one statement covering `rows`, with their converted parameters.
    pub fn build(&self, rows: &[Row], converter: RowConverter<'_>) -> Result<(String, Vec<SqlValue>)> {
        let groups = vec![self.row_placeholders.as_str(); rows.len()];
        let sql = format!("{}{}", self.prefix, groups.join(", "));

        let mut params = Vec::with_capacity(rows.first().map_or(0, |r| r.len()) * rows.len());
        for row in rows {
            converter.convert_into(row, &mut params)?;
        }
        Ok((sql, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::{Field, FieldType};
    use crate::core::value::WarehouseValue;
    use crate::source::run_query;
    use crate::testing::{rows, MockDestination, MockWarehouse, ScriptedStream};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", FieldType::Integer),
            Field::new("name", FieldType::String),
        ])
    }

    fn table() -> TableRef {
        TableRef::new("analytics", "events")
    }

    fn committed_ids(dest: &MockDestination) -> Vec<i64> {
        dest.committed()
            .iter()
            .flat_map(|(_, params)| params.iter().step_by(2).cloned().collect::<Vec<_>>())
            .map(|v| match v {
                SqlValue::I64(i) => i,
                other => panic!("unexpected id {other:?}"),
            })
            .collect()
    }

    async fn load(
        loader: &BatchLoader,
        dest: &MockDestination,
        stream: ScriptedStream,
        cancel: &CancellationToken,
    ) -> Result<i64> {
        let mut stream = stream;
        loader
            .load_all(dest, &mut stream, &schema(), &table(), None, cancel)
            .await
    }

    #[tokio::test]
    async fn test_statement_count_is_ceil_of_rows_over_batch() {
        for batch_size in [1usize, 4, 10] {
            let n = 3 * batch_size + 7;
            let dest = MockDestination::new();
            let loaded = load(
                &BatchLoader::new(batch_size),
                &dest,
                ScriptedStream::new(schema(), rows(n)),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

            assert_eq!(loaded, n as i64);
            assert_eq!(dest.attempted().len(), n.div_ceil(batch_size));
            assert_eq!(dest.visible_rows(), n);
            assert_eq!(dest.commits(), 1);
            assert_eq!(committed_ids(&dest), (1..=n as i64).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_statement() {
        let dest = MockDestination::new();
        let loaded = load(
            &BatchLoader::new(5),
            &dest,
            ScriptedStream::new(schema(), rows(10)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(loaded, 10);
        assert_eq!(dest.attempted().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_shape_follows_schema_order() {
        let dest = MockDestination::new();
        load(
            &BatchLoader::new(2),
            &dest,
            ScriptedStream::new(schema(), rows(2)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let (sql, params) = &dest.committed()[0];
        assert_eq!(
            sql,
            "INSERT INTO `analytics`.`events` (`id`, `name`) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(
            params,
            &vec![
                SqlValue::I64(1),
                SqlValue::Text("row-1".into()),
                SqlValue::I64(2),
                SqlValue::Text("row-2".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_peeked_row_loads_first() {
        let warehouse =
            MockWarehouse::new(ScriptedStream::new(schema(), rows(5)).deferred_schema());
        let dest = MockDestination::new();
        let cancel = CancellationToken::new();

        let result = run_query(&warehouse, "SELECT id, name FROM t", "US", &cancel)
            .await
            .unwrap();
        let (schema, prefetched, mut stream) = result.into_parts();
        assert!(prefetched.is_some());

        let loaded = BatchLoader::new(2)
            .load_all(&dest, &mut stream, &schema, &table(), prefetched, &cancel)
            .await
            .unwrap();

        assert_eq!(loaded, 5);
        assert_eq!(committed_ids(&dest), vec![1, 2, 3, 4, 5]);
        assert_eq!(dest.attempted().len(), 3);
    }

    #[tokio::test]
    async fn test_prefetched_row_with_unit_batch() {
        let dest = MockDestination::new();
        let mut stream = ScriptedStream::new(schema(), rows(3)[1..].to_vec());
        let loaded = BatchLoader::new(1)
            .load_all(
                &dest,
                &mut stream,
                &schema(),
                &table(),
                Some(rows(1)[0].clone()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(loaded, 3);
        assert_eq!(dest.attempted().len(), 3);
        assert_eq!(committed_ids(&dest), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_third_batch_rolls_back_everything() {
        let dest = MockDestination::new().failing_insert(3);
        let err = load(
            &BatchLoader::new(5),
            &dest,
            ScriptedStream::new(schema(), rows(20)),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LoadError::Database(_)));
        assert_eq!(dest.attempted().len(), 3);
        assert_eq!(dest.visible_rows(), 0);
        assert_eq!(dest.commits(), 0);
        assert_eq!(dest.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_stream_failure_rolls_back() {
        let dest = MockDestination::new();
        let err = load(
            &BatchLoader::new(2),
            &dest,
            ScriptedStream::new(schema(), rows(6)).failing_at(3, "page fetch failed"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LoadError::QueryExecution(ref m) if m == "page fetch failed"));
        assert_eq!(dest.attempted().len(), 1);
        assert_eq!(dest.visible_rows(), 0);
        assert_eq!(dest.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_pulls_and_rolls_back() {
        let dest = MockDestination::new();
        let cancel = CancellationToken::new();
        let err = load(
            &BatchLoader::new(5),
            &dest,
            ScriptedStream::new(schema(), rows(20)).cancel_after(7, cancel.clone()),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LoadError::Cancelled));
        assert_eq!(dest.attempted().len(), 1);
        assert_eq!(dest.visible_rows(), 0);
        assert_eq!(dest.commits(), 0);
        assert_eq!(dest.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_insert() {
        let cancel = CancellationToken::new();
        let dest = MockDestination::new().stalling_insert(2, cancel.clone());
        let err = load(
            &BatchLoader::new(5),
            &dest,
            ScriptedStream::new(schema(), rows(20)),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LoadError::Cancelled));
        assert_eq!(dest.attempted().len(), 2);
        assert_eq!(dest.visible_rows(), 0);
        assert_eq!(dest.commits(), 0);
        assert_eq!(dest.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_opens_nothing() {
        let dest = MockDestination::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = load(
            &BatchLoader::new(5),
            &dest,
            ScriptedStream::new(schema(), rows(3)),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::Cancelled));
        assert!(dest.attempted().is_empty());
    }

    #[tokio::test]
    async fn test_empty_result_commits_zero_rows() {
        let dest = MockDestination::new();
        let loaded = load(
            &BatchLoader::new(5),
            &dest,
            ScriptedStream::new(schema(), Vec::new()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(loaded, 0);
        assert!(dest.attempted().is_empty());
        assert_eq!(dest.commits(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_value_loads_null_unless_strict() {
        let bad_rows = vec![
            vec![WarehouseValue::from(1), WarehouseValue::from("ok")],
            vec![WarehouseValue::from("not-a-number"), WarehouseValue::from("bad")],
        ];

        let dest = MockDestination::new();
        let loaded = load(
            &BatchLoader::new(10),
            &dest,
            ScriptedStream::new(schema(), bad_rows.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(dest.committed()[0].1[2], SqlValue::Null);

        let dest = MockDestination::new();
        let err = load(
            &BatchLoader::new(10).with_strict_conversion(true),
            &dest,
            ScriptedStream::new(schema(), bad_rows),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LoadError::Conversion { ref column, .. } if column == "id"));
        assert_eq!(dest.visible_rows(), 0);
        assert_eq!(dest.rollbacks(), 1);
    }

    #[test]
    fn test_loader_from_config() {
        let loader = BatchLoader::from(&LoadConfig {
            batch_size: 250,
            strict_conversion: true,
            ..Default::default()
        });
        assert_eq!(loader.batch_size(), 250);
        assert!(loader.strict_conversion);
    }
}
