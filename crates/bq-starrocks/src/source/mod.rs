//! Query result sources.
//!
//! Some warehouse drivers leave the result schema empty until the first page
//! of rows has been fetched. [`ReplayStream`] handles that case: it pulls one
//! row ahead to force the schema to materialize and hands that row back
//! before anything else, so no row is lost and row order is preserved.

mod bigquery;

pub use bigquery::{BigQueryRowStream, BigQueryWarehouse};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::cancel::cancellable;
use crate::core::schema::Schema;
use crate::core::traits::{RowStream, Warehouse};
use crate::core::value::Row;
use crate::error::{LoadError, Result};

/// A row stream with a one-row replay buffer.
pub struct ReplayStream {
    inner: Box<dyn RowStream>,
    buffered: Option<Row>,
}

impl ReplayStream {
    pub fn new(inner: Box<dyn RowStream>) -> Self {
        Self {
            inner,
            buffered: None,
        }
    }

    /// Fetch one row ahead without consuming it.
    ///
    /// Returns `None` when the stream is already at end of data.
    pub async fn peek(&mut self) -> Result<Option<&Row>> {
        if self.buffered.is_none() {
            self.buffered = self.inner.next_row().await?;
        }
        Ok(self.buffered.as_ref())
    }

    /// Take the buffered row, if any, so the caller can place it first.
    pub fn take_prefetched(&mut self) -> Option<Row> {
        self.buffered.take()
    }

    /// Whether a peeked row is waiting to be replayed.
    pub fn has_prefetched(&self) -> bool {
        self.buffered.is_some()
    }
}

#[async_trait]
impl RowStream for ReplayStream {
    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.buffered.take() {
            return Ok(Some(row));
        }
        self.inner.next_row().await
    }
}

/// An executed query whose schema is known.
pub struct QueryResult {
    /// Schema snapshot; immutable from here on.
    pub schema: Schema,
    /// Remaining rows. May hold a prefetched row from the schema peek.
    pub stream: ReplayStream,
}

impl QueryResult {
    /// Split into the schema, the prefetched row (if the peek consumed one)
    /// and the rest of the stream.
    pub fn into_parts(mut self) -> (Schema, Option<Row>, ReplayStream) {
        let prefetched = self.stream.take_prefetched();
        (self.schema, prefetched, self.stream)
    }
}

/// Run a query and make sure its schema is describable.
///
/// If the schema is empty right after execution, exactly one row is pulled to
/// force materialization. A query that still has no columns afterwards fails
/// with [`LoadError::SchemaUnavailable`]. A query that returns zero rows keeps
/// the schema obtained from metadata alone.
pub async fn run_query(
    warehouse: &dyn Warehouse,
    query: &str,
    location: &str,
    cancel: &CancellationToken,
) -> Result<QueryResult> {
    let inner = cancellable(cancel, warehouse.run(query, location)).await?;
    let mut stream = ReplayStream::new(inner);

    if stream.schema().is_empty() {
        debug!("Schema not materialized after execution, fetching first row");
        let fetched = cancellable(cancel, async {
            Ok::<_, LoadError>(stream.peek().await?.is_some())
        })
        .await?;
        debug!(
            "Schema peek fetched {} row",
            if fetched { "one" } else { "no" }
        );
    }

    if stream.schema().is_empty() {
        return Err(LoadError::SchemaUnavailable);
    }

    Ok(QueryResult {
        schema: stream.schema().clone(),
        stream,
    })
}
