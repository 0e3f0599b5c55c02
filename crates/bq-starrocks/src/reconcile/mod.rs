//! Destination table reconciliation.
//!
//! Makes sure the destination database and table exist and can hold every
//! field of a query result, either by creating the table, by adding missing
//! columns, or by running a caller-supplied DDL statement verbatim.
//!
//! Evolution is additive only: columns are never dropped, renamed or retyped.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::LoadConfig;
use crate::core::identifier::{quote_column, quote_ident, validate_column_name, TableRef};
use crate::core::schema::{Field, Schema};
use crate::core::traits::{Destination, TypeMapper, TypeMapping};
use crate::error::{LoadError, Result};
use crate::typemap::ColumnType;

/// Physical layout of tables created by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    /// Hash buckets (default: 8).
    pub buckets: u32,
    /// Data replicas (default: 1).
    pub replication_num: u32,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            buckets: 8,
            replication_num: 1,
        }
    }
}

impl From<&LoadConfig> for TableLayout {
    fn from(config: &LoadConfig) -> Self {
        Self {
            buckets: config.buckets,
            replication_num: config.replication_num,
        }
    }
}

/// Creates or evolves destination tables to fit a query schema.
pub struct SchemaReconciler {
    mapper: Arc<dyn TypeMapper>,
    layout: TableLayout,
    strict_schema: bool,
}

impl SchemaReconciler {
    pub fn new(mapper: Arc<dyn TypeMapper>, layout: TableLayout) -> Self {
        Self {
            mapper,
            layout,
            strict_schema: false,
        }
    }

    /// Fail on type conflicts with existing columns instead of warning.
    pub fn with_strict_schema(mut self, strict: bool) -> Self {
        self.strict_schema = strict;
        self
    }

    /// Resolve `table` or `db.table` against an optional default database.
    pub fn resolve_table(identifier: &str, default_database: Option<&str>) -> Result<TableRef> {
        TableRef::resolve(identifier, default_database)
    }

    /// Create the database if it does not exist.
    pub async fn ensure_database(&self, dest: &dyn Destination, database: &str) -> Result<()> {
        let sql = format!("CREATE DATABASE IF NOT EXISTS {}", quote_ident(database)?);
        dest.execute(&sql).await?;
        debug!("Ensured database '{}'", database);
        Ok(())
    }

    /// Make `table` able to receive rows of `schema`.
    ///
    /// A non-blank `explicit_ddl` is executed as given, with no type mapping
    /// and no validation against `schema`. Otherwise every field is mapped
    /// before any statement runs, so an unsupported field aborts without DDL.
    pub async fn ensure_table(
        &self,
        dest: &dyn Destination,
        table: &TableRef,
        schema: &Schema,
        explicit_ddl: Option<&str>,
    ) -> Result<()> {
        if let Some(ddl) = explicit_ddl.filter(|d| !d.trim().is_empty()) {
            self.ensure_database(dest, &table.database).await?;
            info!(table = %table, "Applying user-provided StarRocks DDL");
            return dest.execute(ddl).await;
        }

        if schema.is_empty() {
            return Err(LoadError::SchemaUnavailable);
        }

        let mappings = schema
            .fields
            .iter()
            .map(|field| self.map_field(field))
            .collect::<Result<Vec<_>>>()?;

        self.ensure_database(dest, &table.database).await?;

        if !dest.table_exists(&table.database, &table.table).await? {
            let ddl = build_create_table(table, schema, &mappings, &self.layout)?;
            info!(table = %table, columns = schema.len(), "Creating StarRocks table");
            dest.execute(&ddl).await?;
            return Ok(());
        }

        self.evolve(dest, table, schema, &mappings).await
    }

    fn map_field(&self, field: &Field) -> Result<TypeMapping> {
        validate_column_name(&field.name)?;
        let mapping = self.mapper.map_field(field)?;
        if let Some(warning) = &mapping.warning {
            debug!(column = %field.name, "{}", warning);
        }
        Ok(mapping)
    }

    /// Add every field missing from the existing table.
    async fn evolve(
        &self,
        dest: &dyn Destination,
        table: &TableRef,
        schema: &Schema,
        mappings: &[TypeMapping],
    ) -> Result<()> {
        let existing: HashMap<String, String> = dest
            .existing_columns(&table.database, &table.table)
            .await?
            .into_iter()
            .map(|c| (c.name.to_lowercase(), c.data_type))
            .collect();

        let mut added = 0usize;
        for (field, mapping) in schema.fields.iter().zip(mappings) {
            match existing.get(&field.name.to_lowercase()) {
                Some(data_type) => {
                    self.check_conflict(table, field, &mapping.target_type, data_type)?;
                }
                None => {
                    let ddl = build_add_column(table, &field.name, &mapping.target_type)?;
                    info!(
                        table = %table,
                        column = %field.name,
                        column_type = %mapping.target_type,
                        "Adding missing StarRocks column"
                    );
                    dest.execute(&ddl).await?;
                    added += 1;
                }
            }
        }

        if added == 0 {
            debug!(table = %table, "Table already has every column");
        }
        Ok(())
    }

    fn check_conflict(
        &self,
        table: &TableRef,
        field: &Field,
        expected: &ColumnType,
        existing: &str,
    ) -> Result<()> {
        if expected.matches_data_type(existing) {
            return Ok(());
        }
        if self.strict_schema {
            return Err(LoadError::SchemaConflict {
                column: field.name.clone(),
                existing: existing.to_string(),
                expected: expected.to_string(),
            });
        }
        warn!(
            table = %table,
            column = %field.name,
            existing = %existing,
            expected = %expected,
            "Existing column type differs from query type; keeping existing column"
        );
        Ok(())
    }
}

/// Build the CREATE TABLE statement for a new table.
///
/// The first field is both the duplicate key and the distribution key.
pub fn build_create_table(
    table: &TableRef,
    schema: &Schema,
    mappings: &[TypeMapping],
    layout: &TableLayout,
) -> Result<String> {
    let key = schema.key_field().ok_or(LoadError::SchemaUnavailable)?;
    let key = quote_column(&key.name)?;

    let columns = schema
        .fields
        .iter()
        .zip(mappings)
        .map(|(field, mapping)| -> Result<String> {
            Ok(format!("{} {}", quote_column(&field.name)?, mapping.target_type))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) ENGINE=OLAP DUPLICATE KEY({}) \
         DISTRIBUTED BY HASH({}) BUCKETS {} PROPERTIES (\"replication_num\"=\"{}\")",
        table.qualified()?,
        columns.join(", "),
        key,
        key,
        layout.buckets,
        layout.replication_num
    ))
}

/// Build an additive ALTER TABLE statement.
pub fn build_add_column(table: &TableRef, column: &str, column_type: &ColumnType) -> Result<String> {
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table.qualified()?,
        quote_column(column)?,
        column_type
    ))
}
