//! StarRocks destination implementation.
//!
//! Uses a bounded mysql_async pool. Every pooled connection selects utf8mb4
//! and the configured compute warehouse when it is opened.

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Transaction, TxOpts};
use tracing::{debug, info};

use crate::config::DestinationConfig;
use crate::core::schema::ExistingColumn;
use crate::core::traits::{Destination, LoadTransaction};
use crate::core::value::SqlValue;
use crate::error::{LoadError, Result};

/// StarRocks destination using mysql_async.
pub struct StarRocksDestination {
    pool: Pool,
    database: Option<String>,
}

impl StarRocksDestination {
    /// Create the pool and verify it with `SELECT 1`.
    pub async fn new(config: &DestinationConfig) -> Result<Self> {
        let constraints = PoolConstraints::new(1, config.max_connections).ok_or_else(|| {
            LoadError::Config(format!(
                "invalid destination.max_connections: {}",
                config.max_connections
            ))
        })?;

        let init = vec![
            // Use utf8mb4 for full Unicode support
            "SET NAMES utf8mb4".to_string(),
            format!("SET warehouse = '{}'", config.warehouse),
        ];

        let database = config
            .database
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(database.clone())
            .user(Some(&config.user))
            .pass(Some(&config.password))
            .init(init)
            .pool_opts(PoolOpts::new().with_constraints(constraints));

        let opts: Opts = builder.into();
        let pool = Pool::new(opts);

        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| LoadError::database("connecting to StarRocks", e))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| LoadError::database("testing StarRocks connection", e))?;
        drop(conn);

        info!(
            "Connected to StarRocks: {}:{} (warehouse {})",
            config.host, config.port, config.warehouse
        );

        Ok(Self { pool, database })
    }

    async fn conn(&self) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| LoadError::database("getting StarRocks connection", e))
    }
}

#[async_trait]
impl Destination for StarRocksDestination {
    fn default_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop(sql)
            .await
            .map_err(|e| LoadError::database("executing DDL", e))?;
        debug!("Executed: {}", sql);
        Ok(())
    }

    async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        let mut conn = self.conn().await?;

        let sql = r#"
            SELECT COUNT(*) as cnt FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;

        let count: Option<i64> = conn
            .exec_first(sql, (database, table))
            .await
            .map_err(|e| LoadError::database("checking table existence", e))?;

        Ok(count.unwrap_or(0) > 0)
    }

    async fn existing_columns(&self, database: &str, table: &str) -> Result<Vec<ExistingColumn>> {
        let mut conn = self.conn().await?;

        let sql = r#"
            SELECT COLUMN_NAME, DATA_TYPE FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String)> = conn
            .exec(sql, (database, table))
            .await
            .map_err(|e| LoadError::database("reading existing columns", e))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ExistingColumn::new(name, data_type))
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn LoadTransaction>> {
        let tx = self
            .pool
            .start_transaction(TxOpts::default())
            .await
            .map_err(|e| LoadError::database("beginning transaction", e))?;
        Ok(Box::new(StarRocksTransaction { tx }))
    }

    async fn test_connection(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| LoadError::database("testing StarRocks connection", e))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// A transaction pinned to one pooled connection.
///
/// Dropping it without commit rolls back on the server.
struct StarRocksTransaction {
    tx: Transaction<'static>,
}

#[async_trait]
impl LoadTransaction for StarRocksTransaction {
    async fn exec(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        let params: Vec<mysql_async::Value> = params.iter().map(sql_value_to_mysql).collect();
        self.tx
            .exec_drop(sql, params)
            .await
            .map_err(|e| LoadError::database("INSERT batch", e))?;
        Ok(self.tx.affected_rows())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| LoadError::database("committing transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| LoadError::database("rolling back transaction", e))
    }
}

/// Convert SqlValue to mysql_async::Value.
fn sql_value_to_mysql(value: &SqlValue) -> mysql_async::Value {
    use mysql_async::Value;

    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Decimal(d) => Value::from(d.as_str()),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            (dt.nanosecond() / 1_000).min(999_999),
        ),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Json(s) => Value::from(s.as_str()),
    }
}
