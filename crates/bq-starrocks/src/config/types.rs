//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse (BigQuery) configuration.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Which export driver handles requests.
    #[serde(default)]
    pub driver: DriverKind,

    /// Destination database (StarRocks) configuration. Required by the
    /// `starrocks` driver.
    #[serde(default)]
    pub destination: Option<DestinationConfig>,

    /// Load behavior configuration.
    #[serde(default)]
    pub load: LoadConfig,

    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
}

/// Export driver selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Parquet export to Cloud Storage.
    #[default]
    Gcs,

    /// Row load into a StarRocks table.
    Starrocks,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Gcs => f.write_str("gcs"),
            DriverKind::Starrocks => f.write_str("starrocks"),
        }
    }
}

/// Warehouse (BigQuery) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// GCP project; detected from credentials when unset.
    #[serde(default)]
    pub project_id: Option<String>,

    /// Server-side wait per query and page request (default: 10000).
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: Option<i64>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

/// Destination database (StarRocks) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Frontend host.
    pub host: String,

    /// MySQL-protocol query port (default: 9030).
    #[serde(default = "default_starrocks_port")]
    pub port: u16,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Default database for table identifiers without a `db.` prefix.
    #[serde(default)]
    pub database: Option<String>,

    /// Compute warehouse selected on every connection (default: "default_warehouse").
    #[serde(default = "default_warehouse")]
    pub warehouse: String,

    /// Maximum pooled connections (default: 10).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("warehouse", &self.warehouse)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Load behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Rows per multi-row INSERT (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Hash buckets for created tables (default: 8).
    #[serde(default = "default_buckets")]
    pub buckets: u32,

    /// Replicas for created tables (default: 1).
    #[serde(default = "default_replication_num")]
    pub replication_num: u32,

    /// Table used when a request names none (default: "export").
    #[serde(default = "default_table")]
    pub default_table: String,

    /// Fail the load on unrepresentable values instead of writing NULL.
    #[serde(default)]
    pub strict_conversion: bool,

    /// Fail the load when an existing column's type differs from the mapped type.
    #[serde(default)]
    pub strict_schema: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            buckets: default_buckets(),
            replication_num: default_replication_num(),
            default_table: default_table(),
            strict_conversion: false,
            strict_schema: false,
        }
    }
}

/// HTTP server configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port (default: 8080).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Required `X-API-Key` value; no auth when unset.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            api_key: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// Default value functions for serde
fn default_query_timeout_ms() -> Option<i64> {
    Some(10_000)
}

fn default_starrocks_port() -> u16 {
    9030
}

pub(crate) fn default_warehouse() -> String {
    "default_warehouse".to_string()
}

pub(crate) fn default_max_connections() -> usize {
    10
}

pub(crate) fn default_batch_size() -> usize {
    1000
}

fn default_buckets() -> u32 {
    8
}

fn default_replication_num() -> u32 {
    1
}

fn default_table() -> String {
    "export".to_string()
}

pub(crate) fn default_server_port() -> u16 {
    8080
}
