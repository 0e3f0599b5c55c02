//! Configuration loading and validation.
//!
//! Configuration is read either from a YAML file or from the process
//! environment, and is then passed explicitly into every constructor.

mod types;
mod validation;

pub use types::*;

use std::path::Path;

use tracing::warn;

use crate::error::{LoadError, Result};

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            LoadError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an environment-style lookup.
    ///
    /// Recognized keys: `GCP_PROJECT_ID`, `EXPORT_DRIVER`, `STARROCKS_HOST`,
    /// `STARROCKS_PORT`, `STARROCKS_USER`, `STARROCKS_PASSWORD`,
    /// `STARROCKS_DB`, `STARROCKS_WAREHOUSE`, `STARROCKS_BATCH_SIZE`,
    /// `STARROCKS_MAX_CONNECTIONS`, `STARROCKS_STRICT_CONVERSION`,
    /// `STARROCKS_STRICT_SCHEMA`, `PORT` and `API_KEY`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let driver = match get("EXPORT_DRIVER") {
            Some(d) if d.eq_ignore_ascii_case("starrocks") => DriverKind::Starrocks,
            _ => DriverKind::Gcs,
        };

        let mut config = Config {
            driver,
            ..Default::default()
        };
        config.warehouse.project_id = get("GCP_PROJECT_ID");

        if driver == DriverKind::Starrocks || get("STARROCKS_HOST").is_some() {
            let host = get("STARROCKS_HOST").unwrap_or_default();
            let user = get("STARROCKS_USER").unwrap_or_default();
            if host.is_empty() || user.is_empty() {
                return Err(LoadError::Config(
                    "missing StarRocks env: require STARROCKS_HOST, STARROCKS_USER".into(),
                ));
            }
            let port = match get("STARROCKS_PORT") {
                Some(p) => p.parse::<u16>().map_err(|_| {
                    LoadError::Config(format!("STARROCKS_PORT is not a valid port: {}", p))
                })?,
                None => 9030,
            };

            config.destination = Some(DestinationConfig {
                host,
                port,
                user,
                password: lookup("STARROCKS_PASSWORD").unwrap_or_default(),
                database: get("STARROCKS_DB"),
                warehouse: get("STARROCKS_WAREHOUSE").unwrap_or_else(default_warehouse),
                max_connections: positive_or(
                    "STARROCKS_MAX_CONNECTIONS",
                    get("STARROCKS_MAX_CONNECTIONS"),
                    default_max_connections(),
                ),
            });
        }

        config.load.batch_size = positive_or(
            "STARROCKS_BATCH_SIZE",
            get("STARROCKS_BATCH_SIZE"),
            default_batch_size(),
        );
        config.load.strict_conversion = get("STARROCKS_STRICT_CONVERSION")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        config.load.strict_schema = get("STARROCKS_STRICT_SCHEMA")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);

        config.server.port = match get("PORT") {
            Some(p) => p
                .parse::<u16>()
                .map_err(|_| LoadError::Config(format!("PORT is not a valid port: {}", p)))?,
            None => default_server_port(),
        };
        config.server.api_key = get("API_KEY");

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Destination configuration, required by the load driver.
    pub fn destination(&self) -> Result<&DestinationConfig> {
        self.destination.as_ref().ok_or_else(|| {
            LoadError::Config("destination is not configured".into())
        })
    }
}

/// Parse a boolean flag the way job environments spell it.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn positive_or(key: &str, value: Option<String>, default: usize) -> usize {
    match value {
        None => default,
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => n,
            _ => {
                warn!("{} is not a positive integer ({}), using {}", key, v, default);
                default
            }
        },
    }
}
