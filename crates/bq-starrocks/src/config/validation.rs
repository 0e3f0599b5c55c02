//! Configuration validation.

use super::{Config, DriverKind};
use crate::error::{LoadError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Destination validation
    match (&config.destination, config.driver) {
        (None, DriverKind::Starrocks) => {
            return Err(LoadError::Config(
                "destination is required when driver is 'starrocks'".into(),
            ));
        }
        (Some(dest), _) => {
            if dest.host.trim().is_empty() {
                return Err(LoadError::Config("destination.host is required".into()));
            }
            if dest.user.trim().is_empty() {
                return Err(LoadError::Config("destination.user is required".into()));
            }
            if dest.warehouse.contains('\'') {
                return Err(LoadError::Config(
                    "destination.warehouse must not contain quotes".into(),
                ));
            }
            if dest.max_connections == 0 {
                return Err(LoadError::Config(
                    "destination.max_connections must be at least 1".into(),
                ));
            }
        }
        (None, DriverKind::Gcs) => {}
    }

    // Load config validation
    if config.load.batch_size == 0 {
        return Err(LoadError::Config(
            "load.batch_size must be at least 1".into(),
        ));
    }
    if config.load.buckets == 0 {
        return Err(LoadError::Config("load.buckets must be at least 1".into()));
    }
    if config.load.replication_num == 0 {
        return Err(LoadError::Config(
            "load.replication_num must be at least 1".into(),
        ));
    }
    if config.load.default_table.trim().is_empty() {
        return Err(LoadError::Config("load.default_table is required".into()));
    }

    if let Some(0) = config.warehouse.query_timeout_ms {
        return Err(LoadError::Config(
            "warehouse.query_timeout_ms must be positive".into(),
        ));
    }

    Ok(())
}
