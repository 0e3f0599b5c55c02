//! Error types for the loader library.

use thiserror::Error;

/// Main error type for export and load operations.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Configuration error (invalid YAML, missing fields, unresolvable table, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The warehouse rejected the query or failed while executing it
    #[error("Query execution failed: {0}")]
    QueryExecution(String),

    /// The query result has no describable columns, even after fetching a row
    #[error("Query result has an empty schema")]
    SchemaUnavailable,

    /// Source field the destination cannot hold: repeated or nested (no
    /// flattening is attempted), or a name the destination rejects
    #[error("Unsupported column {column:?}: {reason}")]
    UnsupportedType { column: String, reason: String },

    /// Any DDL or DML failure against the destination
    #[error("Destination database error: {0}")]
    Database(String),

    /// A value could not be represented in its destination column (strict mode only)
    #[error("Cannot convert value for column {column:?}: {message}")]
    Conversion { column: String, message: String },

    /// Existing destination column type differs from the mapped field type (strict mode only)
    #[error("Column {column:?} exists as {existing} but the query produces {expected}")]
    SchemaConflict {
        column: String,
        existing: String,
        expected: String,
    },

    /// The call was cancelled (deadline, client abort, SIGTERM)
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoadError {
    /// Create an UnsupportedType error for a column.
    pub fn unsupported(column: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::UnsupportedType {
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create a Database error with context about where it occurred.
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        LoadError::Database(format!("{}: {}", context, err))
    }

    /// Whether the failure was caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LoadError::Config(_)
                | LoadError::SchemaUnavailable
                | LoadError::UnsupportedType { .. }
                | LoadError::SchemaConflict { .. }
        )
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            LoadError::Config(_) => 2,
            LoadError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, LoadError>;
