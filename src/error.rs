//! Error types for tablesync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (3=not_found, 4=validation, 5=schema, 6=remote, 7=config, 8=io)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tablesync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Not Found (exit 3)
    RecordNotFound,
    TableNotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Schema (exit 5)
    SchemaMismatch,

    // Remote store (exit 6)
    RemoteError,

    // Config (exit 7)
    ConfigError,
    NotConfigured,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::RemoteError => "REMOTE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::NotConfigured => "NOT_CONFIGURED",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::RecordNotFound | Self::TableNotFound => 3,
            Self::InvalidArgument => 4,
            Self::SchemaMismatch => 5,
            Self::RemoteError => 6,
            Self::ConfigError | Self::NotConfigured => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether re-running with corrected input can succeed.
    ///
    /// Remote errors are not retryable: a failed run may have left a
    /// partially-applied batch behind.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::ConfigError | Self::NotConfigured | Self::SchemaMismatch
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while synchronizing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("No configuration found at {path}")]
    NotConfigured { path: PathBuf },

    #[error("Remote error ({context}): {message}")]
    Remote {
        /// What the engine was doing, e.g. `fetch Companies`.
        context: String,
        /// Error payload or status text returned by the store.
        message: String,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record not found: {table}/{id}")]
    RecordNotFound { table: String, id: String },

    #[error("Table not configured for sync: {name}")]
    TableNotFound {
        name: String,
        /// Configured table names for hint display.
        available: Vec<String>,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Remote`] with a context label.
    pub fn remote(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotConfigured { .. } => ErrorCode::NotConfigured,
            Self::Remote { .. } | Self::Http(_) => ErrorCode::RemoteError,
            Self::SchemaMismatch(_) => ErrorCode::SchemaMismatch,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::RecordNotFound { .. } => ErrorCode::RecordNotFound,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotConfigured { path } => Some(format!(
                "Create {} or pass `--config <file>` (see README for the format).",
                path.display()
            )),

            Self::Remote { .. } | Self::Http(_) => Some(
                "The run was aborted and the last-run boundary was not advanced. \
                 Batches sent before the failure remain applied; re-running is safe."
                    .to_string(),
            ),

            Self::SchemaMismatch(msg) => {
                if msg.contains("link") {
                    Some("Add the linked table to `tables` or drop the link field from its field list.".to_string())
                } else {
                    Some("Check that the destination field list matches the destination base.".to_string())
                }
            }

            Self::TableNotFound { available, .. } => {
                if available.is_empty() {
                    Some("No tables are configured for sync.".to_string())
                } else {
                    Some(format!("Configured tables: {}", available.join(", ")))
                }
            }

            Self::RecordNotFound { table, .. } => Some(format!(
                "Check the record ID; it must be a source-side record of `{table}`."
            )),

            Self::Config(_)
            | Self::InvalidArgument(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
