//! Error types for survey-guard.

use thiserror::Error;

/// Result type used throughout survey-guard.
pub type Result<T> = std::result::Result<T, QaError>;

/// Errors that can occur while preparing, summarizing or annotating tables.
///
/// Recoverable problems (unknown filter operators, missing join tables, missing
/// QA sibling columns) are reported as [`crate::diagnostics::Diagnostic`]s
/// instead. A `QaError` always aborts the unit of work that raised it.
#[derive(Error, Debug)]
pub enum QaError {
    /// Invalid configuration detected while loading or validating it.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A summary groups by columns that do not exist in its table.
    #[error("Columns {columns:?} not found in table '{table}' for summary '{summary}'")]
    MissingGroupColumns {
        /// The summary definition that failed.
        summary: String,
        /// The table the summary was computed over.
        table: String,
        /// The group-by columns that were absent.
        columns: Vec<String>,
    },

    /// A referenced table does not exist.
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    /// Data does not match the shape or type a table requires.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Arrow conversion error.
    #[error("Arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QaError {
    /// Creates a configuration error with the given message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a table-not-found error for `name`.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Self::TableNotFound(name.into())
    }

    /// Creates an invalid data error with the given message.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Returns true for errors caused by the configuration rather than the data.
    ///
    /// These abort a single summary and are reported as failures of that summary.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::MissingGroupColumns { .. } | Self::TableNotFound(_)
        )
    }
}
