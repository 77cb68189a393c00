//! Custom error types for the batch dispatcher.
//!
//! This module defines the primary error type, `BatchError`, used by the table reader,
//! configuration loader, and journal. Using the `thiserror` crate, it provides a
//! centralized and consistent way to report problems with the batch definition itself,
//! as opposed to failures raised by the action handlers that a batch dispatches.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parse or type errors in the
//!   configuration file or environment overrides.
//! - **`Configuration`**: Semantic errors in an otherwise well-formed configuration
//!   (e.g., an unknown log level).
//! - **`Io`** / **`Csv`**: Failures reading the table resource or writing the journal.
//! - **Table shape** (`LabelsRowMissing`, `EmptyTable`, `MissingColumn`, `DuplicateColumn`):
//!   the sheet does not contain a usable table at the declared position.
//! - **`InvalidNumber`** / **`MissingParameter`**: a row's cell could not be used as the
//!   handler required. Stray content read from outside the table lands here.
//!
//! Handler failures are not wrapped in `BatchError`; they travel as `anyhow::Error` so the
//! caller sees them unmodified.

use thiserror::Error;

/// Convenience alias for results using the batch error type.
pub type BatchResult<T> = std::result::Result<T, BatchError>;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Labels row {labels_row} is beyond the end of the sheet ({rows} rows)")]
    LabelsRowMissing { labels_row: usize, rows: usize },

    #[error("No column labels found on row {labels_row}")]
    EmptyTable { labels_row: usize },

    #[error("Column '{0}' not found in table labels")]
    MissingColumn(String),

    #[error("Duplicate column label '{0}'")]
    DuplicateColumn(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid number in column '{column}': '{value}'")]
    InvalidNumber { column: String, value: String },

    #[error("Journal error: {0}")]
    Journal(#[from] serde_json::Error),
}

impl From<figment::Error> for BatchError {
    fn from(value: figment::Error) -> Self {
        BatchError::Config(Box::new(value))
    }
}

impl BatchError {
    /// True when the error points at the batch definition rather than the environment.
    ///
    /// Callers treat these as configuration errors: the table must be fixed before the
    /// batch can run.
    pub fn is_table_error(&self) -> bool {
        matches!(
            self,
            BatchError::LabelsRowMissing { .. }
                | BatchError::EmptyTable { .. }
                | BatchError::MissingColumn(_)
                | BatchError::DuplicateColumn(_)
                | BatchError::MissingParameter(_)
                | BatchError::InvalidNumber { .. }
        )
    }
}
