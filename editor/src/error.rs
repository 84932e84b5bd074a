//! Error types for the editor core.
//!
//! This module defines the error hierarchy of the transformation pipeline:
//!
//! - [`DatasetError`] - violations of the rectangular table invariant and bad edits
//! - [`TransformFailure`] - the structured failure returned by an apply request
//! - [`ErrorKind`] - the flat taxonomy tag of a [`TransformFailure`]
//! - [`ExportError`] - CSV serialization errors
//!
//! Interpreter errors live next to the interpreter in [`crate::engine::EngineError`].
//! Every failure is recovered at the executor or lifecycle boundary and surfaced as a
//! value; none of these escape as a panic.

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Dataset Errors
// =============================================================================

/// Errors raised when building or editing a [`crate::Dataset`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DatasetError {
    /// A row does not carry the same columns, in the same order, as the first row.
    #[error("row {row} has columns [{}], expected [{}]", found.join(", "), expected.join(", "))]
    Ragged {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// A row carries an empty column name.
    #[error("row {row} has an empty column name")]
    EmptyColumnName { row: usize },

    /// A column with this name already exists.
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),

    /// No column with this name exists.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    /// Row index past the end of the table.
    #[error("row {index} out of range (table has {len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    /// The operation needs at least one row to know the table shape.
    #[error("the table has no rows")]
    Empty,
}

// =============================================================================
// Transformation Failures
// =============================================================================

/// Flat classification of a [`TransformFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSnippet,
    EngineUnavailable,
    ContractViolation,
    MalformedResult,
    ExecutionError,
    NetworkError,
    NoData,
    RequestInFlight,
    Superseded,
    InvalidEdit,
}

impl ErrorKind {
    /// Whether offering the user a retry makes sense for this kind.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::EngineUnavailable
                | ErrorKind::NetworkError
                | ErrorKind::RequestInFlight
                | ErrorKind::Superseded
        )
    }
}

/// Structured failure of a transformation request.
///
/// Any failure leaves the versioned store untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformFailure {
    /// The snippet failed static validation.
    #[error("Code failed safety validation: {0}")]
    InvalidSnippet(String),

    /// The execution engine could not be initialized.
    #[error("Execution engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The snippet ran but left no table behind.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// The table produced by the snippet cannot be represented as a dataset.
    #[error("Malformed result: {0}")]
    MalformedResult(String),

    /// The engine raised while running the snippet.
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// The model service request failed.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// There is no data to transform.
    #[error("No data to apply changes to. Load a CSV file first.")]
    NoData,

    /// Another transformation request is still running.
    #[error("A transformation request is already in flight")]
    RequestInFlight,

    /// The table changed while the transformation was running.
    #[error("The table changed while the transformation was running")]
    Superseded,

    /// A direct edit was rejected.
    #[error("Edit rejected: {0}")]
    Edit(#[from] DatasetError),
}

impl TransformFailure {
    /// The taxonomy tag of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformFailure::InvalidSnippet(_) => ErrorKind::InvalidSnippet,
            TransformFailure::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            TransformFailure::ContractViolation(_) => ErrorKind::ContractViolation,
            TransformFailure::MalformedResult(_) => ErrorKind::MalformedResult,
            TransformFailure::ExecutionError(_) => ErrorKind::ExecutionError,
            TransformFailure::NetworkError(_) => ErrorKind::NetworkError,
            TransformFailure::NoData => ErrorKind::NoData,
            TransformFailure::RequestInFlight => ErrorKind::RequestInFlight,
            TransformFailure::Superseded => ErrorKind::Superseded,
            TransformFailure::Edit(_) => ErrorKind::InvalidEdit,
        }
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while serializing a dataset to CSV.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The CSV writer failed.
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    /// Flushing the output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The writer produced invalid UTF-8.
    #[error("Encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// There is nothing to export.
    #[error("No data to export")]
    Empty,
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for dataset edits.
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Result type for CSV export.
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            TransformFailure::InvalidSnippet("import os".into()).kind(),
            ErrorKind::InvalidSnippet
        );
        assert_eq!(TransformFailure::NoData.kind(), ErrorKind::NoData);

        let edit: TransformFailure = DatasetError::UnknownColumn("age".into()).into();
        assert_eq!(edit.kind(), ErrorKind::InvalidEdit);
        assert!(edit.to_string().contains("age"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(TransformFailure::EngineUnavailable("boom".into()).is_retryable());
        assert!(TransformFailure::NetworkError("503".into()).is_retryable());
        assert!(!TransformFailure::InvalidSnippet("x".into()).is_retryable());
        assert!(!TransformFailure::ContractViolation("x".into()).is_retryable());
    }

    #[test]
    fn test_ragged_message() {
        let err = DatasetError::Ragged {
            row: 2,
            expected: vec!["a".into(), "b".into()],
            found: vec!["a".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("row 2"));
        assert!(msg.contains("[a, b]"));
    }
}
