//! Error types for the Sheetsmith service and CLI.
//!
//! - [`CsvError`] - CSV import errors
//! - [`AiError`] - Language-model provider errors
//! - [`ServerError`] - HTTP server errors
//! - [`CliError`] - Top-level command errors
//!
//! Editor-side failures ([`TransformFailure`], [`ExportError`]) come from `sheetsmith-editor`
//! and convert into [`CliError`] with `From`, so `?` works across the boundary.

use sheetsmith_editor::{DatasetError, ExportError, TransformFailure};
use thiserror::Error;

// =============================================================================
// CSV Import Errors
// =============================================================================

/// Errors during CSV import.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid CSV format.
    #[error("Line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// The parsed rows do not form a valid table.
    #[error("Invalid table: {0}")]
    Table(#[from] DatasetError),
}

// =============================================================================
// AI Provider Errors
// =============================================================================

/// Errors from a language-model provider.
#[derive(Debug, Error)]
pub enum AiError {
    /// No key configured for the provider.
    #[error("{0} API key not configured")]
    MissingApiKey(String),

    /// Provider name not recognised.
    #[error("Unsupported API provider: {0}")]
    UnsupportedProvider(String),

    /// Transport failure.
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    /// The provider answered with a non-success status.
    #[error("{provider} API error: {status}")]
    ApiError { provider: String, status: u16 },

    /// The provider's reply did not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    /// Transport failures are worth another attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        matches!(self, AiError::RequestFailed(_))
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving failed.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// CLI Errors (top-level)
// =============================================================================

/// Top-level command errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    #[error("{0}")]
    Transform(#[from] TransformFailure),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad command usage.
    #[error("{0}")]
    Usage(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV import.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for provider calls.
pub type AiResult<T> = Result<T, AiError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let cli: CliError = CsvError::EmptyFile.into();
        assert!(cli.to_string().contains("empty"));

        let cli: CliError = TransformFailure::NoData.into();
        assert!(cli.to_string().contains("Load a CSV file first"));

        let csv: CsvError = DatasetError::DuplicateColumn("a".into()).into();
        assert!(csv.to_string().contains("'a'"));
    }

    #[test]
    fn test_ai_error_messages() {
        assert_eq!(
            AiError::MissingApiKey("OpenAI".into()).to_string(),
            "OpenAI API key not configured"
        );
        assert_eq!(
            AiError::ApiError {
                provider: "Groq".into(),
                status: 429
            }
            .to_string(),
            "Groq API error: 429"
        );
        assert!(AiError::RequestFailed("timeout".into()).is_transient());
        assert!(!AiError::UnsupportedProvider("x".into()).is_transient());
    }
}
