//! # Sheetsmith - natural-language CSV editing
//!
//! The backend half of Sheetsmith: CSV import, the model service that turns an instruction into
//! a table-transformation snippet, and the `sheetsmith` command-line editor. The snippet is run
//! by the sandboxed engine in `sheetsmith-editor`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│   Session   │────▶│  CSV export │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (undo/redo) │     │             │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                │ instruction + context
//!                                         ┌──────▼──────┐
//!                                         │ /ai-command │  OpenAI, Gemini, Groq, Anthropic
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sheetsmith::parse_csv_file_auto;
//! use sheetsmith_editor::{EditorSession, EngineRuntime};
//!
//! #[tokio::main]
//! async fn main() {
//!     let parsed = parse_csv_file_auto("input.csv").unwrap();
//!     let session = EditorSession::new(Arc::new(EngineRuntime::default()));
//!     session.load(parsed.dataset);
//!     session.apply("df = df.dropna()").await.unwrap();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Environment settings
//! - [`parser`] - CSV import with auto-detection
//! - [`ai`] - Snippet generation with hosted models
//! - [`api`] - HTTP model service
//! - [`repl`] - Interactive editing commands

// Core modules
pub mod config;
pub mod error;

// Import
pub mod parser;

// Model service
pub mod ai;
pub mod api;

// Command line
pub mod repl;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{AiError, CliError, CsvError, ServerError};

pub use config::{ProviderKeys, Settings};

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    ParseResult,
};

pub use ai::prompt::operations_description;
pub use ai::{CodeGenerator, Provider};

pub use api::{router, start_server};

pub use repl::{Command, Repl, Reply};
