//! # Sheetsmith editor core
//!
//! Natural-language editing of an in-memory table. An instruction goes to a model service, the
//! snippet that comes back is checked, run in a sandboxed dataframe engine against a copy of the
//! table, and the result is committed to a bounded undo/redo history.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌──────────────┐
//! │ instruction│──▶│   model   │──▶│  validator │──▶│ executor │──▶│ VersionedStore│
//! │            │   │  service  │   │ (pre-filter│   │ (engine) │   │ (undo/redo)  │
//! └────────────┘   └───────────┘   └────────────┘   └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sheetsmith_editor::{EditorSession, EngineRuntime};
//!
//! let session = EditorSession::new(Arc::new(EngineRuntime::default()));
//! session.load(dataset);
//! session.apply("df = df.dropna(subset=['age'])").await?;
//! session.undo();
//! ```
//!
//! ## Modules
//!
//! - [`dataset`] - The rectangular table model
//! - [`validator`] - Static pre-filter for snippets
//! - [`engine`] - Sandboxed interpreter for dataframe snippets
//! - [`runtime`] - Lazy engine lifecycle
//! - [`marshal`] - Dataset to engine table conversion
//! - [`executor`] - One snippet against one dataset
//! - [`history`] - Bounded undo/redo store
//! - [`session`] - Per-document context object
//! - [`debounce`] - Cell edit coalescing
//! - [`export`] / [`render`] - CSV and text output
//! - [`services`] - Model service client

// Core
pub mod config;
pub mod dataset;
pub mod error;

// Execution
pub mod engine;
pub mod executor;
pub mod marshal;
pub mod runtime;
pub mod validator;

// State
pub mod debounce;
pub mod history;
pub mod session;

// Output
pub mod export;
pub mod render;

// Model service
pub mod services;

// =============================================================================
// Re-exports
// =============================================================================

pub use dataset::{format_number, Cell, Dataset, Position, Row};
pub use error::{DatasetError, ErrorKind, ExportError, TransformFailure};

pub use engine::{Engine, ExecutionLimits};
pub use executor::{apply, ExecutionResult};
pub use runtime::{EngineLoader, EngineRuntime, EngineState, LoadError, StandardLibraryLoader};
pub use validator::{check as check_snippet, validate as validate_snippet, Rejection};

pub use debounce::CellEditBuffer;
pub use history::VersionedStore;
pub use session::{EditorSession, Outcome};

pub use export::{export_csv, export_csv_file, export_csv_with};
pub use render::render_table;

pub use services::{build_context, is_executable_code, ModelServiceClient, ModelRequest, ModelResponse, Suggestion};
