//! Editor defaults.
//!
//! Compile-time defaults for the editor core. The backend's settings layer can override
//! the tunable ones at session construction.

use std::time::Duration;

/// Name the working table is bound to inside the engine.
pub const TABLE_BINDING: &str = "df";

/// Name of the untouched copy of the input table inside the engine.
pub const ORIGINAL_BINDING: &str = "original_df";

/// Maximum number of history entries kept for undo/redo.
pub const MAX_HISTORY: usize = 50;

/// Quiescence window before a cell edit is committed.
pub const EDIT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Rows of the current table sent to the model as context.
pub const CONTEXT_ROWS: usize = 3;

/// Default model service endpoint.
pub const MODEL_SERVICE_URL: &str = "http://localhost:5000";

/// Default language-model provider.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Model service request timeout.
pub const MODEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
