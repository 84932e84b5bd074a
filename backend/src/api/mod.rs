//! HTTP API module.
//!
//! The model service (`/ai-command`), health check and SSE log stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::{ai_command, router, start_server, AppState};
pub use types::*;
