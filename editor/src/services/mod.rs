//! Outbound services used by the editor.
//!
//! - [`model`] - client for the remote model service that turns instructions into snippets

pub mod model;

pub use model::{
    build_context, is_executable_code, ModelRequest, ModelResponse, ModelServiceClient, Suggestion,
};
