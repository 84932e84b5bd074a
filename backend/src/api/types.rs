//! Wire types of the model service.
//!
//! The request and reply bodies of `/ai-command` are shared with the editor's client
//! ([`ModelRequest`], [`ModelResponse`]) so both sides agree on the contract.

use serde::{Deserialize, Serialize};

pub use sheetsmith_editor::{ModelRequest, ModelResponse};

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub version: String,
    /// Providers with a configured key.
    pub providers: Vec<String>,
}

/// Successful `/ai-command` reply.
pub fn success_response(code: String, provider: &str) -> ModelResponse {
    ModelResponse::Success {
        code,
        api_used: Some(provider.to_string()),
    }
}

/// Failed `/ai-command` reply.
pub fn error_response(message: impl Into<String>) -> ModelResponse {
    ModelResponse::Error {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_format() {
        let ok = serde_json::to_value(success_response("df = df.head()".into(), "groq")).unwrap();
        assert_eq!(
            ok,
            json!({"status": "success", "code": "df = df.head()", "api_used": "groq"})
        );

        let err = serde_json::to_value(error_response("bad body")).unwrap();
        assert_eq!(err, json!({"status": "error", "message": "bad body"}));
    }
}
