//! Runtime settings.
//!
//! Loaded from the environment (after reading `.env` with `dotenvy`). Every value has a default;
//! a value that does not parse falls back to the default with a warning.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SHEETSMITH_PORT` | 5000 |
//! | `SHEETSMITH_MODEL_URL` | `http://localhost:5000` |
//! | `SHEETSMITH_PROVIDER` | `openai` |
//! | `SHEETSMITH_MAX_HISTORY` | 50 |
//! | `SHEETSMITH_EDIT_DEBOUNCE_MS` | 500 |
//! | `SHEETSMITH_EXEC_TIMEOUT_MS` | 5000 |
//! | `SHEETSMITH_CONTEXT_ROWS` | 3 |
//!
//! Provider keys come from `OPENAI_API_KEY`, `GEMINI_API_KEY`, `GROQ_API_KEY` and
//! `ANTHROPIC_API_KEY`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use sheetsmith_editor::config::{
    CONTEXT_ROWS, DEFAULT_PROVIDER, EDIT_DEBOUNCE, MAX_HISTORY, MODEL_SERVICE_URL,
};
use sheetsmith_editor::ExecutionLimits;

pub const DEFAULT_PORT: u16 = 5000;

/// API keys of the supported providers. Missing or blank keys are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderKeys {
    pub openai: Option<String>,
    pub gemini: Option<String>,
    pub groq: Option<String>,
    pub anthropic: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub port: u16,
    pub model_url: String,
    pub provider: String,
    pub max_history: usize,
    pub edit_debounce: Duration,
    pub exec_timeout: Duration,
    pub context_rows: usize,
    pub keys: ProviderKeys,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            model_url: MODEL_SERVICE_URL.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            max_history: MAX_HISTORY,
            edit_debounce: EDIT_DEBOUNCE,
            exec_timeout: ExecutionLimits::default().timeout,
            context_rows: CONTEXT_ROWS,
            keys: ProviderKeys::default(),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> T {
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring invalid {}={:?}, using the default", name, raw);
                default
            }
        },
        None => default,
    }
}

fn key(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
}

impl Settings {
    /// Read `.env` (if present) and the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parsed(&lookup, "SHEETSMITH_PORT", defaults.port),
            model_url: lookup("SHEETSMITH_MODEL_URL")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.model_url),
            provider: lookup("SHEETSMITH_PROVIDER")
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .unwrap_or(defaults.provider),
            max_history: parsed(&lookup, "SHEETSMITH_MAX_HISTORY", defaults.max_history).max(1),
            edit_debounce: Duration::from_millis(parsed(
                &lookup,
                "SHEETSMITH_EDIT_DEBOUNCE_MS",
                defaults.edit_debounce.as_millis() as u64,
            )),
            exec_timeout: Duration::from_millis(parsed(
                &lookup,
                "SHEETSMITH_EXEC_TIMEOUT_MS",
                defaults.exec_timeout.as_millis() as u64,
            )),
            context_rows: parsed(&lookup, "SHEETSMITH_CONTEXT_ROWS", defaults.context_rows),
            keys: ProviderKeys {
                openai: key(&lookup, "OPENAI_API_KEY"),
                gemini: key(&lookup, "GEMINI_API_KEY"),
                groq: key(&lookup, "GROQ_API_KEY"),
                anthropic: key(&lookup, "ANTHROPIC_API_KEY"),
            },
        }
    }

    /// Engine limits with the configured timeout.
    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            timeout: self.exec_timeout,
            ..ExecutionLimits::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s, Settings::default());
        assert_eq!(s.port, 5000);
        assert_eq!(s.max_history, 50);
        assert_eq!(s.edit_debounce, Duration::from_millis(500));
        assert_eq!(s.context_rows, 3);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("SHEETSMITH_PORT", "8080"),
            ("SHEETSMITH_PROVIDER", " Groq "),
            ("SHEETSMITH_EXEC_TIMEOUT_MS", "250"),
            ("GROQ_API_KEY", "gsk-123"),
            ("OPENAI_API_KEY", "  "),
        ]);
        assert_eq!(s.port, 8080);
        assert_eq!(s.provider, "groq");
        assert_eq!(s.execution_limits().timeout, Duration::from_millis(250));
        assert_eq!(s.keys.groq.as_deref(), Some("gsk-123"));
        assert_eq!(s.keys.openai, None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let s = settings(&[("SHEETSMITH_PORT", "http"), ("SHEETSMITH_MAX_HISTORY", "0")]);
        assert_eq!(s.port, DEFAULT_PORT);
        assert_eq!(s.max_history, 1);
    }
}
