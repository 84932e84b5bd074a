//! Snippet generation with hosted language models.
//!
//! [`CodeGenerator::generate`] never fails: like the model itself, it always answers with text.
//! Provider problems (missing key, HTTP errors, malformed replies) come back as `# ...` comment
//! lines, which the editor classifies as messages rather than code.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sheetsmith::ai::CodeGenerator;
//! use sheetsmith::config::Settings;
//!
//! let generator = CodeGenerator::new(Settings::from_env().keys);
//! let code = generator.generate("name | age\nBob | 30", "drop empty ages", "openai").await;
//! ```

pub mod prompt;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::config::ProviderKeys;
use crate::error::{AiError, AiResult};

pub use prompt::{operations_description, system_prompt, user_prompt, OPERATIONS};

/// Replies the prompt asks the model to use instead of code.
pub const SENTINELS: [&str; 2] = ["Can you elaborate?", "This operation is not possible"];

/// Default number of attempts for transport failures.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between retries in milliseconds.
const RETRY_DELAY_MS: u64 = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TOKENS: u32 = 200;
const TEMPERATURE: f64 = 0.1;

static CODE_FENCE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"```[A-Za-z]*\n?|\n?```").ok());

/// Supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
    Groq,
    Anthropic,
}

impl Provider {
    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::Gemini => "Gemini",
            Provider::Groq => "Groq",
            Provider::Anthropic => "Anthropic",
        }
    }

    fn model(self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-3.5-turbo",
            Provider::Gemini => "gemini-2.5-flash-lite",
            Provider::Groq => "openai/gpt-oss-20b",
            Provider::Anthropic => "claude-3-haiku-20240307",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Provider {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "groq" => Ok(Provider::Groq),
            "anthropic" => Ok(Provider::Anthropic),
            _ => Err(AiError::UnsupportedProvider(s.to_string())),
        }
    }
}

// OpenAI-compatible chat completions (OpenAI, Groq)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

// Gemini generateContent
#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

// Anthropic messages
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Strip markdown code fences and surrounding whitespace.
pub fn clean_reply(reply: &str) -> String {
    match CODE_FENCE.as_ref() {
        Some(fence) => fence.replace_all(reply, "").trim().to_string(),
        None => reply.trim().to_string(),
    }
}

/// Final answer for a cleaned model reply: sentinels and valid code pass through, anything the
/// snippet validator rejects is commented out.
pub fn finalize(code: &str) -> String {
    let code = clean_reply(code);
    if code.is_empty() || SENTINELS.contains(&code.as_str()) {
        return code;
    }
    if !sheetsmith_editor::validate_snippet(&code) {
        log::warn!("Generated code failed safety validation: {}", code);
        return format!("# Code failed safety validation:\n# {}", code);
    }
    code
}

/// Provider client that turns instructions into snippets.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    keys: ProviderKeys,
    client: reqwest::Client,
    max_retries: u32,
}

impl CodeGenerator {
    pub fn new(keys: ProviderKeys) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            keys,
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Set how many attempts a transport failure gets.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Whether a key is configured for `provider`.
    pub fn has_key(&self, provider: Provider) -> bool {
        self.key(provider).is_ok()
    }

    fn key(&self, provider: Provider) -> AiResult<&str> {
        let key = match provider {
            Provider::OpenAi => &self.keys.openai,
            Provider::Gemini => &self.keys.gemini,
            Provider::Groq => &self.keys.groq,
            Provider::Anthropic => &self.keys.anthropic,
        };
        key.as_deref()
            .ok_or_else(|| AiError::MissingApiKey(provider.label().to_string()))
    }

    /// Generate a snippet for `instruction`. Always returns text.
    pub async fn generate(&self, context: &str, instruction: &str, provider: &str) -> String {
        let context = context.trim();
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return "# No instruction provided".to_string();
        }

        let provider = match provider.parse::<Provider>() {
            Ok(p) => p,
            Err(e) => return format!("# {}", e),
        };
        log::info!("Generating code with {} for: {}", provider, instruction);

        match self.call_with_retries(provider, context, instruction).await {
            Ok(reply) => {
                let code = finalize(&reply);
                log::debug!("Generated code: {}", code);
                code
            }
            Err(e) => {
                log::error!("{} call failed: {}", provider, e);
                format!("# {}", e)
            }
        }
    }

    async fn call_with_retries(&self, provider: Provider, context: &str, instruction: &str) -> AiResult<String> {
        let mut attempt = 1;
        loop {
            match self.call(provider, context, instruction).await {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    log::warn!(
                        "Attempt {}/{} failed: {}, retrying in {}ms",
                        attempt,
                        self.max_retries,
                        e,
                        RETRY_DELAY_MS
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn call(&self, provider: Provider, context: &str, instruction: &str) -> AiResult<String> {
        let key = self.key(provider)?;
        match provider {
            Provider::OpenAi => {
                self.chat_completion(provider, "https://api.openai.com/v1/chat/completions", key, context, instruction)
                    .await
            }
            Provider::Groq => {
                self.chat_completion(provider, "https://api.groq.com/openai/v1/chat/completions", key, context, instruction)
                    .await
            }
            Provider::Gemini => self.gemini(key, context, instruction).await,
            Provider::Anthropic => self.anthropic(key, context, instruction).await,
        }
    }

    async fn post(&self, provider: Provider, request: reqwest::RequestBuilder) -> AiResult<String> {
        let response = request
            .send()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            log::warn!("{} returned {}: {}", provider, status, body);
            return Err(AiError::ApiError {
                provider: provider.label().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(body)
    }

    async fn chat_completion(
        &self,
        provider: Provider,
        url: &str,
        key: &str,
        context: &str,
        instruction: &str,
    ) -> AiResult<String> {
        let body = json!({
            "model": provider.model(),
            "messages": [
                {"role": "system", "content": system_prompt()},
                {"role": "user", "content": user_prompt(context, instruction)}
            ],
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE
        });
        let request = self.client.post(url).bearer_auth(key).json(&body);
        let raw = self.post(provider, request).await?;

        let response: ChatResponse =
            serde_json::from_str(&raw).map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| AiError::InvalidResponse("no choices in response".to_string()))
    }

    async fn gemini(&self, key: &str, context: &str, instruction: &str) -> AiResult<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            Provider::Gemini.model()
        );
        let body = json!({
            "contents": [{
                "parts": [{
                    "text": format!("{}\n\n{}", system_prompt(), user_prompt(context, instruction))
                }]
            }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_TOKENS
            }
        });
        let request = self.client.post(url).query(&[("key", key)]).json(&body);
        let raw = self.post(Provider::Gemini, request).await?;

        let response: GeminiResponse =
            serde_json::from_str(&raw).map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text.trim().to_string())
            .ok_or_else(|| AiError::InvalidResponse("no candidates in response".to_string()))
    }

    async fn anthropic(&self, key: &str, context: &str, instruction: &str) -> AiResult<String> {
        let body = json!({
            "model": Provider::Anthropic.model(),
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "system": system_prompt(),
            "messages": [{"role": "user", "content": user_prompt(context, instruction)}]
        });
        let request = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&body);
        let raw = self.post(Provider::Anthropic, request).await?;

        let response: AnthropicResponse =
            serde_json::from_str(&raw).map_err(|e| AiError::InvalidResponse(e.to_string()))?;
        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<String>();
        if text.is_empty() {
            return Err(AiError::InvalidResponse("empty response".to_string()));
        }
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_names() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" groq".parse::<Provider>().unwrap(), Provider::Groq);
        assert!(matches!(
            "deepseek".parse::<Provider>(),
            Err(AiError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_clean_reply_strips_fences() {
        assert_eq!(clean_reply("```python\ndf = df.dropna()\n```"), "df = df.dropna()");
        assert_eq!(clean_reply("  df = df.head()  "), "df = df.head()");
    }

    #[test]
    fn test_finalize() {
        assert_eq!(finalize("df = df.dropna()"), "df = df.dropna()");
        assert_eq!(finalize("Can you elaborate?"), "Can you elaborate?");
        assert_eq!(
            finalize("import os\ndf = df"),
            "# Code failed safety validation:\n# import os\ndf = df"
        );
    }

    #[tokio::test]
    async fn test_generate_without_network() {
        let generator = CodeGenerator::new(ProviderKeys::default());
        assert_eq!(generator.generate("", "  ", "openai").await, "# No instruction provided");
        assert_eq!(
            generator.generate("", "drop nulls", "deepseek").await,
            "# Unsupported API provider: deepseek"
        );
        assert_eq!(
            generator.generate("", "drop nulls", "gemini").await,
            "# Gemini API key not configured"
        );
        assert!(!generator.has_key(Provider::OpenAi));
    }
}
