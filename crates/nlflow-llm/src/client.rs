//! Multi-provider completion client.
//!
//! Supports the **OpenAI Chat Completions API** (and any OpenAI-compatible
//! endpoint) and the **Ollama generate API**.  Only non-streaming requests
//! are issued; callers get the raw completion text back and parse it
//! themselves.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{LlmError, Result};
use crate::types::CompletionRequest;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama base URL.
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model used with Ollama.
pub const OLLAMA_DEFAULT_MODEL: &str = "mistral";

/// Default request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Provider enum
// ---------------------------------------------------------------------------

/// Identifies which completion API the client should target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI Chat Completions API (also covers OpenAI-compatible endpoints).
    OpenAI,
    /// Ollama `/api/generate`.
    Ollama,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl FromStr for LlmProvider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(LlmError::UnknownProvider {
                name: other.to_owned(),
            }),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a single completion endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Which provider this configuration targets.
    pub provider: LlmProvider,
    /// API key.  Required for OpenAI, ignored by Ollama.
    pub api_key: Option<String>,
    /// Base URL for the API (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Default model identifier.
    pub default_model: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl LlmClientConfig {
    /// Create a configuration for the OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::openai_compatible(api_key, model, OPENAI_BASE_URL)
    }

    /// Create a configuration for any OpenAI-compatible API.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            api_key: Some(api_key.into()),
            base_url: base_url.into(),
            default_model: model.into(),
            max_tokens: 1024,
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }

    /// Create a configuration for a local Ollama server.
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: base_url.into(),
            default_model: model.into(),
            max_tokens: 1024,
            timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Anything that can turn a [`CompletionRequest`] into completion text.
///
/// The normalizer depends on this trait rather than on [`LlmClient`] so
/// tests and embedders can plug in their own backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short provider name used in logs.
    fn name(&self) -> &str;

    /// Run one completion and return the raw text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP completion client for OpenAI-compatible and Ollama endpoints.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: LlmClientConfig,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.provider == LlmProvider::OpenAI
            && config.api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(LlmError::MissingApiKey {
                provider: config.provider.to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { config, http })
    }

    /// The configured provider.
    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    /// The configured default model.
    pub fn default_model(&self) -> &str {
        &self.config.default_model
    }

    fn model_for<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    // -- OpenAI --------------------------------------------------------------

    /// Build the JSON body for the OpenAI Chat Completions API.
    pub fn build_openai_request_body(&self, request: &CompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut body = json!({
            "model": self.model_for(request),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if request.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_openai_request_body(request);
        let url = format!("{}/chat/completions", self.base_url());

        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", self.config.api_key.as_deref().unwrap_or_default());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| LlmError::RequestFailed {
                reason: format!("invalid authorization header: {e}"),
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(url = %url, model = %body["model"], provider = "openai", "sending LLM request");

        let resp = self
            .http
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;

        let v = read_json_body(resp).await?;
        parse_openai_response(&v)
    }

    // -- Ollama --------------------------------------------------------------

    /// Build the JSON body for the Ollama generate API.
    pub fn build_ollama_request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model_for(request),
            "prompt": request.flattened_prompt(),
            "stream": false,
        });

        if let Some(system) = request.system_prompt() {
            body["system"] = json!(system);
        }
        if request.json_mode {
            body["format"] = json!("json");
        }

        let mut options = serde_json::Map::new();
        if let Some(temp) = request.temperature {
            options.insert("temperature".into(), json!(temp));
        }
        if let Some(max) = request.max_tokens {
            options.insert("num_predict".into(), json!(max));
        }
        if !options.is_empty() {
            body["options"] = Value::Object(options);
        }

        body
    }

    async fn complete_ollama(&self, request: &CompletionRequest) -> Result<String> {
        let body = self.build_ollama_request_body(request);
        let url = format!("{}/api/generate", self.base_url());

        tracing::debug!(url = %url, model = %body["model"], provider = "ollama", "sending LLM request");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })?;

        let v = read_json_body(resp).await?;
        parse_ollama_response(&v)
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    fn name(&self) -> &str {
        self.config.provider.as_str()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        match self.config.provider {
            LlmProvider::OpenAI => self.complete_openai(request).await,
            LlmProvider::Ollama => self.complete_ollama(request).await,
        }
    }
}

// ===========================================================================
// Response handling (free functions)
// ===========================================================================

async fn read_json_body(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text().await.map_err(|e| LlmError::RequestFailed {
        reason: format!("failed to read response body: {e}"),
    })?;

    if !status.is_success() {
        return Err(LlmError::RequestFailed {
            reason: format!("API returned {status}: {text}"),
        });
    }

    serde_json::from_str(&text).map_err(|e| LlmError::ParseFailed {
        reason: format!("invalid JSON response: {e}"),
    })
}

/// Extract the completion text from an OpenAI Chat Completions response.
pub fn parse_openai_response(v: &Value) -> Result<String> {
    let message = &v["choices"][0]["message"];
    if message.is_null() {
        return Err(LlmError::ParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }
    Ok(message["content"].as_str().unwrap_or_default().to_owned())
}

/// Extract the completion text from an Ollama generate response.
pub fn parse_ollama_response(v: &Value) -> Result<String> {
    v["response"]
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| LlmError::ParseFailed {
            reason: "missing `response` field in Ollama reply".into(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    #[test]
    fn provider_from_str() {
        assert_eq!("OpenAI".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAI);
        assert_eq!("ollama".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert_eq!("local".parse::<LlmProvider>().unwrap(), LlmProvider::Ollama);
        assert!("anthropic".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn openai_requires_api_key() {
        let err = LlmClient::new(LlmClientConfig::openai("", "gpt-4o-mini")).unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }

    #[test]
    fn ollama_needs_no_key() {
        let client = LlmClient::new(LlmClientConfig::ollama(OLLAMA_BASE_URL, "mistral")).unwrap();
        assert_eq!(client.provider(), LlmProvider::Ollama);
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn openai_body_uses_default_model_and_json_mode() {
        let client = LlmClient::new(LlmClientConfig::openai("k", "gpt-4o-mini")).unwrap();
        let request = CompletionRequest {
            temperature: Some(0.0),
            json_mode: true,
            ..CompletionRequest::with_system("sys", "hello")
        };

        let body = client.build_openai_request_body(&request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["response_format"]["type"], "json_object");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hello");
    }

    #[test]
    fn ollama_body_splits_system_prompt() {
        let client = LlmClient::new(LlmClientConfig::ollama(OLLAMA_BASE_URL, "mistral")).unwrap();
        let request = CompletionRequest {
            model: "llama3".into(),
            messages: vec![Message::system("sys"), Message::user("hello")],
            json_mode: true,
            ..Default::default()
        };

        let body = client.build_ollama_request_body(&request);
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["prompt"], "hello");
        assert_eq!(body["system"], "sys");
        assert_eq!(body["stream"], false);
        assert_eq!(body["format"], "json");
        assert!(body.get("options").is_none());
    }

    #[test]
    fn parse_responses() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(parse_openai_response(&openai).unwrap(), "hi");
        assert!(parse_openai_response(&json!({"choices": []})).is_err());

        let ollama = json!({"model": "mistral", "response": "{\"a\":1}", "done": true});
        assert_eq!(parse_ollama_response(&ollama).unwrap(), "{\"a\":1}");
        assert!(parse_ollama_response(&json!({"done": true})).is_err());
    }
}
