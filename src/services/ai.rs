use crate::config::AppConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Classified failure cause, so retry policy never has to sniff message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiErrorKind {
    /// Upstream quota/rate-limit signal; eligible for retry with backoff.
    RateLimited,
    /// The model answered, but not with the structure we asked for.
    InvalidResponse,
    /// Everything else: transport failures, 5xx, auth errors.
    Upstream,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AiError {
    pub kind: AiErrorKind,
    pub message: String,
}

impl AiError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: AiErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: AiErrorKind::InvalidResponse,
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            kind: AiErrorKind::Upstream,
            message: message.into(),
        }
    }
}

/// Author of one chat turn, as sent by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

/// Handle to the external language model. One instance is constructed at
/// startup and shared across requests; implementations hold no mutable state.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// Single-turn generation: one prompt in, raw model text out.
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;

    /// Multi-turn chat. The first turn must be user-authored (upstream API
    /// constraint); callers sanitize history before reaching this point.
    async fn chat(&self, turns: &[ChatTurn]) -> Result<String, AiError>;
}

/// True when an error message carries a quota/rate-limit signal.
///
/// Used only at the client edge to classify transport-level failures that
/// arrive without an HTTP status; policy code matches on `AiErrorKind` instead.
pub fn is_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429")
        || lower.contains("quota")
        || lower.contains("rate")
        || lower.contains("exhausted")
}

/// Strip a leading/trailing markdown code fence from model output.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(stripped) = trimmed
        .strip_prefix("```json")
        .and_then(|s| s.strip_suffix("```"))
    {
        return stripped.trim();
    }
    if let Some(stripped) = trimmed
        .strip_prefix("```")
        .and_then(|s| s.strip_suffix("```"))
    {
        return stripped.trim();
    }
    trimmed
}

/// Google Gemini client over the generateContent REST API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_key,
            model,
        })
    }

    pub fn from_env(config: &AppConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY is not configured"))?;
        Self::new(
            api_key,
            config.ai_model.clone(),
            Duration::from_secs(config.ai_timeout_secs),
        )
    }

    async fn generate_content(&self, contents: Value) -> Result<String, AiError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request_body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.1,
                "topP": 0.1,
                "topK": 1
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                let message = format!("Gemini request failed: {}", e);
                if is_quota_message(&message) {
                    AiError::rate_limited(message)
                } else {
                    AiError::upstream(message)
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AiError::upstream(format!("Failed to read Gemini response: {}", e)))?;

        if status != StatusCode::OK {
            let message = format!("Gemini API error {}: {}", status, body);
            if status == StatusCode::TOO_MANY_REQUESTS
                || body.contains("RESOURCE_EXHAUSTED")
                || is_quota_message(&body)
            {
                return Err(AiError::rate_limited(message));
            }
            return Err(AiError::upstream(message));
        }

        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| AiError::invalid_response(format!("Gemini reply is not JSON: {}", e)))?;

        raw.get("candidates")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|item| item.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.as_array())
            .and_then(|parts| parts.first())
            .and_then(|part| part.get("text"))
            .and_then(|text| text.as_str())
            .map(|text| text.to_string())
            .ok_or_else(|| {
                AiError::invalid_response("Gemini response does not contain candidate text")
            })
    }
}

#[async_trait]
impl AiClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        let contents = json!([
            {
                "role": "user",
                "parts": [{ "text": prompt }]
            }
        ]);
        self.generate_content(contents).await
    }

    async fn chat(&self, turns: &[ChatTurn]) -> Result<String, AiError> {
        let contents: Vec<Value> = turns
            .iter()
            .map(|turn| {
                json!({
                    "role": match turn.role {
                        TurnRole::User => "user",
                        TurnRole::Assistant => "model",
                    },
                    "parts": [{ "text": turn.content }]
                })
            })
            .collect();
        self.generate_content(Value::Array(contents)).await
    }
}

/// Canned client for development and tests: deterministic replies, no network.
pub struct StaticClient;

impl StaticClient {
    pub const ANALYSIS_REPLY: &'static str = r#"{
        "structural_score": 80,
        "formatting_score": 70,
        "score": 90,
        "issues": [
            {
                "type": "missing_section",
                "page": "3",
                "description": "Declaration page was not detected.",
                "suggestion": "Insert a signed Declaration page after the Bonafide Certificate.",
                "severity": "high"
            },
            {
                "type": "grammar",
                "page": "15",
                "description": "Contraction 'don't' found in the Introduction.",
                "suggestion": "Expand all contractions into their full word forms.",
                "severity": "medium"
            }
        ],
        "tone": "formal",
        "clarity": 85
    }"#;

    pub const CHAT_REPLY: &'static str =
        "Based on the report, the Abstract should be a one-page summary of 300 to 500 words.";
}

#[async_trait]
impl AiClient for StaticClient {
    async fn generate(&self, _prompt: &str) -> Result<String, AiError> {
        tracing::warn!("StaticClient: returning canned analysis (development mode)");
        Ok(Self::ANALYSIS_REPLY.to_string())
    }

    async fn chat(&self, _turns: &[ChatTurn]) -> Result<String, AiError> {
        Ok(Self::CHAT_REPLY.to_string())
    }
}

/// Factory selecting the client implementation from config
pub fn create_ai_client(config: &AppConfig) -> anyhow::Result<Arc<dyn AiClient>> {
    match config.ai_provider.to_lowercase().as_str() {
        "gemini" => Ok(Arc::new(GeminiClient::from_env(config)?)),
        "static" | "none" | "disabled" => Ok(Arc::new(StaticClient)),
        other => {
            tracing::warn!("Unknown AI provider '{}', using StaticClient", other);
            Ok(Arc::new(StaticClient))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_quota_message() {
        assert!(is_quota_message("HTTP 429 Too Many Requests"));
        assert!(is_quota_message("Quota exceeded for model"));
        assert!(is_quota_message("Resource has been exhausted"));
        assert!(is_quota_message("rate limit reached"));
        assert!(!is_quota_message("connection refused"));
        assert!(!is_quota_message("invalid API key"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_static_client_reply_is_valid_json() {
        let client = StaticClient;
        let reply = client.generate("anything").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["structural_score"], 80);
        assert_eq!(value["issues"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_create_ai_client_static() {
        let mut config = AppConfig::default();
        config.ai_provider = "static".to_string();
        assert!(create_ai_client(&config).is_ok());
    }
}
