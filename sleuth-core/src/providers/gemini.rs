//! Google Gemini `generateContent` client.
//!
//! Requests go through the shared [`HttpClient`] with the configured retry
//! policy. Authentication uses the `x-goog-api-key` header.

use crate::config::{LlmConfig, RetryConfig};
use crate::error::{AgentError, CredentialError};
use crate::http::{HttpClient, HttpRequest};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// The default Google Gemini API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Resolve the API key: inline value first, then the configured env var.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, CredentialError> {
    let key = match &config.api_key {
        Some(key) => key.clone(),
        None => std::env::var(&config.api_key_env).map_err(|_| CredentialError::EnvVarMissing {
            var: config.api_key_env.clone(),
        })?,
    };
    if key.trim().is_empty() {
        return Err(CredentialError::Empty {
            var: config.api_key_env.clone(),
        });
    }
    Ok(key)
}

/// A web page the model grounded its answer on.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingChunk {
    pub uri: String,
    pub title: String,
}

/// A span of the answer text backed by one or more chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingSupport {
    pub start_index: usize,
    pub end_index: usize,
    pub text: String,
    pub chunk_indices: Vec<usize>,
}

/// Text plus grounding metadata from a search-enabled request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroundedResponse {
    pub text: String,
    pub chunks: Vec<GroundingChunk>,
    pub supports: Vec<GroundingSupport>,
}

pub struct GeminiClient {
    http: Arc<HttpClient>,
    retry: RetryConfig,
    base_url: String,
    api_key: String,
    temperature: f32,
}

impl GeminiClient {
    /// Create a client, reading the API key per [`resolve_api_key`].
    pub fn new(
        config: &LlmConfig,
        retry: RetryConfig,
        http: Arc<HttpClient>,
    ) -> Result<Self, CredentialError> {
        let api_key = resolve_api_key(config)?;
        Ok(Self::new_with_key(config, retry, http, api_key))
    }

    pub fn new_with_key(
        config: &LlmConfig,
        retry: RetryConfig,
        http: Arc<HttpClient>,
        api_key: String,
    ) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            http,
            retry,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
        }
    }

    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    /// Ask for JSON output and decode it into `T`.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<T, AgentError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": self.temperature,
                "responseMimeType": "application/json",
            },
        });
        let response = self.generate(model, body).await?;
        let text = parse_text(&response)?;
        serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            AgentError::malformed(format!("model returned invalid JSON: {e}")).with_cause(e)
        })
    }

    /// Plain text generation.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> Result<String, AgentError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"temperature": self.temperature},
        });
        let response = self.generate(model, body).await?;
        parse_text(&response)
    }

    /// Text generation with the `google_search` tool enabled.
    pub async fn generate_grounded(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<GroundedResponse, AgentError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "tools": [{"google_search": {}}],
            "generationConfig": {"temperature": 0},
        });
        let response = self.generate(model, body).await?;
        let text = parse_text(&response)?;
        let (chunks, supports) = parse_grounding(&response);
        Ok(GroundedResponse {
            text,
            chunks,
            supports,
        })
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value, AgentError> {
        let request = HttpRequest::post(self.endpoint(model))
            .header("x-goog-api-key", self.api_key.as_str())
            .json(body);
        debug!(model, "Sending Gemini request");
        let response = self.http.request_with_retry(&request, &self.retry).await?;
        Ok(response.json::<Value>()?)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_text(body: &Value) -> Result<String, AgentError> {
    let candidate = body["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| AgentError::malformed("Missing 'candidates' in response"))?;
    let parts = candidate["content"]["parts"]
        .as_array()
        .ok_or_else(|| AgentError::malformed("Missing 'parts' array in candidate content"))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}

/// Read `groundingMetadata` from the first candidate. Missing metadata is empty.
pub fn parse_grounding(body: &Value) -> (Vec<GroundingChunk>, Vec<GroundingSupport>) {
    let metadata = &body["candidates"][0]["groundingMetadata"];
    let chunks = metadata["groundingChunks"]
        .as_array()
        .map(|chunks| {
            chunks
                .iter()
                .map(|c| GroundingChunk {
                    uri: c["web"]["uri"].as_str().unwrap_or_default().to_string(),
                    title: c["web"]["title"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    let supports = metadata["groundingSupports"]
        .as_array()
        .map(|supports| {
            supports
                .iter()
                .filter_map(|s| {
                    let segment = &s["segment"];
                    let end_index = segment["endIndex"].as_u64()? as usize;
                    Some(GroundingSupport {
                        start_index: segment["startIndex"].as_u64().unwrap_or(0) as usize,
                        end_index,
                        text: segment["text"].as_str().unwrap_or_default().to_string(),
                        chunk_indices: s["groundingChunkIndices"]
                            .as_array()
                            .map(|ids| {
                                ids.iter()
                                    .filter_map(Value::as_u64)
                                    .map(|i| i as usize)
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    (chunks, supports)
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use crate::config::HttpConfig;

    fn config() -> LlmConfig {
        LlmConfig {
            api_key_env: "SLEUTH_TEST_GEMINI_KEY_UNSET".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_key_is_credential_error() {
        let err = resolve_api_key(&config()).unwrap_err();
        assert!(matches!(err, CredentialError::EnvVarMissing { .. }));
        assert_eq!(AgentError::from(err).kind, ErrorKind::Authentication);
    }

    #[test]
    fn test_inline_key_wins() {
        let mut cfg = config();
        cfg.api_key = Some("inline-key".into());
        assert_eq!(resolve_api_key(&cfg).unwrap(), "inline-key");

        cfg.api_key = Some("  ".into());
        assert!(matches!(
            resolve_api_key(&cfg),
            Err(CredentialError::Empty { .. })
        ));
    }

    #[test]
    fn test_endpoint() {
        let mut cfg = config();
        cfg.base_url = Some("http://localhost:8080/v1beta/".into());
        let client = GeminiClient::new_with_key(
            &cfg,
            RetryConfig::default(),
            Arc::new(HttpClient::new(HttpConfig::default())),
            "k".into(),
        );
        assert_eq!(
            client.endpoint("gemini-2.0-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_parse_text_joins_parts() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}]
        });
        assert_eq!(parse_text(&body).unwrap(), "Hello, world");
    }

    #[test]
    fn test_parse_text_missing_candidates() {
        let err = parse_text(&json!({"error": "nope"})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DataCorruption);
    }

    #[test]
    fn test_parse_grounding() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "Fusion works."}]},
                "groundingMetadata": {
                    "groundingChunks": [
                        {"web": {"uri": "https://iter.org/a", "title": "iter.org"}},
                        {"web": {"uri": "https://nature.com/b", "title": "nature.com"}}
                    ],
                    "groundingSupports": [{
                        "segment": {"startIndex": 0, "endIndex": 13, "text": "Fusion works."},
                        "groundingChunkIndices": [0, 1]
                    }]
                }
            }]
        });
        let (chunks, supports) = parse_grounding(&body);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].title, "nature.com");
        assert_eq!(supports[0].end_index, 13);
        assert_eq!(supports[0].chunk_indices, vec![0, 1]);
    }

    #[test]
    fn test_parse_grounding_absent() {
        let (chunks, supports) = parse_grounding(&json!({"candidates": [{}]}));
        assert!(chunks.is_empty());
        assert!(supports.is_empty());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }
}
