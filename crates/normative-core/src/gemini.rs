use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SuggestError;
use crate::retry::{send_with_retry, HttpReply, RetryPolicy};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub default_timeout: Duration,
    /// First backoff delay; later delays double it.
    pub initial_backoff: Duration,
    pub max_error_body_bytes: usize,
    pub temperature: f32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(1_000),
            max_error_body_bytes: 8 * 1024,
            temperature: 0.2,
        }
    }
}

impl GeminiConfig {
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let default_timeout = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let initial_backoff = std::env::var("GEMINI_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(1_000));

        let max_error_body_bytes = std::env::var("GEMINI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        let temperature = std::env::var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(0.2);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            default_timeout,
            initial_backoff,
            max_error_body_bytes,
            temperature,
        }
    }
}

/// Thin client for the `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, SuggestError> {
        let http = reqwest::Client::builder()
            .user_agent("normative-assistant")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        )
    }

    /// POST `request` with retries and return the raw body of the successful response.
    pub async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
        policy: &RetryPolicy,
    ) -> Result<String, SuggestError> {
        let url = self.endpoint();
        let reply = send_with_retry(policy, |attempt| {
            let url = url.as_str();
            async move {
                debug!(attempt, model = %self.config.model, "sending generateContent request");
                let resp = self
                    .http
                    .post(url)
                    .timeout(self.config.default_timeout)
                    .header("x-goog-api-key", api_key)
                    .json(request)
                    .send()
                    .await
                    .map_err(|e| SuggestError::TransientNetwork(e.to_string()))?;

                let status = resp.status().as_u16();
                let body = if resp.status().is_success() {
                    resp.text()
                        .await
                        .map_err(|e| SuggestError::TransientNetwork(e.to_string()))?
                } else {
                    read_limited_text(resp, self.config.max_error_body_bytes).await
                };
                Ok(HttpReply { status, body })
            }
        })
        .await?;
        Ok(reply.body)
    }
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    match resp.bytes().await {
        Ok(b) => {
            let end = b.len().min(max_bytes);
            String::from_utf8_lossy(&b[..end]).to_string()
        }
        Err(e) => {
            warn!(error = %e, "failed to read AI service error body");
            "<failed to read error body>".to_string()
        }
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a generateContent response body.
///
/// The text is itself a JSON document; decoding it is left to the caller.
pub fn extract_candidate_text(body: &str) -> Result<String, SuggestError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| SuggestError::AiResponseFormat(format!("response body is not valid JSON: {e}")))?;

    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| {
            SuggestError::AiResponseFormat(
                "missing candidates[0].content.parts[0].text".to_string(),
            )
        })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;

    fn client_for(server: &MockServer) -> GeminiClient {
        let config = GeminiConfig {
            base_url: server.base_url(),
            model: "test-model".to_string(),
            initial_backoff: Duration::from_millis(1),
            ..GeminiConfig::default()
        };
        GeminiClient::new(config).expect("client builds")
    }

    fn request() -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text("prompt")],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: json!({"type": "OBJECT"}),
                temperature: Some(0.2),
            },
            system_instruction: None,
        }
    }

    #[test]
    fn extracts_nested_candidate_text() {
        let body = json!({
            "candidates": [{"content": {"parts": [{"text": "{\"relevantIDs\":[\"a\"]}"}]}}]
        })
        .to_string();
        assert_eq!(extract_candidate_text(&body).unwrap(), r#"{"relevantIDs":["a"]}"#);
    }

    #[test]
    fn missing_candidates_is_a_format_error() {
        for body in ["{}", r#"{"candidates":[]}"#, r#"{"candidates":[{"content":{"parts":[]}}]}"#, "not json"] {
            let err = extract_candidate_text(body).unwrap_err();
            assert!(matches!(err, SuggestError::AiResponseFormat(_)), "{body}: {err:?}");
        }
    }

    #[test]
    fn request_serializes_with_camel_case_fields() {
        let value = serde_json::to_value(request()).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert!(value.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn posts_to_generate_content_with_api_key_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/test-model:generateContent")
                    .header("x-goog-api-key", "test-key");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"candidates":[]}"#);
            })
            .await;

        let body = client_for(&server)
            .generate_content("test-key", &request(), &RetryPolicy::default())
            .await
            .expect("request succeeds");

        assert_eq!(body, r#"{"candidates":[]}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_error_is_not_retried_and_carries_service_message() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/models/test-model:generateContent");
                then.status(400)
                    .body(r#"{"error":{"code":400,"message":"API key not valid."}}"#);
            })
            .await;

        let err = client_for(&server)
            .generate_content("bad-key", &request(), &RetryPolicy::default())
            .await
            .unwrap_err();

        match err {
            SuggestError::NonRetryableService { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/models/test-model:generateContent");
                then.status(503).body("overloaded");
            })
            .await;

        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let err = client_for(&server)
            .generate_content("k", &request(), &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, SuggestError::RetriesExhausted { attempts: 3, .. }), "{err:?}");
        mock.assert_hits_async(3).await;
    }
}
