//! Gemini Provider
//!
//! Calls the Generative Language REST API (`models/{model}:generateContent`)
//! with a key supplied per request, so one client serves every pooled key.

use crate::config::ProviderConfig;
use crate::error::{BotError, Result};
use crate::provider::rate_limit::is_rate_limit_error;
use crate::provider::Provider;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// generateContent request body
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<OutgoingPart<'a>>,
}

#[derive(Debug, Serialize)]
struct OutgoingPart<'a> {
    text: &'a str,
}

/// generateContent response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,

    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<IncomingPart>,
}

#[derive(Debug, Deserialize)]
struct IncomingPart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// Error envelope returned with non-success statuses
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(BotError::Response(format!("Prompt blocked: {}", reason)));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Response("Response contained no candidates".to_string()))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(BotError::Response(format!(
                "Empty reply (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(text)
    }
}

/// HTTP client for the Gemini API
pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
}

impl GeminiProvider {
    /// Create a new provider client
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| BotError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            model
        )
    }

    /// Single generateContent call
    pub async fn generate_text(&self, secret: &str, model: &str, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![OutgoingPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .header(API_KEY_HEADER, secret)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&response_body);
            if is_rate_limit_error(status.as_u16(), &response_body) {
                return Err(BotError::RateLimited(message));
            }
            return Err(BotError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateResponse = serde_json::from_str(&response_body).map_err(|e| {
            BotError::Response(format!(
                "Failed to parse response: {}. Body: {}",
                e,
                truncate(&response_body, 500)
            ))
        })?;

        parsed.into_text()
    }

    async fn probe_key(&self, secret: &str) -> bool {
        let timeout = self.config.probe_timeout();
        let call = self.generate_text(secret, &self.config.probe_model, &self.config.probe_prompt);

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => !text.trim().is_empty(),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "API key probe failed");
                false
            }
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "API key probe timed out");
                false
            }
        }
    }
}

impl Provider for GeminiProvider {
    fn generate<'a>(
        &'a self,
        secret: &'a str,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        self.generate_text(secret, model, prompt).boxed()
    }

    fn probe<'a>(&'a self, secret: &'a str) -> BoxFuture<'a, bool> {
        self.probe_key(secret).boxed()
    }
}

/// Best-effort human readable message from an error body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{} ({})", envelope.error.message, status),
            None => envelope.error.message,
        },
        Err(_) => truncate(body, 500).to_string(),
    }
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "AIzaSyTestKey000000000000";
    const PATH: &str = "/models/gemini-2.5-flash:generateContent";

    fn provider(base_url: String) -> GeminiProvider {
        GeminiProvider::new(ProviderConfig {
            base_url,
            probe_timeout_secs: 2,
            ..ProviderConfig::default()
        })
        .unwrap()
    }

    fn reply_body(text: &str) -> String {
        serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_generate_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header(API_KEY_HEADER, KEY)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "contents": [{ "parts": [{ "text": "hello" }] }]
            })))
            .with_status(200)
            .with_body(reply_body("Hi there!"))
            .create_async()
            .await;

        let text = provider(server.url())
            .generate_text(KEY, "gemini-2.5-flash", "hello")
            .await
            .unwrap();

        assert_eq!(text, "Hi there!");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_quota_error_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(429)
            .with_body(
                r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#,
            )
            .create_async()
            .await;

        let err = provider(server.url())
            .generate_text(KEY, "gemini-2.5-flash", "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::RateLimited(_)));
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[tokio::test]
    async fn test_invalid_key_is_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(400)
            .with_body(r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .generate_text(KEY, "gemini-2.5-flash", "hello")
            .await
            .unwrap_err();

        match err {
            BotError::Provider { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "API key not valid (INVALID_ARGUMENT)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_candidates_is_response_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#)
            .create_async()
            .await;

        let err = provider(server.url())
            .generate_text(KEY, "gemini-2.5-flash", "hello")
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::Response(_)));
    }

    #[tokio::test]
    async fn test_probe() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PATH)
            .match_header(API_KEY_HEADER, KEY)
            .with_status(200)
            .with_body(reply_body("test"))
            .create_async()
            .await;
        server
            .mock("POST", PATH)
            .match_header(API_KEY_HEADER, "AIzaSyRevokedKey00000000")
            .with_status(403)
            .with_body(r#"{"error":{"code":403,"message":"Permission denied"}}"#)
            .create_async()
            .await;

        let provider = provider(server.url());
        assert!(provider.probe(KEY).await);
        assert!(!provider.probe("AIzaSyRevokedKey00000000").await);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "h");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
