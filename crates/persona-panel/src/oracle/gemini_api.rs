//! GeminiOracle - Direct REST API implementation for Gemini.
//!
//! Calls the `generateContent` endpoint once per prompt, without retries.
//! The API key can be provided directly or loaded from environment variables.
//!
//! # Example
//!
//! ```rust,no_run
//! use persona_panel::oracle::{GeminiOracle, Oracle};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // From environment variable (GEMINI_API_KEY)
//! let oracle = GeminiOracle::try_from_env()?.with_timeout(Duration::from_secs(20));
//! let text = oracle.answer("こんにちは").await;
//!
//! // Direct API key
//! let oracle = GeminiOracle::new("your-api-key", "gemini-2.5-flash");
//! # Ok(())
//! # }
//! ```

use super::{Oracle, OracleError, error_message};
use crate::error::PanelError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Oracle implementation that talks to the Gemini HTTP API.
#[derive(Clone)]
pub struct GeminiOracle {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
    system_instruction: Option<String>,
}

impl GeminiOracle {
    /// Creates a new oracle with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            system_instruction: None,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `GEMINI_API_KEY` (required)
    /// - `GEMINI_MODEL` (optional, defaults to `gemini-2.5-flash`)
    pub fn try_from_env() -> Result<Self, PanelError> {
        let api_key = env::var("GEMINI_API_KEY").map_err(|_| {
            PanelError::Config("GEMINI_API_KEY environment variable not set".to_string())
        })?;

        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());

        Ok(Self::new(api_key, model))
    }

    /// Overrides the model after construction.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Points the oracle at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Adds a system instruction that will be sent alongside every request.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: self.system_instruction.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part { text: text.clone() }],
            }),
        }
    }

    /// Sends one request and returns the candidate text.
    pub async fn request(&self, prompt: &str) -> Result<String, OracleError> {
        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(self.timeout)
            .json(&self.build_request(prompt))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        parse_response_body(&body)
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    #[tracing::instrument(name = "gemini.answer", skip(self, prompt), fields(model = %self.model))]
    async fn answer(&self, prompt: &str) -> String {
        match self.request(prompt).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "Gemini request failed");
                error_message(err)
            }
        }
    }

    fn name(&self) -> String {
        format!("Gemini({})", self.model)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn parse_response_body(body: &str) -> Result<String, OracleError> {
    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|err| {
        tracing::warn!(error = %err, "Gemini response does not match the expected schema");
        OracleError::MalformedResponse
    })?;
    extract_text_response(parsed)
}

fn extract_text_response(response: GenerateContentResponse) -> Result<String, OracleError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

fn map_http_error(status: StatusCode, body: &str) -> OracleError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string());

    OracleError::Status {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::is_error_response;

    #[test]
    fn test_gemini_oracle_creation() {
        let oracle = GeminiOracle::new("test-key", "gemini-2.5-flash");
        assert_eq!(oracle.model(), "gemini-2.5-flash");
        assert_eq!(oracle.timeout(), DEFAULT_TIMEOUT);
        assert!(oracle.system_instruction.is_none());
        assert_eq!(oracle.name(), "Gemini(gemini-2.5-flash)");
    }

    #[test]
    fn test_builder_methods() {
        let oracle = GeminiOracle::new("test-key", "gemini-2.5-flash")
            .with_model("gemini-2.5-pro")
            .with_timeout(Duration::from_secs(5))
            .with_base_url("http://localhost:8080/models/")
            .with_system_instruction("日本語で答えてください");

        assert_eq!(oracle.model(), "gemini-2.5-pro");
        assert_eq!(oracle.timeout(), Duration::from_secs(5));
        assert_eq!(oracle.base_url, "http://localhost:8080/models");
        assert_eq!(
            oracle.system_instruction.as_deref(),
            Some("日本語で答えてください")
        );
    }

    #[test]
    fn test_request_serialization() {
        let oracle = GeminiOracle::new("k", "m").with_system_instruction("sys");
        let json = serde_json::to_string(&oracle.build_request("Hello")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(json.contains("\"text\":\"Hello\""));
        assert!(json.contains("\"systemInstruction\":{\"parts\":[{\"text\":\"sys\"}]}"));
    }

    #[test]
    fn test_request_serialization_without_system_instruction() {
        let oracle = GeminiOracle::new("k", "m");
        let json = serde_json::to_string(&oracle.build_request("Hello")).unwrap();
        assert!(!json.contains("systemInstruction"));
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{
            "candidates": [{
                "content": {
                    "parts": [{"text": "Hello, "}, {"text": "world!"}]
                }
            }]
        }"#;
        assert_eq!(parse_response_body(json).unwrap(), "Hello, world!");
    }

    #[test]
    fn test_response_parsing_empty_candidates() {
        assert_eq!(
            parse_response_body(r#"{"candidates": []}"#),
            Err(OracleError::EmptyResponse)
        );
        assert_eq!(parse_response_body("{}"), Err(OracleError::EmptyResponse));
    }

    #[test]
    fn test_response_parsing_schema_mismatch() {
        for body in [r#"{"candidates": "nope"}"#, "<html>"] {
            assert_eq!(
                parse_response_body(body),
                Err(OracleError::MalformedResponse)
            );
        }
    }

    #[test]
    fn test_error_parsing() {
        let json = r#"{
            "error": {
                "code": 400,
                "message": "Invalid API key",
                "status": "INVALID_ARGUMENT"
            }
        }"#;

        match map_http_error(StatusCode::BAD_REQUEST, json) {
            OracleError::Status { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "INVALID_ARGUMENT: Invalid API key");
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[test]
    fn test_error_parsing_plain_body() {
        match map_http_error(StatusCode::BAD_GATEWAY, "upstream down") {
            OracleError::Status { status, message } => {
                assert_eq!(status, 502);
                assert_eq!(message, "upstream down");
            }
            other => panic!("Expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_returns_marked_string() {
        // Port 9 (discard) is closed on test machines; the connection is refused.
        let oracle = GeminiOracle::new("k", "m")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout(Duration::from_secs(2));

        let text = oracle.answer("hello").await;
        assert!(is_error_response(&text), "unexpected response: {text}");
    }
}
