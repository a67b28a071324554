//! Client for the Gemini `generateContent` REST API.
//!
//! The credential is appended to the configured endpoint as the `key` query
//! parameter, so the endpoint is expected to end with `?key=` (the default does).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::request::{GenerationRequest, LlmProvider};
use crate::error::LlmError;

/// Default `generateContent` endpoint, waiting for the key to be appended.
pub const DEFAULT_GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent?key=";

/// Client for the Gemini API.
pub struct GeminiClient {
    endpoint: String,
    http_client: Client,
}

impl GeminiClient {
    /// Create a client for `endpoint` with the given HTTP timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.endpoint, urlencoding::encode(key))
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    contents: Vec<ApiContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct ApiContent<'a> {
    role: &'static str,
    parts: Vec<ApiPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiGenerationConfig {
    temperature: f64,
    #[serde(rename = "topP")]
    top_p: f64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiCandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ApiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
fn first_candidate_text(response: ApiResponse) -> Result<String, LlmError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ParseError("No candidates in response".to_string()))?;

    let finish_reason = candidate.finish_reason.unwrap_or_default();
    candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
        .and_then(|part| part.text)
        .ok_or_else(|| {
            LlmError::ParseError(format!(
                "Candidate has no text part (finishReason: {})",
                if finish_reason.is_empty() { "unknown" } else { &finish_reason }
            ))
        })
}

#[async_trait]
impl LlmProvider for GeminiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
        let body = ApiRequest {
            contents: vec![ApiContent {
                role: "USER",
                parts: vec![ApiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: ApiGenerationConfig {
                temperature: request.sampling.temperature(),
                top_p: request.sampling.top_p(),
            },
        };

        let http_response = self
            .http_client
            .post(self.url_for(request.credential.expose()))
            .json(&body)
            .send()
            .await
            // reqwest errors carry the URL, which carries the key
            .map_err(|e| LlmError::RequestFailed(e.without_url().to_string()))?;

        let status = http_response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| {
                LlmError::ParseError(format!(
                    "Failed to parse API response: {}",
                    e.without_url()
                ))
            })?;

        first_candidate_text(api_response)
    }
}
