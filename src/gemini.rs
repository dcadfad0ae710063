//! Google Gemini `generateContent` client.
//!
//! Implements [`Generator`] by sending every [`ContentPart`] as one user
//! turn to `POST {base_url}/models/{model}:generateContent`. Text parts map
//! to `{"text": ...}`; inline data is base64-encoded into
//! `{"inlineData": {"mimeType", "data"}}`.
//!
//! Requires `GEMINI_API_KEY`. Failures are not retried: a non-2xx status or
//! a response without candidate text is an upstream error.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{GeminiConfig, Secrets};
use crate::error::{transport, BridgeError, BridgeResult};
use crate::models::ContentPart;
use crate::traits::Generator;

const SERVICE: &str = "gemini";

/// Generator backed by the Gemini REST API.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `GEMINI_API_KEY` is not set.
    pub fn new(config: &GeminiConfig, secrets: &Secrets) -> BridgeResult<Self> {
        let api_key = secrets
            .gemini_api_key
            .clone()
            .ok_or_else(|| {
                BridgeError::config("GEMINI_API_KEY not found in environment variables")
            })?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(transport(SERVICE))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Generator used when the client cannot be constructed; every call fails
/// with the construction error so the server still starts.
pub struct UnavailableGenerator {
    reason: String,
}

impl UnavailableGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Generator for UnavailableGenerator {
    async fn generate(&self, _parts: &[ContentPart]) -> BridgeResult<String> {
        Err(BridgeError::config(self.reason.clone()))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<serde_json::Value>,
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

fn to_request(parts: &[ContentPart]) -> GenerateRequest {
    let parts = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text(text) => RequestPart::Text { text: text.clone() },
            ContentPart::InlineData { mime_type, data } => RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: STANDARD.encode(data),
                },
            },
        })
        .collect();

    GenerateRequest {
        contents: vec![RequestContent { role: "user", parts }],
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_response(resp: GenerateResponse) -> BridgeResult<String> {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let detail = resp
            .prompt_feedback
            .map(|f| format!("no candidates returned (feedback: {})", f))
            .unwrap_or_else(|| "no candidates returned".to_string());
        return Err(BridgeError::upstream(SERVICE, detail));
    }
    Ok(text)
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, parts: &[ContentPart]) -> BridgeResult<String> {
        let body = to_request(parts);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(BridgeError::upstream(
                SERVICE,
                format!("API error {}: {}", status, body_text),
            ));
        }

        let parsed: GenerateResponse = response.json().await.map_err(transport(SERVICE))?;
        parse_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let req = to_request(&[
            ContentPart::text("hello"),
            ContentPart::InlineData {
                mime_type: "image/png".to_string(),
                data: vec![0, 1, 2],
            },
        ]);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "hello"},
                        {"inlineData": {"mimeType": "image/png", "data": "AAEC"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_parse_joins_text_parts() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "Hello, "}, {"text": "world"}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(parse_response(resp).unwrap(), "Hello, world");
    }

    #[test]
    fn test_parse_empty_candidates_is_upstream_error() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let err = parse_response(resp).unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let err = GeminiClient::new(&GeminiConfig::default(), &Secrets::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_endpoint() {
        let secrets = Secrets {
            gemini_api_key: Some("k".to_string()),
            ..Secrets::default()
        };
        let config = GeminiConfig {
            base_url: "https://example.test/v1beta/".to_string(),
            ..GeminiConfig::default()
        };
        let client = GeminiClient::new(&config, &secrets).unwrap();
        assert_eq!(
            client.endpoint(),
            "https://example.test/v1beta/models/gemini-2.0-flash-thinking-exp:generateContent"
        );
    }

    #[tokio::test]
    async fn test_unavailable_generator_reports_reason() {
        let generator = UnavailableGenerator::new("GEMINI_API_KEY not found");
        let err = generator.generate(&[]).await.unwrap_err();
        assert_eq!(err.kind(), "config");
        assert_eq!(err.to_string(), "GEMINI_API_KEY not found");
    }
}
