//! Vapi voice-AI API client.
//!
//! Covers the four endpoints this crate uses:
//! - `POST /call`: place an outbound call ([`VoiceClient`]).
//! - `POST /assistant`, `GET /assistant`: create or list assistants.
//! - `POST /phone-number`: provision a number bound to an assistant.
//!
//! All requests authenticate with `Authorization: Bearer $VAPI_API_KEY`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{Secrets, VapiConfig};
use crate::error::{transport, BridgeError, BridgeResult};
use crate::traits::{CallRequest, VoiceClient};

const SERVICE: &str = "vapi";

pub struct VapiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl VapiClient {
    /// Build a client authenticated with `VAPI_API_KEY`.
    pub fn new(config: &VapiConfig, secrets: &Secrets) -> BridgeResult<Self> {
        let api_key = secrets
            .vapi_api_key
            .clone()
            .ok_or_else(|| BridgeError::config("VAPI_API_KEY not set"))?;
        Self::with_key(config, &api_key)
    }

    /// Build a client for an explicit key (used when probing keys).
    pub fn with_key(config: &VapiConfig, api_key: &str) -> BridgeResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build().map_err(transport(SERVICE))?,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
    }

    /// `GET /assistant`, returning the raw HTTP status alongside the body so
    /// callers can tell an invalid key (401) from other failures.
    pub async fn probe(&self) -> BridgeResult<(u16, String)> {
        let response = self
            .request(reqwest::Method::GET, "/assistant")
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport(SERVICE))?;
        Ok((status, body))
    }

    pub async fn list_assistants(&self) -> BridgeResult<Vec<AssistantSummary>> {
        let response = self
            .request(reqwest::Method::GET, "/assistant")
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let body = read_json(response).await?;
        serde_json::from_value(body).map_err(|e| {
            BridgeError::upstream(SERVICE, format!("unexpected assistant list: {}", e))
        })
    }

    /// Create an assistant and return its id.
    pub async fn create_assistant(&self, spec: &AssistantSpec) -> BridgeResult<String> {
        let response = self
            .request(reqwest::Method::POST, "/assistant")
            .json(&spec.to_body())
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let body = read_json(response).await?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::upstream(SERVICE, "assistant response has no id"))
    }

    pub async fn create_phone_number(
        &self,
        assistant_id: &str,
        area_code: &str,
    ) -> BridgeResult<PhoneNumber> {
        let response = self
            .request(reqwest::Method::POST, "/phone-number")
            .json(&json!({
                "provider": "vapi",
                "assistantId": assistant_id,
                "numberDesiredAreaCode": area_code,
            }))
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let body = read_json(response).await?;
        serde_json::from_value(body).map_err(|e| {
            BridgeError::upstream(SERVICE, format!("unexpected phone number: {}", e))
        })
    }
}

async fn read_json(response: reqwest::Response) -> BridgeResult<Value> {
    let status = response.status();
    let text = response.text().await.map_err(transport(SERVICE))?;
    if !status.is_success() {
        return Err(BridgeError::upstream(
            SERVICE,
            format!("HTTP {}: {}", status, text),
        ));
    }
    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&text)
        .map_err(|e| BridgeError::upstream(SERVICE, format!("invalid JSON response: {}", e)))
}

/// JSON body for `POST /call`.
pub fn call_body(call: &CallRequest) -> Value {
    let mut body = json!({
        "assistantId": call.assistant_id,
        "phoneNumberId": call.phone_number_id,
        "customer": { "number": call.customer_number },
    });
    if let Some(vars) = &call.variable_values {
        body["assistantOverrides"] = json!({ "variableValues": vars });
    }
    body
}

/// Assemble a call from the configured assistant and number ids.
pub fn call_request(
    secrets: &Secrets,
    customer_number: Option<&str>,
    variable_values: Option<serde_json::Map<String, Value>>,
) -> BridgeResult<CallRequest> {
    let assistant_id = secrets
        .vapi_assistant_id
        .clone()
        .ok_or_else(|| BridgeError::config("VAPI_ASSISTANT_ID not set"))?;
    let phone_number_id = secrets
        .vapi_phone_number_id
        .clone()
        .ok_or_else(|| BridgeError::config("VAPI_PHONE_NUMBER_ID not set"))?;
    Ok(CallRequest {
        assistant_id,
        phone_number_id,
        customer_number: customer_number.map(str::to_string),
        variable_values,
    })
}

#[async_trait]
impl VoiceClient for VapiClient {
    async fn place_call(&self, call: &CallRequest) -> BridgeResult<Value> {
        tracing::info!(
            assistant_id = %call.assistant_id,
            customer = call.customer_number.as_deref().unwrap_or(""),
            "placing outbound call"
        );
        let response = self
            .request(reqwest::Method::POST, "/call")
            .json(&call_body(call))
            .send()
            .await
            .map_err(transport(SERVICE))?;

        // The call endpoint reports failures in the JSON body; keep it
        // whatever the status so the caller sees Vapi's own message.
        let status = response.status();
        let text = response.text().await.map_err(transport(SERVICE))?;
        tracing::info!(status = status.as_u16(), "vapi call response");
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        serde_json::from_str(&text)
            .map_err(|e| BridgeError::upstream(SERVICE, format!("invalid JSON response: {}", e)))
    }
}

/// Voice client used when `VAPI_API_KEY` is missing.
pub struct UnavailableVoice {
    reason: String,
}

impl UnavailableVoice {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl VoiceClient for UnavailableVoice {
    async fn place_call(&self, _call: &CallRequest) -> BridgeResult<Value> {
        Err(BridgeError::config(self.reason.clone()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AssistantSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PhoneNumber {
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
}

/// Definition of the consultation assistant created by `consult setup`.
#[derive(Debug, Clone)]
pub struct AssistantSpec {
    pub name: String,
    pub system_prompt: String,
    pub first_message: String,
    pub model_provider: String,
    pub model: String,
    pub voice_provider: String,
    pub voice_id: String,
}

const ADVISOR_PROMPT: &str = "\
You are a veteran technology founder and startup advisor who has built a company from a \
two-person shop into a global business. Speak with a measured, thoughtful pace and natural \
pauses. Start answers with context, break the problem down logically, use concrete examples \
from building companies, and finish with pragmatic, actionable advice.

Founders call you for guidance on their specific situation. You have access to a knowledge \
base of startup material and will receive context about the caller's business challenge, \
relevant data from that knowledge base, and focused insights for their industry. Use this \
context to give personalized, actionable advice that addresses their specific needs.";

const ADVISOR_GREETING: &str = "\
Hello there! I understand you're looking for some strategic guidance on your startup. \
I've spent a long time building companies from the ground up, and I'm here to share some \
insights that might help. What specific challenge would you like to discuss first?";

impl AssistantSpec {
    /// The fixed startup-advisor persona with the configured voice.
    pub fn startup_advisor(voice_id: &str) -> Self {
        Self {
            name: "Startup Advisor".to_string(),
            system_prompt: ADVISOR_PROMPT.to_string(),
            first_message: ADVISOR_GREETING.to_string(),
            model_provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            voice_provider: "11labs".to_string(),
            voice_id: voice_id.to_string(),
        }
    }

    pub fn to_body(&self) -> Value {
        json!({
            "name": self.name,
            "model": {
                "provider": self.model_provider,
                "model": self.model,
                "messages": [{ "role": "system", "content": self.system_prompt }],
            },
            "voice": { "provider": self.voice_provider, "voiceId": self.voice_id },
            "firstMessage": self.first_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> Secrets {
        Secrets {
            vapi_api_key: Some("key".to_string()),
            vapi_assistant_id: Some("asst_1".to_string()),
            vapi_phone_number_id: Some("pn_1".to_string()),
            ..Secrets::default()
        }
    }

    #[test]
    fn test_call_body_matches_observed_payload() {
        let call = call_request(&secrets(), Some("+14155550100"), None).unwrap();
        assert_eq!(
            call_body(&call),
            json!({
                "assistantId": "asst_1",
                "phoneNumberId": "pn_1",
                "customer": {"number": "+14155550100"}
            })
        );
    }

    #[test]
    fn test_call_body_with_context() {
        let mut vars = serde_json::Map::new();
        vars.insert("focused_query".to_string(), json!("pricing"));
        let call = call_request(&secrets(), None, Some(vars)).unwrap();
        let body = call_body(&call);
        assert_eq!(body["customer"]["number"], Value::Null);
        assert_eq!(
            body["assistantOverrides"]["variableValues"]["focused_query"],
            "pricing"
        );
    }

    #[test]
    fn test_call_request_requires_ids() {
        let err = call_request(&Secrets::default(), Some("+1"), None).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("VAPI_ASSISTANT_ID"));
    }

    #[test]
    fn test_client_requires_key() {
        let err = VapiClient::new(&VapiConfig::default(), &Secrets::default())
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "VAPI_API_KEY not set");
    }

    #[test]
    fn test_assistant_body() {
        let body = AssistantSpec::startup_advisor("voice-123").to_body();
        assert_eq!(body["model"]["provider"], "openai");
        assert_eq!(body["model"]["model"], "gpt-4o");
        assert_eq!(body["model"]["messages"][0]["role"], "system");
        assert_eq!(body["voice"], json!({"provider": "11labs", "voiceId": "voice-123"}));
        assert!(body["firstMessage"].as_str().unwrap().starts_with("Hello there!"));
    }

    #[test]
    fn test_phone_number_parses_optional_number() {
        let pn: PhoneNumber =
            serde_json::from_value(json!({"id": "pn_9", "status": "active"})).unwrap();
        assert_eq!(pn.id, "pn_9");
        assert!(pn.number.is_none());
    }
}
