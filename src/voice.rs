//! Voice-call handoff.
//!
//! 1. Compress the consultation prompt into one focused search query.
//!    A failed model call falls back to a templated query.
//! 2. Retrieve up to [`HANDOFF_LIMIT`] hits for that query.
//! 3. Place one outbound call. A failed call is reported inside the success
//!    body as `vapi_response: {"error": ...}`.
//!
//! By default the call payload carries only the assistant, number and
//! customer. With `vapi.forward_context` the focused query and retrieved
//! hits are passed as assistant variable values.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::error::BridgeResult;
use crate::models::{ContentPart, SearchHit, Status};
use crate::search::{Envelope, ErrorEnvelope};
use crate::traits::{Generator, VectorStore, VoiceClient};
use crate::vapi;

pub const HANDOFF_LIMIT: usize = 5;

/// Characters of the prompt used in the fallback query.
const FALLBACK_PROMPT_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct HandoffResponse {
    pub message: String,
    pub original_prompt: String,
    pub focused_query: String,
    pub extracted_data: Vec<SearchHit>,
    pub data_count: usize,
    pub phone_number: Option<String>,
    pub vapi_response: Value,
    pub status: Status,
}

/// Prompt asking the model for a single focused query.
pub fn focused_query_prompt(original_prompt: &str) -> String {
    format!(
        "You are a query generation expert for a vector database. Your task is to create a focused, \
specific query that will retrieve only the most relevant information from the database for a voice AI \
consultation.

Original consultation prompt: \"{}\"

Based on this consultation prompt, generate a single, focused query that will:
1. Retrieve only the most relevant context for the specific business challenge
2. Focus on actionable insights and strategies
3. Provide context that would be useful for a voice AI consultation
4. Avoid generic information and focus on specific, actionable advice

The query should be:
- Specific to the business challenge mentioned
- Focused on practical strategies and insights
- Suitable for a voice AI to provide personalized advice
- Concise but comprehensive

Generate only the query text, nothing else.",
        original_prompt
    )
}

/// Query used when the model cannot produce one.
pub fn fallback_query(original_prompt: &str) -> String {
    let head: String = original_prompt.chars().take(FALLBACK_PROMPT_CHARS).collect();
    format!("Provide specific strategies and insights for: {}", head)
}

/// Ask the model for a focused query; never fails.
pub async fn generate_focused_query(generator: &dyn Generator, original_prompt: &str) -> String {
    let parts = [ContentPart::text(focused_query_prompt(original_prompt))];
    match generator.generate(&parts).await {
        Ok(text) if !text.trim().is_empty() => {
            let query = text.trim().to_string();
            tracing::info!(query = %query, "generated focused query");
            query
        }
        Ok(_) => {
            tracing::warn!("model returned an empty query, using fallback");
            fallback_query(original_prompt)
        }
        Err(e) => {
            tracing::warn!(error = %e, "focused query generation failed, using fallback");
            fallback_query(original_prompt)
        }
    }
}

/// Assistant variables carrying the retrieved context.
pub fn context_variables(focused_query: &str, hits: &[SearchHit]) -> Map<String, Value> {
    let context: Vec<&str> = hits
        .iter()
        .map(|h| h.text_property("normalized_content"))
        .filter(|c| !c.is_empty())
        .collect();
    let mut vars = Map::new();
    vars.insert("focused_query".to_string(), json!(focused_query));
    vars.insert("context".to_string(), json!(context.join("\n\n---\n\n")));
    vars
}

/// Run the full handoff.
pub async fn run_handoff(
    config: &Config,
    generator: &dyn Generator,
    store: &dyn VectorStore,
    voice: &dyn VoiceClient,
    prompt: &str,
    phone_number: Option<&str>,
) -> Envelope<HandoffResponse> {
    let preview: String = prompt.chars().take(200).collect();
    tracing::info!(prompt = %preview, phone = phone_number.unwrap_or(""), "voice handoff started");

    let focused_query = generate_focused_query(generator, prompt).await;

    let session = match store.connect().await {
        Ok(s) => s,
        Err(e) => return Envelope::Err(ErrorEnvelope::connect_failed(&e)),
    };
    let result = session.search_documents(&focused_query, HANDOFF_LIMIT).await;
    session.close().await;

    let extracted_data: Vec<SearchHit> = match result {
        Ok(hits) => hits.iter().map(SearchHit::with_stringified_properties).collect(),
        Err(e) => {
            return Envelope::Err(ErrorEnvelope::new(
                format!("Error generating voice context: {}", e),
                &e,
            ))
        }
    };
    tracing::info!(hits = extracted_data.len(), "retrieved handoff context");

    let call = place_call(config, voice, phone_number, &focused_query, &extracted_data).await;
    let vapi_response = match call {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, "placing call failed");
            json!({ "error": e.to_string() })
        }
    };

    Envelope::Ok(HandoffResponse {
        message: "Voice context extracted and call placed".to_string(),
        original_prompt: prompt.to_string(),
        focused_query,
        data_count: extracted_data.len(),
        extracted_data,
        phone_number: phone_number.map(str::to_string),
        vapi_response,
        status: Status::Success,
    })
}

async fn place_call(
    config: &Config,
    voice: &dyn VoiceClient,
    phone_number: Option<&str>,
    focused_query: &str,
    hits: &[SearchHit],
) -> BridgeResult<Value> {
    let variables = config
        .vapi
        .forward_context
        .then(|| context_variables(focused_query, hits));
    let call = vapi::call_request(&config.secrets, phone_number, variables)?;
    voice.place_call(&call).await
}
