//! Read-side operations over the stored documents.
//!
//! Each operation opens its own vector-store session, runs one query, closes
//! the session, and returns a typed [`Envelope`]. Used by both the CLI
//! (`consult search`, `consult rag`, `consult agent`) and the HTTP routes.

use serde::Serialize;

use crate::error::BridgeError;
use crate::models::{SearchHit, Status};
use crate::traits::{VectorSession, VectorStore};

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
pub const DEFAULT_RAG_LIMIT: usize = 3;
pub const DEFAULT_GROUPED_TASK: &str =
    "Generate a comprehensive response based on the retrieved documents";

/// Characters of `normalized_content` kept in fallback previews.
const PREVIEW_CHARS: usize = 500;

/// Either an operation's success body or an error body. Both carry a
/// `status` field; HTTP status is always 200.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Ok(T),
    Err(ErrorEnvelope),
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Ok(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub message: String,
    pub status: Status,
    pub error_kind: &'static str,
    /// Upstream detail, kept apart from `message` where the route reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, err: &BridgeError) -> Self {
        Self {
            message: message.into(),
            status: Status::Error,
            error_kind: err.kind(),
            error: None,
        }
    }

    /// Fixed `message` with the error's detail under `error`.
    pub fn with_detail(message: impl Into<String>, err: &BridgeError) -> Self {
        Self {
            error: Some(err.detail()),
            ..Self::new(message, err)
        }
    }

    /// The connect-failure body shared by every read endpoint.
    pub fn connect_failed(err: &BridgeError) -> Self {
        tracing::warn!(error = %err, "failed to connect to vector store");
        Self::new(format!("Failed to connect to Weaviate: {}", err), err)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub message: String,
    pub query: String,
    pub results: Vec<SearchHit>,
    pub count: usize,
    pub status: Status,
}

/// Body shared by RAG and query-agent responses.
#[derive(Debug, Clone, Serialize)]
pub struct TextResponse {
    pub message: String,
    pub query: String,
    pub response: String,
    pub status: Status,
}

/// Content preview used by the generate fallback.
#[derive(Debug, Clone, Serialize)]
pub struct HitPreview {
    pub id: String,
    pub content: String,
    pub session_id: String,
    pub original_prompt: String,
}

impl HitPreview {
    fn from_hit(hit: &SearchHit) -> Self {
        Self {
            id: hit.id.clone(),
            content: preview(hit.text_property("normalized_content")),
            session_id: hit.text_property("session_id").to_string(),
            original_prompt: hit.text_property("original_prompt").to_string(),
        }
    }
}

/// First [`PREVIEW_CHARS`] characters followed by `...`, or the whole text
/// when it is short enough.
pub fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateTestResponse {
    pub message: String,
    pub query: String,
    pub limit: usize,
    pub grouped_task: String,
    pub response: String,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<HitPreview>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generate_error: Option<String>,
    pub status: Status,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerativeCheckResponse {
    pub message: String,
    pub response: Option<String>,
    pub status: Status,
}

/// The grouped task used for RAG answers.
pub fn rag_task(query: &str) -> String {
    format!(
        "Based on the retrieved documents, provide a comprehensive answer to: {}",
        query
    )
}

/// Semantic search, up to `limit` ranked hits.
pub async fn search_documents(
    store: &dyn VectorStore,
    query: &str,
    limit: usize,
) -> Envelope<SearchResponse> {
    let session = match store.connect().await {
        Ok(s) => s,
        Err(e) => return Envelope::Err(ErrorEnvelope::connect_failed(&e)),
    };
    let result = session.search_documents(query, limit).await;
    session.close().await;

    match result {
        Ok(results) => {
            tracing::info!(query, hits = results.len(), "search completed");
            Envelope::Ok(SearchResponse {
                message: "Search completed successfully".to_string(),
                query: query.to_string(),
                count: results.len(),
                results,
                status: Status::Success,
            })
        }
        Err(e) => Envelope::Err(ErrorEnvelope::new(
            format!("Error searching documents: {}", e),
            &e,
        )),
    }
}

/// Retrieval-augmented answer over the top `limit` hits.
pub async fn generate_response(
    store: &dyn VectorStore,
    query: &str,
    limit: usize,
) -> Envelope<TextResponse> {
    let session = match store.connect().await {
        Ok(s) => s,
        Err(e) => return Envelope::Err(ErrorEnvelope::connect_failed(&e)),
    };
    let result = session.generate_grouped(query, limit, &rag_task(query)).await;
    session.close().await;

    match result {
        Ok(generation) => Envelope::Ok(TextResponse {
            message: "RAG response generated successfully".to_string(),
            query: query.to_string(),
            response: generation
                .text
                .unwrap_or_else(|| "No response generated".to_string()),
            status: Status::Success,
        }),
        Err(e) => Envelope::Err(ErrorEnvelope::new(
            format!("Error generating RAG response: {}", e),
            &e,
        )),
    }
}

/// Ask the hosted query agent.
pub async fn query_with_agent(store: &dyn VectorStore, query: &str) -> Envelope<TextResponse> {
    let session = match store.connect().await {
        Ok(s) => s,
        Err(e) => return Envelope::Err(ErrorEnvelope::connect_failed(&e)),
    };
    let result = session.query_with_agent(query).await;
    session.close().await;

    match result {
        Ok(answer) => Envelope::Ok(TextResponse {
            message: "Query Agent response generated successfully".to_string(),
            query: query.to_string(),
            response: answer,
            status: Status::Success,
        }),
        Err(e) => Envelope::Err(ErrorEnvelope::new(
            format!("Error with Query Agent: {}", e),
            &e,
        )),
    }
}

/// Run a grouped generation directly. When generation fails, fall back to a
/// plain search and return previews with `partial_success`.
pub async fn test_generate(
    store: &dyn VectorStore,
    query: &str,
    limit: usize,
    grouped_task: &str,
) -> Envelope<GenerateTestResponse> {
    let session = match store.connect().await {
        Ok(s) => s,
        Err(e) => return Envelope::Err(ErrorEnvelope::connect_failed(&e)),
    };
    let result = generate_or_fallback(session.as_ref(), query, limit, grouped_task).await;
    session.close().await;
    result
}

async fn generate_or_fallback(
    session: &dyn VectorSession,
    query: &str,
    limit: usize,
    grouped_task: &str,
) -> Envelope<GenerateTestResponse> {
    let gen_error = match session.generate_grouped(query, limit, grouped_task).await {
        Ok(generation) => {
            return Envelope::Ok(GenerateTestResponse {
                message: "Direct grouped generation completed successfully".to_string(),
                query: query.to_string(),
                limit,
                grouped_task: grouped_task.to_string(),
                response: generation
                    .text
                    .unwrap_or_else(|| "No response generated".to_string()),
                method: "generate.near_text",
                search_results: None,
                generate_error: None,
                status: Status::Success,
            })
        }
        Err(e) => e,
    };

    tracing::warn!(error = %gen_error, "grouped generation failed, falling back to search");
    match session.search_documents(query, limit).await {
        Ok(hits) => {
            let previews: Vec<HitPreview> = hits.iter().map(HitPreview::from_hit).collect();
            Envelope::Ok(GenerateTestResponse {
                message: "Generate failed, returning search results instead".to_string(),
                query: query.to_string(),
                limit,
                grouped_task: grouped_task.to_string(),
                response: format!("Found {} relevant documents", previews.len()),
                method: "fallback_search",
                search_results: Some(previews),
                generate_error: Some(gen_error.to_string()),
                status: Status::PartialSuccess,
            })
        }
        Err(e) => Envelope::Err(ErrorEnvelope::new(
            format!("Error in direct generate test: {}", e),
            &e,
        )),
    }
}

/// Smoke-test the collection's generative module with a fixed task.
pub async fn check_generative(store: &dyn VectorStore) -> Envelope<GenerativeCheckResponse> {
    let session = match store.connect().await {
        Ok(s) => s,
        Err(e) => return Envelope::Err(ErrorEnvelope::connect_failed(&e)),
    };
    let result = session.generate_grouped("test query", 1, "Say hello").await;
    session.close().await;

    match result {
        Ok(generation) => Envelope::Ok(GenerativeCheckResponse {
            message: "Generative module test successful".to_string(),
            response: generation.text,
            status: Status::Success,
        }),
        Err(e) => Envelope::Err(ErrorEnvelope::with_detail("Generative module test failed", &e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_truncates_by_chars() {
        assert_eq!(preview("short"), "short");
        let long = "é".repeat(600);
        let p = preview(&long);
        assert_eq!(p.chars().count(), 503);
        assert!(p.ends_with("..."));
        assert_eq!(preview(&"a".repeat(500)), "a".repeat(500));
    }

    #[test]
    fn test_rag_task() {
        assert_eq!(
            rag_task("pricing"),
            "Based on the retrieved documents, provide a comprehensive answer to: pricing"
        );
    }

    #[test]
    fn test_envelope_serializes_untagged() {
        let err = BridgeError::config("WEAVIATE_URL missing");
        let env: Envelope<TextResponse> = Envelope::Err(ErrorEnvelope::new("Failed", &err));
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            json!({"message": "Failed", "status": "error", "error_kind": "config"})
        );
        assert!(!env.is_ok());
    }

    #[test]
    fn test_error_envelope_with_detail() {
        let err = BridgeError::upstream("weaviate", "module missing");
        let value = serde_json::to_value(ErrorEnvelope::with_detail("Check failed", &err)).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "Check failed",
                "status": "error",
                "error_kind": "upstream",
                "error": "module missing"
            })
        );
    }
}
