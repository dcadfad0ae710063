//! Seams between the route layer and the hosted services.
//!
//! Every external capability sits behind one of these traits so handlers
//! can be exercised with in-memory fakes:
//!
//! ```text
//!  HTTP handler ──▶ Generator     (Gemini generateContent)
//!               ──▶ VectorStore   ──connect()──▶ VectorSession (Weaviate)
//!               ──▶ VoiceClient   (Vapi outbound call)
//! ```
//!
//! A [`VectorStore`] hands out one owned [`VectorSession`] per request. The
//! session is used and closed inside the handler that opened it and is never
//! shared, so none of the implementations need locking.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BridgeResult;
use crate::models::{ContentPart, GroupedGeneration, NormalizedDocument, SearchHit};

/// A hosted generative model.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use consult_harness::error::BridgeResult;
/// use consult_harness::models::ContentPart;
/// use consult_harness::traits::Generator;
///
/// pub struct Echo;
///
/// #[async_trait]
/// impl Generator for Echo {
///     async fn generate(&self, parts: &[ContentPart]) -> BridgeResult<String> {
///         Ok(format!("{} parts", parts.len()))
///     }
/// }
/// ```
#[async_trait]
pub trait Generator: Send + Sync {
    /// Send all parts as a single user turn and return the model's text.
    async fn generate(&self, parts: &[ContentPart]) -> BridgeResult<String>;
}

/// Factory for request-scoped vector-store sessions.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Open a session. Fails on missing credentials or when the store is
    /// not ready.
    async fn connect(&self) -> BridgeResult<Box<dyn VectorSession>>;
}

/// An open connection to the document collection.
#[async_trait]
pub trait VectorSession: Send + Sync {
    /// Name of the collection this session reads and writes.
    fn collection(&self) -> &str;

    /// Whether the collection already exists.
    async fn collection_exists(&self) -> BridgeResult<bool>;

    /// Create the collection unless it already exists.
    ///
    /// Returns `true` when this call created it and `false` when it was
    /// already there. Calling it repeatedly never errors on an existing
    /// collection and never creates a duplicate.
    async fn create_collection(&self) -> BridgeResult<bool>;

    /// Insert one document and return its object id.
    async fn store_document(&self, doc: &NormalizedDocument) -> BridgeResult<String>;

    /// Nearest-neighbour text search, ranked, at most `limit` hits.
    async fn search_documents(&self, query: &str, limit: usize) -> BridgeResult<Vec<SearchHit>>;

    /// Retrieve `limit` hits for `query` and run one grouped generative
    /// task over them.
    async fn generate_grouped(
        &self,
        query: &str,
        limit: usize,
        task: &str,
    ) -> BridgeResult<GroupedGeneration>;

    /// Hand the whole question to the hosted query agent, scoped to this
    /// collection, and return its final answer.
    async fn query_with_agent(&self, query: &str) -> BridgeResult<String>;

    /// Release the session.
    async fn close(self: Box<Self>);
}

/// An outbound call to place through the voice API.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub assistant_id: String,
    pub phone_number_id: String,
    pub customer_number: Option<String>,
    /// Template variables handed to the assistant, if any.
    pub variable_values: Option<serde_json::Map<String, Value>>,
}

/// A hosted voice-AI API able to place outbound calls.
#[async_trait]
pub trait VoiceClient: Send + Sync {
    /// Place the call and return the API's JSON response body.
    async fn place_call(&self, call: &CallRequest) -> BridgeResult<Value>;
}
