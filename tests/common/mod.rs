//! In-memory fakes for the hosted-service traits.

#![allow(dead_code)]

use async_trait::async_trait;
use consult_harness::config::Config;
use consult_harness::error::{BridgeError, BridgeResult};
use consult_harness::models::{
    ContentPart, GroupedGeneration, HitMetadata, NormalizedDocument, SearchHit,
};
use consult_harness::server::AppState;
use consult_harness::traits::{
    CallRequest, Generator, VectorSession, VectorStore, VoiceClient,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

// ─── Generator ──────────────────────────────────────────────────────

pub struct FakeGenerator {
    reply: Result<String, String>,
    pub calls: Mutex<Vec<Vec<ContentPart>>>,
}

impl FakeGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self, parts: &[ContentPart]) -> BridgeResult<String> {
        self.calls.lock().unwrap().push(parts.to_vec());
        self.reply
            .clone()
            .map_err(|m| BridgeError::upstream("gemini", m))
    }
}

// ─── Vector store ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct StoreLog {
    pub created: bool,
    pub create_calls: usize,
    pub documents: Vec<NormalizedDocument>,
    /// `(query, limit)` for every search.
    pub searches: Vec<(String, usize)>,
    /// `(query, limit, task)` for every grouped generation.
    pub generations: Vec<(String, usize, String)>,
    pub agent_queries: Vec<String>,
    pub sessions_opened: usize,
    pub sessions_closed: usize,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    pub log: Arc<Mutex<StoreLog>>,
    pub hits: Vec<SearchHit>,
    pub connect_error: Option<String>,
    pub generated: Option<String>,
    pub generate_error: Option<String>,
    pub agent_answer: Option<String>,
}

impl FakeStore {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            ..Self::default()
        }
    }

    pub fn unreachable(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn log(&self) -> std::sync::MutexGuard<'_, StoreLog> {
        self.log.lock().unwrap()
    }

    fn top(&self, limit: usize) -> Vec<SearchHit> {
        self.hits.iter().take(limit).cloned().collect()
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn connect(&self) -> BridgeResult<Box<dyn VectorSession>> {
        if let Some(message) = &self.connect_error {
            return Err(BridgeError::config(message.clone()));
        }
        self.log().sessions_opened += 1;
        Ok(Box::new(FakeSession {
            store: self.clone(),
        }))
    }
}

pub struct FakeSession {
    store: FakeStore,
}

#[async_trait]
impl VectorSession for FakeSession {
    fn collection(&self) -> &str {
        "NormalizedDocuments"
    }

    async fn collection_exists(&self) -> BridgeResult<bool> {
        Ok(self.store.log().created)
    }

    async fn create_collection(&self) -> BridgeResult<bool> {
        let mut log = self.store.log();
        log.create_calls += 1;
        if log.created {
            return Ok(false);
        }
        log.created = true;
        Ok(true)
    }

    async fn store_document(&self, doc: &NormalizedDocument) -> BridgeResult<String> {
        let mut log = self.store.log();
        log.documents.push(doc.clone());
        Ok(format!("doc-{}", log.documents.len()))
    }

    async fn search_documents(&self, query: &str, limit: usize) -> BridgeResult<Vec<SearchHit>> {
        self.store.log().searches.push((query.to_string(), limit));
        Ok(self.store.top(limit))
    }

    async fn generate_grouped(
        &self,
        query: &str,
        limit: usize,
        grouped_task: &str,
    ) -> BridgeResult<GroupedGeneration> {
        self.store
            .log()
            .generations
            .push((query.to_string(), limit, grouped_task.to_string()));
        if let Some(message) = &self.store.generate_error {
            return Err(BridgeError::upstream("weaviate", message.clone()));
        }
        Ok(GroupedGeneration {
            text: self.store.generated.clone(),
            hits: self.store.top(limit),
        })
    }

    async fn query_with_agent(&self, query: &str) -> BridgeResult<String> {
        self.store.log().agent_queries.push(query.to_string());
        self.store
            .agent_answer
            .clone()
            .ok_or_else(|| BridgeError::upstream("weaviate", "agent returned no answer"))
    }

    async fn close(self: Box<Self>) {
        self.store.log().sessions_closed += 1;
    }
}

// ─── Voice ──────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeVoice {
    pub calls: Mutex<Vec<CallRequest>>,
    pub error: Option<String>,
}

#[async_trait]
impl VoiceClient for FakeVoice {
    async fn place_call(&self, call: &CallRequest) -> BridgeResult<Value> {
        self.calls.lock().unwrap().push(call.clone());
        match &self.error {
            Some(message) => Err(BridgeError::upstream("vapi", message.clone())),
            None => Ok(json!({"id": "call_1", "status": "queued"})),
        }
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn hit(id: &str, content: &str) -> SearchHit {
    let properties = json!({
        "session_id": format!("session-{}", id),
        "original_prompt": "How do we grow?",
        "normalized_content": content,
        "pdf_files": ["deck.pdf"],
    });
    SearchHit {
        id: id.to_string(),
        properties: properties.as_object().cloned().unwrap_or_default(),
        metadata: HitMetadata {
            distance: Some(0.1),
            score: None,
        },
    }
}

pub fn hits(n: usize) -> Vec<SearchHit> {
    (1..=n)
        .map(|i| hit(&i.to_string(), &format!("document {}", i)))
        .collect()
}

/// Config with voice ids set and uploads under `root`.
pub fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.uploads.root = root.join("uploads");
    config.env_file = root.join(".env");
    config.secrets.vapi_assistant_id = Some("asst_1".to_string());
    config.secrets.vapi_phone_number_id = Some("pn_1".to_string());
    config
}

pub fn state(
    config: Config,
    generator: Arc<FakeGenerator>,
    store: FakeStore,
    voice: Arc<FakeVoice>,
) -> AppState {
    AppState {
        config: Arc::new(config),
        generator,
        store: Arc::new(store),
        voice,
    }
}
