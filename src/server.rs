//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/weaviate/process-form` | Save uploads, normalize, store |
//! | `GET`  | `/weaviate/search` | Semantic search (`query`, `limit=5`) |
//! | `POST` | `/weaviate/rag` | Retrieval-augmented answer (`query`, `limit=3`) |
//! | `POST` | `/weaviate/test-generate` | Direct grouped generation with search fallback |
//! | `POST` | `/weaviate/test-cohere-direct` | Generative module smoke test |
//! | `POST` | `/weaviate/query-agent` | Hosted query agent (`query`) |
//! | `POST` | `/weaviate/weaviate-query-generator` | Focused query, retrieval, outbound call |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every `/weaviate/*` route answers `200 OK`. Failures are reported in the
//! body:
//!
//! ```json
//! { "message": "Failed to connect to Weaviate: ...", "status": "error", "error_kind": "config" }
//! ```
//!
//! `error_kind` is one of `config`, `upstream`, `io`, `request`. Malformed
//! input (a missing `query` parameter, an unreadable multipart body) is
//! reported the same way with `error_kind: "request"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the browser frontend
//! can call the API directly.

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::BridgeError;
use crate::gemini::{GeminiClient, UnavailableGenerator};
use crate::ingest::{self, FilePart, FormSubmission, ProcessFormResponse};
use crate::search::{
    self, Envelope, ErrorEnvelope, GenerateTestResponse, GenerativeCheckResponse,
    SearchResponse, TextResponse, DEFAULT_GROUPED_TASK, DEFAULT_RAG_LIMIT, DEFAULT_SEARCH_LIMIT,
};
use crate::traits::{Generator, VectorStore, VoiceClient};
use crate::vapi::{UnavailableVoice, VapiClient};
use crate::voice::{self, HandoffResponse};
use crate::weaviate::WeaviateStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: Arc<dyn Generator>,
    pub store: Arc<dyn VectorStore>,
    pub voice: Arc<dyn VoiceClient>,
}

impl AppState {
    /// Build the hosted-service clients from configuration.
    ///
    /// A client whose credentials are missing is replaced by one that fails
    /// every call with a configuration error, so the server still starts
    /// and reports the problem per request.
    pub fn from_config(config: &Config) -> Self {
        let generator: Arc<dyn Generator> =
            match GeminiClient::new(&config.gemini, &config.secrets) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::warn!(error = %e, "generative model unavailable");
                    Arc::new(UnavailableGenerator::new(e.to_string()))
                }
            };

        let voice: Arc<dyn VoiceClient> = match VapiClient::new(&config.vapi, &config.secrets) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!(error = %e, "voice API unavailable");
                Arc::new(UnavailableVoice::new(e.to_string()))
            }
        };

        Self {
            config: Arc::new(config.clone()),
            generator,
            store: Arc::new(WeaviateStore::new(
                config.weaviate.clone(),
                config.secrets.clone(),
            )),
            voice,
        }
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state.config.server.max_body_bytes;

    let weaviate = Router::new()
        .route("/process-form", post(handle_process_form))
        .route("/search", get(handle_search))
        .route("/rag", post(handle_rag))
        .route("/test-generate", post(handle_test_generate))
        .route("/test-cohere-direct", post(handle_generative_check))
        .route("/query-agent", post(handle_query_agent))
        .route("/weaviate-query-generator", post(handle_query_generator));

    Router::new()
        .nest("/weaviate", weaviate)
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn bad_request<T>(message: String) -> Json<Envelope<T>> {
    let err = BridgeError::Request(message);
    tracing::debug!(error = %err, "rejected request");
    Json(Envelope::Err(ErrorEnvelope::new(err.to_string(), &err)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /weaviate/process-form ============

/// Read every multipart field into a [`FormSubmission`]. Unknown fields are
/// ignored; `prompt` is required.
async fn read_form(mut multipart: Multipart) -> Result<FormSubmission, String> {
    let mut form = FormSubmission::default();
    let mut prompt = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => prompt = Some(field.text().await.map_err(|e| e.to_string())?),
            "phone_number" => {
                let value = field.text().await.map_err(|e| e.to_string())?;
                if !value.trim().is_empty() {
                    form.phone_number = Some(value);
                }
            }
            "pdfs" | "images" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| e.to_string())?.to_vec();
                let part = FilePart { filename, bytes };
                if name == "pdfs" {
                    form.pdfs.push(part);
                } else {
                    form.images.push(part);
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    form.prompt = prompt.ok_or_else(|| "missing required form field: prompt".to_string())?;
    Ok(form)
}

async fn handle_process_form(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<Envelope<ProcessFormResponse>> {
    let multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(message) => return bad_request(message),
    };

    let response = ingest::process_form(
        state.generator.as_ref(),
        state.store.as_ref(),
        &state.config.uploads.root,
        form,
    )
    .await;
    Json(Envelope::Ok(response))
}

// ============ Query-string routes ============

#[derive(Debug, Deserialize)]
struct QueryParams {
    query: String,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct GenerateParams {
    query: String,
    limit: Option<usize>,
    grouped_task: Option<String>,
}

async fn handle_search(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Json<Envelope<SearchResponse>> {
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    Json(search::search_documents(state.store.as_ref(), &params.query, limit).await)
}

async fn handle_rag(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Json<Envelope<TextResponse>> {
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let limit = params.limit.unwrap_or(DEFAULT_RAG_LIMIT);
    Json(search::generate_response(state.store.as_ref(), &params.query, limit).await)
}

async fn handle_test_generate(
    State(state): State<AppState>,
    params: Result<Query<GenerateParams>, QueryRejection>,
) -> Json<Envelope<GenerateTestResponse>> {
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    let limit = params.limit.unwrap_or(DEFAULT_RAG_LIMIT);
    let task = params
        .grouped_task
        .unwrap_or_else(|| DEFAULT_GROUPED_TASK.to_string());
    Json(search::test_generate(state.store.as_ref(), &params.query, limit, &task).await)
}

async fn handle_generative_check(
    State(state): State<AppState>,
) -> Json<Envelope<GenerativeCheckResponse>> {
    Json(search::check_generative(state.store.as_ref()).await)
}

async fn handle_query_agent(
    State(state): State<AppState>,
    params: Result<Query<QueryParams>, QueryRejection>,
) -> Json<Envelope<TextResponse>> {
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    Json(search::query_with_agent(state.store.as_ref(), &params.query).await)
}

// ============ POST /weaviate/weaviate-query-generator ============

#[derive(Debug, Deserialize)]
struct HandoffRequest {
    prompt: String,
    #[serde(default)]
    phone_number: Option<String>,
}

async fn handle_query_generator(
    State(state): State<AppState>,
    body: Result<Json<HandoffRequest>, JsonRejection>,
) -> Json<Envelope<HandoffResponse>> {
    let Json(request) = match body {
        Ok(b) => b,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    Json(
        voice::run_handoff(
            &state.config,
            state.generator.as_ref(),
            state.store.as_ref(),
            state.voice.as_ref(),
            &request.prompt,
            request.phone_number.as_deref(),
        )
        .await,
    )
}
