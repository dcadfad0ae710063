//! Weaviate vector-store client.
//!
//! Talks to a hosted Weaviate cluster over its REST and GraphQL APIs:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | connect | `GET /v1/.well-known/ready` |
//! | collection exists | `GET /v1/schema/{collection}` |
//! | create collection | `POST /v1/schema` |
//! | store document | `POST /v1/objects` |
//! | search | `POST /v1/graphql` with `nearText` |
//! | grouped generation | `POST /v1/graphql` with `nearText` + `generate(groupedResult)` |
//! | query agent | `POST {agent_url}/run` |
//!
//! The collection vectorizes with the hosted `text2vec-weaviate` embedding
//! service and generates with the `generative-cohere` module. Requests carry
//! the cluster API key as a bearer token and, when `GEMINI_API_KEY` is set,
//! the `X-INFERENCE-PROVIDER-API-KEY` header used by the query agent.
//!
//! # Query agent
//!
//! The agent request follows the Python `weaviate-agents` client, not a
//! published schema:
//!
//! ```json
//! { "original_query": "...", "collections": ["NormalizedDocuments"],
//!   "headers": { "X-INFERENCE-PROVIDER-API-KEY": "..." } }
//! ```
//!
//! sent with `X-Weaviate-Cluster-Url` and the cluster bearer token. The
//! answer is read from `final_answer`; a response without it is an upstream
//! error. `weaviate.agent_url` points at the service root.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::config::{Secrets, WeaviateConfig};
use crate::error::{transport, BridgeError, BridgeResult};
use crate::models::{GroupedGeneration, HitMetadata, NormalizedDocument, SearchHit};
use crate::traits::{VectorSession, VectorStore};

const SERVICE: &str = "weaviate";

/// Stored document properties, in schema order.
pub const PROPERTIES: [(&str, &str); 8] = [
    ("session_id", "text"),
    ("original_prompt", "text"),
    ("normalized_content", "text"),
    ("pdf_count", "int"),
    ("image_count", "int"),
    ("pdf_files", "text[]"),
    ("image_files", "text[]"),
    ("total_files", "int"),
];

/// Factory for [`WeaviateSession`]s.
pub struct WeaviateStore {
    config: WeaviateConfig,
    secrets: Secrets,
}

impl WeaviateStore {
    pub fn new(config: WeaviateConfig, secrets: Secrets) -> Self {
        Self { config, secrets }
    }
}

#[async_trait]
impl VectorStore for WeaviateStore {
    async fn connect(&self) -> BridgeResult<Box<dyn VectorSession>> {
        let session = WeaviateSession::open(&self.config, &self.secrets).await?;
        Ok(Box::new(session))
    }
}

/// One request-scoped connection to the cluster.
pub struct WeaviateSession {
    client: reqwest::Client,
    url: String,
    collection: String,
    agent_url: String,
    inference_key: Option<String>,
}

impl WeaviateSession {
    /// Build the HTTP client and probe readiness.
    ///
    /// # Errors
    ///
    /// A configuration error when `WEAVIATE_URL` or `WEAVIATE_API_KEY` is
    /// missing; an upstream error when the cluster is unreachable or not
    /// ready.
    pub async fn open(config: &WeaviateConfig, secrets: &Secrets) -> BridgeResult<Self> {
        let session = Self::build(config, secrets)?;

        let response = session
            .client
            .get(format!("{}/v1/.well-known/ready", session.url))
            .send()
            .await
            .map_err(transport(SERVICE))?;
        if !response.status().is_success() {
            return Err(BridgeError::upstream(
                SERVICE,
                format!("cluster not ready (HTTP {})", response.status()),
            ));
        }

        tracing::debug!(
            url = %session.url,
            collection = %session.collection,
            "connected to weaviate"
        );
        Ok(session)
    }

    fn build(config: &WeaviateConfig, secrets: &Secrets) -> BridgeResult<Self> {
        let (Some(url), Some(api_key)) = (&secrets.weaviate_url, &secrets.weaviate_api_key) else {
            return Err(BridgeError::config(
                "WEAVIATE_URL and WEAVIATE_API_KEY must be set in environment variables",
            ));
        };

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
        match &secrets.gemini_api_key {
            Some(key) => {
                headers.insert("X-INFERENCE-PROVIDER-API-KEY", header_value(key)?);
            }
            None => tracing::warn!("GEMINI_API_KEY not set; query agent calls will fail"),
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(transport(SERVICE))?;

        Ok(Self {
            client,
            url: cluster_base_url(url),
            collection: config.collection.clone(),
            agent_url: config.agent_url.trim_end_matches('/').to_string(),
            inference_key: secrets.gemini_api_key.clone(),
        })
    }

    async fn graphql(&self, query: String) -> BridgeResult<Value> {
        let response = self
            .client
            .post(format!("{}/v1/graphql", self.url))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let body = read_json(response).await?;
        graphql_data(body)
    }
}

fn header_value(value: &str) -> BridgeResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| BridgeError::config("API key contains characters not allowed in a header"))
}

/// Normalize a cluster URL: add `https://` when no scheme is given and drop
/// trailing slashes.
pub fn cluster_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
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
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| BridgeError::upstream(SERVICE, format!("invalid JSON response: {}", e)))
}

/// Return `data`, or an error built from a non-empty `errors` array.
fn graphql_data(body: Value) -> BridgeResult<Value> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(BridgeError::upstream(
                SERVICE,
                format!("GraphQL error: {}", messages.join("; ")),
            ));
        }
    }
    body.get("data")
        .cloned()
        .ok_or_else(|| BridgeError::upstream(SERVICE, "GraphQL response has no data"))
}

/// Class definition sent when creating the collection.
pub fn collection_schema(collection: &str) -> Value {
    let properties: Vec<Value> = PROPERTIES
        .iter()
        .map(|(name, data_type)| json!({ "name": name, "dataType": [data_type] }))
        .collect();
    json!({
        "class": collection,
        "vectorizer": "text2vec-weaviate",
        "moduleConfig": {
            "text2vec-weaviate": {},
            "generative-cohere": {}
        },
        "properties": properties,
    })
}

/// Body for `POST /v1/objects`.
pub fn object_body(collection: &str, doc: &NormalizedDocument) -> BridgeResult<Value> {
    let properties = serde_json::to_value(doc)
        .map_err(|e| BridgeError::upstream(SERVICE, format!("cannot encode document: {}", e)))?;
    Ok(json!({ "class": collection, "properties": properties }))
}

/// GraphQL `Get` query with `nearText`, optionally with a grouped
/// generative task.
pub fn near_text_query(
    collection: &str,
    query: &str,
    limit: usize,
    grouped_task: Option<&str>,
) -> String {
    let fields: Vec<&str> = PROPERTIES.iter().map(|(name, _)| *name).collect();
    let generate = grouped_task
        .map(|task| {
            format!(
                " generate(groupedResult: {{task: {}}}) {{ groupedResult error }}",
                graphql_string(task)
            )
        })
        .unwrap_or_default();
    format!(
        "{{ Get {{ {}(nearText: {{concepts: [{}]}}, limit: {}) {{ {} _additional {{ id distance score{} }} }} }} }}",
        collection,
        graphql_string(query),
        limit,
        fields.join(" "),
        generate
    )
}

/// Quote a string literal for GraphQL. JSON string escaping is a valid
/// subset of GraphQL's.
fn graphql_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Body for `POST {agent_url}/run`.
pub fn agent_body(query: &str, collection: &str, inference_key: Option<&str>) -> Value {
    let mut headers = Map::new();
    if let Some(key) = inference_key {
        headers.insert("X-INFERENCE-PROVIDER-API-KEY".to_string(), json!(key));
    }
    json!({
        "original_query": query,
        "collections": [collection],
        "headers": headers,
    })
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Extract hits from `data.Get.<collection>`.
pub fn parse_hits(data: &Value, collection: &str) -> Vec<SearchHit> {
    let Some(objects) = data
        .get("Get")
        .and_then(|g| g.get(collection))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    objects
        .iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            let mut properties: Map<String, Value> = obj.clone();
            let additional = properties.remove("_additional").unwrap_or(Value::Null);
            SearchHit {
                id: additional
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                properties,
                metadata: HitMetadata {
                    distance: as_f64(additional.get("distance")),
                    score: as_f64(additional.get("score")),
                },
            }
        })
        .collect()
}

/// Grouped generation result: reported on the first object's
/// `_additional.generate`.
fn parse_grouped(data: &Value, collection: &str) -> BridgeResult<Option<String>> {
    let generate = data
        .get("Get")
        .and_then(|g| g.get(collection))
        .and_then(Value::as_array)
        .and_then(|objs| objs.first())
        .and_then(|o| o.get("_additional"))
        .and_then(|a| a.get("generate"));

    let Some(generate) = generate else {
        return Ok(None);
    };
    if let Some(err) = generate.get("error").and_then(Value::as_str) {
        if !err.is_empty() {
            return Err(BridgeError::upstream(SERVICE, format!("generation failed: {}", err)));
        }
    }
    Ok(generate
        .get("groupedResult")
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[async_trait]
impl VectorSession for WeaviateSession {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn collection_exists(&self) -> BridgeResult<bool> {
        let response = self
            .client
            .get(format!("{}/v1/schema/{}", self.url, self.collection))
            .send()
            .await
            .map_err(transport(SERVICE))?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => read_json(response).await.map(|_| false),
        }
    }

    async fn create_collection(&self) -> BridgeResult<bool> {
        if self.collection_exists().await? {
            tracing::info!(collection = %self.collection, "collection already exists");
            return Ok(false);
        }

        let response = self
            .client
            .post(format!("{}/v1/schema", self.url))
            .json(&collection_schema(&self.collection))
            .send()
            .await
            .map_err(transport(SERVICE))?;

        // Another request may have created it between the check and the POST.
        if response.status().as_u16() == 422 {
            let text = response.text().await.unwrap_or_default();
            if text.contains("already exists") {
                return Ok(false);
            }
            return Err(BridgeError::upstream(SERVICE, format!("HTTP 422: {}", text)));
        }
        read_json(response).await?;

        tracing::info!(collection = %self.collection, "collection created");
        Ok(true)
    }

    async fn store_document(&self, doc: &NormalizedDocument) -> BridgeResult<String> {
        let response = self
            .client
            .post(format!("{}/v1/objects", self.url))
            .json(&object_body(&self.collection, doc)?)
            .send()
            .await
            .map_err(transport(SERVICE))?;
        let body = read_json(response).await?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        tracing::info!(id = %id, session_id = %doc.session_id, "document stored");
        Ok(id)
    }

    async fn search_documents(&self, query: &str, limit: usize) -> BridgeResult<Vec<SearchHit>> {
        let data = self
            .graphql(near_text_query(&self.collection, query, limit, None))
            .await?;
        Ok(parse_hits(&data, &self.collection))
    }

    async fn generate_grouped(
        &self,
        query: &str,
        limit: usize,
        task: &str,
    ) -> BridgeResult<GroupedGeneration> {
        let data = self
            .graphql(near_text_query(&self.collection, query, limit, Some(task)))
            .await?;
        Ok(GroupedGeneration {
            text: parse_grouped(&data, &self.collection)?,
            hits: parse_hits(&data, &self.collection),
        })
    }

    async fn query_with_agent(&self, query: &str) -> BridgeResult<String> {
        let response = self
            .client
            .post(format!("{}/run", self.agent_url))
            .header("X-Weaviate-Cluster-Url", &self.url)
            .json(&agent_body(
                query,
                &self.collection,
                self.inference_key.as_deref(),
            ))
            .send()
            .await
            .map_err(transport("query agent"))?;
        let body = read_json(response).await?;
        body.get("final_answer")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| BridgeError::upstream("query agent", "response has no final_answer"))
    }

    async fn close(self: Box<Self>) {
        tracing::debug!(url = %self.url, "weaviate session closed");
    }
}
