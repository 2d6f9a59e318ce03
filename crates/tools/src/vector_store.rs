//! Vector-store search: the `searchVectorStore` tool and the stores it queries.
//!
//! [`PineconeStore`] talks to a Pinecone index with integrated embeddings
//! (text in, scored records out). [`InMemoryStore`] is a keyword-scored
//! stand-in for tests and offline sessions.

use async_trait::async_trait;
use colloquy_config::VectorStoreConfig;
use colloquy_core::error::ToolError;
use colloquy_core::tool::Tool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const TOOL_NAME: &str = "searchVectorStore";
const PINECONE_API_VERSION: &str = "2025-01";

/// One scored record returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// A searchable store of text records.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Return at most `top_k` records, best match first.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorRecord>, ToolError>;
}

// ── Pinecone ────────────────────────────────────────────────────────────

/// A Pinecone index searched by text through its records API.
pub struct PineconeStore {
    index_host: String,
    api_key: String,
    namespace: String,
    client: reqwest::Client,
}

impl PineconeStore {
    pub fn new(
        index_host: impl Into<String>,
        api_key: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        let mut index_host: String = index_host.into();
        if !index_host.starts_with("http://") && !index_host.starts_with("https://") {
            index_host = format!("https://{index_host}");
        }
        Self {
            index_host: index_host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: namespace.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config; `None` unless host and key are both set.
    pub fn from_config(config: &VectorStoreConfig) -> Option<Self> {
        match (&config.index_host, &config.api_key) {
            (Some(host), Some(key)) => Some(Self::new(host, key, &config.namespace)),
            _ => None,
        }
    }

    fn search_url(&self) -> String {
        let namespace = if self.namespace.is_empty() {
            "__default__"
        } else {
            &self.namespace
        };
        format!("{}/records/namespaces/{}/search", self.index_host, namespace)
    }
}

fn search_body(query: &str, top_k: usize) -> serde_json::Value {
    serde_json::json!({
        "query": {
            "top_k": top_k,
            "inputs": { "text": query }
        },
        "fields": ["category", "text"]
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: SearchResult,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: f32,
    #[serde(default)]
    fields: HitFields,
}

#[derive(Debug, Default, Deserialize)]
struct HitFields {
    category: Option<String>,
    #[serde(default)]
    text: String,
}

fn parse_search_response(body: &str) -> Result<Vec<VectorRecord>, ToolError> {
    let response: SearchResponse = serde_json::from_str(body).map_err(|e| {
        ToolError::execution_failed(TOOL_NAME, format!("Unexpected search response: {e}"))
    })?;

    Ok(response
        .result
        .hits
        .into_iter()
        .map(|hit| VectorRecord {
            id: hit.id,
            score: hit.score,
            category: hit.fields.category,
            text: hit.fields.text,
        })
        .collect())
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorRecord>, ToolError> {
        let url = self.search_url();
        debug!(url = %url, top_k, "Searching Pinecone");

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .json(&search_body(query, top_k))
            .send()
            .await
            .map_err(|e| {
                ToolError::execution_failed(TOOL_NAME, format!("Search request failed: {e}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                let reason = format!("Failed to read search response: {e}");
                ToolError::execution_failed(TOOL_NAME, reason)
            })?;

        if !status.is_success() {
            return Err(ToolError::execution_failed(
                TOOL_NAME,
                format!("Vector store returned HTTP {}: {}", status.as_u16(), body.trim()),
            ));
        }

        parse_search_response(&body)
    }
}

// ── In-memory ───────────────────────────────────────────────────────────

/// Keyword-scored records held in memory.
pub struct InMemoryStore {
    records: Arc<RwLock<Vec<VectorRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a record and return its generated id.
    pub async fn insert(&self, category: Option<&str>, text: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.records.write().await.push(VectorRecord {
            id: id.clone(),
            score: 0.0,
            category: category.map(String::from),
            text: text.into(),
        });
        id
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<VectorRecord>, ToolError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.records.read().await;
        let mut results: Vec<VectorRecord> = records
            .iter()
            .filter_map(|r| {
                let haystack = r.text.to_lowercase();
                let occurrences: usize = terms
                    .iter()
                    .map(|t| haystack.matches(t.as_str()).count())
                    .sum();
                if occurrences == 0 {
                    return None;
                }
                // Occurrences per 100 bytes of text
                let score = occurrences as f32 / (r.text.len() as f32 / 100.0).max(1.0);
                Some(VectorRecord { score, ..r.clone() })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }
}

// ── Tool ────────────────────────────────────────────────────────────────

/// `searchVectorStore`: look up records matching `{"criteria": "..."}`.
pub struct SearchVectorStoreTool {
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl SearchVectorStoreTool {
    pub fn new(store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            store,
            top_k: top_k.max(1),
        }
    }
}

#[async_trait]
impl Tool for SearchVectorStoreTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Search the vector store for records relevant to the given criteria"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "criteria": {
                    "type": "string",
                    "description": "The search criteria in natural language"
                }
            },
            "required": ["criteria"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let criteria = arguments["criteria"]
            .as_str()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::invalid_argument(TOOL_NAME, "Missing 'criteria' argument"))?;

        let hits = self.store.search(criteria, self.top_k).await?;
        debug!(store = self.store.name(), hits = hits.len(), "Vector store search complete");

        if hits.is_empty() {
            return Ok("No matching records found".into());
        }
        serde_json::to_string_pretty(&hits)
            .map_err(|e| ToolError::execution_failed(TOOL_NAME, e.to_string()))
    }
}
