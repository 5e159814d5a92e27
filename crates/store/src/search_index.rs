//! HTTP adapter for the vector document store.
//!
//! Wraps an Elasticsearch-compatible endpoint behind the small surface the
//! index pipeline needs: `ping`, `ensure_index`, `exists`, `put`, and
//! `knn_search`. Writes go through the create-if-absent document API, so a
//! duplicate put for the same [`DocId`] is a safe no-op rather than an
//! overwrite. Any transport failure or server error maps to
//! [`SnapvaultError::Store`] and is handled per item by the caller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use snapvault_shared::{DocId, Result, SearchIndexConfig, SnapvaultError};

use crate::PutOutcome;

// ---------------------------------------------------------------------------
// Documents & hits
// ---------------------------------------------------------------------------

/// Document stored per unique image payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageDocument {
    /// Source reference: vault path of the embedded object.
    pub path: String,
    /// Embedding vector; length fixed per index at provisioning time.
    pub vector: Vec<f32>,
    /// When this document was first indexed.
    pub indexed_at: DateTime<Utc>,
}

/// One ranked result from a knn query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Document identifier (payload digest).
    pub id: String,
    /// Vault path of the matching image.
    pub path: String,
    /// Similarity score, higher is closer.
    pub score: f64,
}

// ---------------------------------------------------------------------------
// SearchIndex client
// ---------------------------------------------------------------------------

/// Client for the remote document store, built once at startup and shared
/// by reference with every worker.
#[derive(Debug, Clone)]
pub struct SearchIndex {
    client: reqwest::Client,
    host: String,
    index: String,
}

impl SearchIndex {
    /// Build a client from configuration.
    pub fn new(config: &SearchIndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SnapvaultError::Store(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    /// The index name this client writes to.
    pub fn index_name(&self) -> &str {
        &self.index
    }

    /// Reachability check, used once at pipeline startup.
    pub async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(&self.host)
            .send()
            .await
            .map_err(|e| SnapvaultError::Store(format!("{}: {e}", self.host)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SnapvaultError::Store(format!(
                "{}: HTTP {}",
                self.host,
                response.status()
            )))
        }
    }

    /// Create the index with a dense-vector mapping sized to `dims`.
    /// Safe to call on every startup; an existing index is left as-is.
    pub async fn ensure_index(&self, dims: usize) -> Result<()> {
        let mapping = serde_json::json!({
            "mappings": {
                "properties": {
                    "path": { "type": "keyword" },
                    "indexed_at": { "type": "date" },
                    "vector": {
                        "type": "dense_vector",
                        "dims": dims,
                        "index": true,
                        "similarity": "cosine",
                        "index_options": { "type": "hnsw", "m": 16, "ef_construction": 512 },
                    },
                }
            }
        });

        let url = format!("{}/{}", self.host, self.index);
        let response = self
            .client
            .put(&url)
            .json(&mapping)
            .send()
            .await
            .map_err(|e| SnapvaultError::Store(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_success() {
            info!(index = %self.index, dims, "created index");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if status.as_u16() == 400 && body.contains("resource_already_exists_exception") {
            debug!(index = %self.index, "index already exists");
            return Ok(());
        }

        Err(SnapvaultError::Store(format!(
            "create index {}: HTTP {status}: {body}",
            self.index
        )))
    }

    /// Whether a document for `id` has been committed, by this process or
    /// any earlier one.
    pub async fn exists(&self, id: &DocId) -> Result<bool> {
        let url = format!("{}/{}/_doc/{id}", self.host, self.index);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| SnapvaultError::Store(format!("{url}: {e}")))?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(SnapvaultError::Store(format!("{url}: HTTP {status}"))),
        }
    }

    /// Commit `doc` under `id` through the create-if-absent API. A
    /// conflicting existing document is reported as
    /// [`PutOutcome::AlreadyPresent`] and left untouched.
    pub async fn put(&self, id: &DocId, doc: &ImageDocument) -> Result<PutOutcome> {
        let url = format!("{}/{}/_create/{id}", self.host, self.index);
        let response = self
            .client
            .put(&url)
            .json(doc)
            .send()
            .await
            .map_err(|e| SnapvaultError::Store(format!("{url}: {e}")))?;

        match response.status().as_u16() {
            200 | 201 => Ok(PutOutcome::Created),
            409 => Ok(PutOutcome::AlreadyPresent),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(SnapvaultError::Store(format!("{url}: HTTP {status}: {body}")))
            }
        }
    }

    /// Nearest-neighbor query, ranked by similarity.
    pub async fn knn_search(
        &self,
        vector: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchHit>> {
        let query = serde_json::json!({
            "knn": {
                "field": "vector",
                "query_vector": vector,
                "k": k,
                "num_candidates": num_candidates,
            },
            "_source": ["path"],
        });

        let url = format!("{}/{}/_search", self.host, self.index);
        let response = self
            .client
            .post(&url)
            .json(&query)
            .send()
            .await
            .map_err(|e| SnapvaultError::Store(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SnapvaultError::Store(format!(
                "{url}: HTTP {status}: {body}"
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| SnapvaultError::Store(format!("malformed search response: {e}")))?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                path: hit.source.path,
                score: hit.score,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f64,
    #[serde(rename = "_source")]
    source: RawSource,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    path: String,
}
