//! Qdrant vector store client over the HTTP API.
//!
//! Each wiki page's chunks live as points in one collection, joined back to
//! the page through a `page_id` payload field. Re-syncing a page deletes its
//! old points before inserting the new set so stale chunks never outlive a
//! page edit or deletion. The collection is created on first use with cosine
//! distance; an existing collection is reused without a dimension check (a
//! mismatch surfaces as a Qdrant error on first upsert).

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Payload stored with every point; the durable record downstream search
/// tooling consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Chunk text, section-header-prefixed.
    pub text: String,
    /// Zero-based chunk position within its page.
    pub chunk_index: usize,
    /// Originating section header, empty when none.
    #[serde(default)]
    pub section: String,
    /// Join key back to the wiki page. Injected by [`VectorStore::replace_page`].
    #[serde(default)]
    pub page_id: i64,
    /// Page path slug.
    pub page_path: String,
    /// Page display title.
    #[serde(default)]
    pub page_title: String,
    /// Public page URL.
    #[serde(default)]
    pub page_url: String,
    /// Page description.
    #[serde(default)]
    pub description: String,
    /// Page tag list.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Page last-modified timestamp.
    #[serde(default)]
    pub updated_at: String,
}

/// One stored point: opaque id, embedding vector, payload.
#[derive(Debug, Clone, Serialize)]
pub struct PointRecord {
    /// Point identifier (UUIDv4).
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Chunk payload.
    pub payload: ChunkPayload,
}

/// Search hit returned by [`VectorStore::search`].
#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    /// Cosine similarity score.
    pub score: f32,
    /// Stored payload.
    pub payload: ChunkPayload,
}

/// Collection point counts and health.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInfo {
    /// Collection status string as reported by Qdrant.
    #[serde(default)]
    pub status: String,
    /// Total points in the collection.
    #[serde(default)]
    pub points_count: Option<u64>,
    /// Vector count; optional in newer server versions.
    #[serde(default)]
    pub vectors_count: Option<u64>,
}

impl CollectionInfo {
    /// Stored chunk count, falling back to `points_count` where the server
    /// no longer reports `vectors_count`.
    pub fn chunk_count(&self) -> u64 {
        self.vectors_count.or(self.points_count).unwrap_or(0)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

/// Blocking Qdrant client scoped to one collection.
#[derive(Debug)]
pub struct VectorStore {
    client: Client,
    base_url: String,
    collection: String,
}

impl VectorStore {
    /// Connects to Qdrant and ensures the target collection exists, sized to
    /// `dimension` with cosine distance.
    pub fn connect(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let store = Self::build(url, api_key, collection, timeout)?;
        store.ensure_collection(dimension)?;
        Ok(store)
    }

    /// Opens an existing collection without ever creating one, for read-only
    /// tools. Fails when the collection is absent.
    pub fn open(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let store = Self::build(url, api_key, collection, timeout)?;
        let resp = store
            .client
            .get(store.collection_url(""))
            .send()
            .context("cannot reach Qdrant")?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!(
                "collection '{}' does not exist; run wikivec-sync first or check --collection",
                store.collection
            );
        }
        anyhow::ensure!(
            resp.status().is_success(),
            "unexpected Qdrant response while describing '{}': {}",
            store.collection,
            resp.status()
        );
        Ok(store)
    }

    fn build(
        url: &str,
        api_key: Option<&str>,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self> {
        anyhow::ensure!(
            url.starts_with("http://") || url.starts_with("https://"),
            "qdrant url must be an http(s) URL"
        );
        anyhow::ensure!(!collection.trim().is_empty(), "collection name is required");

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            headers.insert(
                "api-key",
                HeaderValue::from_str(key).context("invalid Qdrant API key")?,
            );
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Qdrant HTTP client")?;

        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }

    /// Collection name this store writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{suffix}", self.base_url, self.collection)
    }

    fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let resp = self
            .client
            .get(self.collection_url(""))
            .send()
            .context("cannot reach Qdrant")?;
        if resp.status().is_success() {
            debug!("using existing Qdrant collection '{}'", self.collection);
            return Ok(());
        }
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!(
                "unexpected Qdrant response while describing '{}': {}",
                self.collection,
                resp.status()
            );
        }

        let body = json!({
            "vectors": { "size": dimension, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(self.collection_url(""))
            .json(&body)
            .send()
            .context("cannot reach Qdrant")?;
        anyhow::ensure!(
            resp.status().is_success(),
            "failed to create collection '{}': {}",
            self.collection,
            resp.status()
        );
        info!(
            "created Qdrant collection '{}' (dim={dimension})",
            self.collection
        );
        Ok(())
    }

    /// Removes all points whose payload `page_id` matches.
    ///
    /// Failures are logged and swallowed: a missed purge is preferable to
    /// blocking ingestion, and the next successful sync purges again.
    pub fn delete_page(&self, page_id: i64) {
        let body = json!({
            "filter": {
                "must": [{ "key": "page_id", "match": { "value": page_id } }]
            }
        });
        let result = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&body)
            .send();
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!(
                    "could not delete page {page_id} chunks: http status {}",
                    resp.status()
                );
            }
            Err(err) => warn!("could not delete page {page_id} chunks: {err}"),
        }
    }

    /// Inserts points into the collection, waiting for the write to apply.
    pub fn upsert(&self, points: &[PointRecord]) -> Result<()> {
        let body = json!({ "points": points });
        let resp = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&body)
            .send()
            .context("Qdrant upsert request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Qdrant upsert failed ({status}): {detail}");
        }
        Ok(())
    }

    /// Replaces all stored chunks for `page_id` with the new set.
    ///
    /// `page_id` is injected into every payload before the write; the delete
    /// runs first so no stale chunk survives the sync.
    pub fn replace_page(
        &self,
        page_id: i64,
        vectors: Vec<Vec<f32>>,
        payloads: Vec<ChunkPayload>,
    ) -> Result<()> {
        anyhow::ensure!(
            vectors.len() == payloads.len(),
            "got {} vectors for {} payloads",
            vectors.len(),
            payloads.len()
        );

        self.delete_page(page_id);

        let points: Vec<PointRecord> = vectors
            .into_iter()
            .zip(payloads)
            .map(|(vector, mut payload)| {
                payload.page_id = page_id;
                PointRecord {
                    id: Uuid::new_v4().to_string(),
                    vector,
                    payload,
                }
            })
            .collect();
        let count = points.len();
        self.upsert(&points)?;
        info!("stored {count} chunks for page {page_id}");
        Ok(())
    }

    /// Fetches point counts and status for the collection.
    pub fn collection_info(&self) -> Result<CollectionInfo> {
        let resp = self
            .client
            .get(self.collection_url(""))
            .send()
            .context("Qdrant describe request failed")?;
        anyhow::ensure!(
            resp.status().is_success(),
            "Qdrant describe failed: {}",
            resp.status()
        );
        let parsed: ApiResponse<CollectionInfo> = resp
            .json()
            .context("failed to parse Qdrant collection info")?;
        Ok(parsed.result)
    }

    /// Similarity search over the collection, payloads included.
    pub fn search(
        &self,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(threshold) = score_threshold {
            body["score_threshold"] = json!(threshold);
        }
        let resp = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&body)
            .send()
            .context("Qdrant search request failed")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().unwrap_or_else(|_| "<body unavailable>".to_string());
            anyhow::bail!("Qdrant search failed ({status}): {detail}");
        }
        let parsed: ApiResponse<Vec<ScoredPoint>> =
            resp.json().context("failed to parse Qdrant search response")?;
        Ok(parsed.result)
    }
}
