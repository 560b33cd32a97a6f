//! Embedding-based retrieval over chunked documents.
//!
//! Embeddings come from an external service; this module owns the cosine
//! index and the explicitly keyed cache around it.

use crate::config::Settings;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BATCH: usize = 100;

#[async_trait::async_trait]
pub trait EmbeddingsClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Clone)]
pub struct HttpEmbeddingsClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl HttpEmbeddingsClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = settings.require_openai_api_key()?.to_string();
        let base_url =
            std::env::var("EMBEDDINGS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("EMBEDDINGS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_secs = std::env::var("EMBEDDINGS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build embeddings http client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
        })
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl EmbeddingsClient for HttpEmbeddingsClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::ensure!(!texts.is_empty(), "texts must be non-empty");

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );

        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&EmbeddingsRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .context("embeddings request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read embeddings response")?;
        if !status.is_success() {
            anyhow::bail!("embeddings HTTP {status}: {text}");
        }

        let parsed = serde_json::from_str::<EmbeddingsResponse>(&text)
            .with_context(|| format!("failed to parse embeddings response: {text}"))?;
        anyhow::ensure!(
            parsed.data.len() == texts.len(),
            "embeddings count mismatch: sent {}, got {}",
            texts.len(),
            parsed.data.len()
        );

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Chunks and their embedding vectors for one corpus version.
#[derive(Debug, Clone)]
pub struct RetrievalIndex {
    corpus_version: String,
    chunks: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl RetrievalIndex {
    /// Embeds every chunk through the client, in batches to respect request
    /// size limits.
    pub async fn build(
        embeddings: &dyn EmbeddingsClient,
        corpus_version: String,
        chunks: Vec<String>,
    ) -> Result<Self> {
        anyhow::ensure!(!chunks.is_empty(), "cannot index an empty chunk set");

        let batch_size: usize = std::env::var("EMBEDDINGS_BATCH")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BATCH);
        anyhow::ensure!(batch_size >= 1, "EMBEDDINGS_BATCH must be >= 1");

        let mut vectors = Vec::with_capacity(chunks.len());
        let mut batch_idx: usize = 0;
        for batch in chunks.chunks(batch_size) {
            batch_idx += 1;
            let t0 = std::time::Instant::now();
            let embedded = embeddings.embed(batch).await?;
            tracing::debug!(
                corpus_version = %corpus_version,
                batch_idx,
                batch_size = batch.len(),
                elapsed_ms = t0.elapsed().as_millis(),
                "embedded corpus batch"
            );
            vectors.extend(embedded);
        }

        Ok(Self {
            corpus_version,
            chunks,
            vectors,
        })
    }

    pub fn corpus_version(&self) -> &str {
        &self.corpus_version
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, idx: usize) -> Option<&str> {
        self.chunks.get(idx).map(|s| s.as_str())
    }

    /// Indices and similarities of the `k` chunks closest to `query`,
    /// most similar first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cache for the retrieval index, keyed by corpus version.
///
/// One entry: a new corpus version evicts the previous index. Invalidation is
/// explicit; nothing is cached behind the caller's back.
#[derive(Debug, Default)]
pub struct RetrievalCache {
    inner: tokio::sync::Mutex<Option<Arc<RetrievalIndex>>>,
}

impl RetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached index for `corpus_version`, building it via `build`
    /// when missing or stale.
    pub async fn get_or_build<F, Fut>(
        &self,
        corpus_version: &str,
        build: F,
    ) -> Result<Arc<RetrievalIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RetrievalIndex>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(index) = guard.as_ref() {
            if index.corpus_version() == corpus_version {
                return Ok(Arc::clone(index));
            }
            tracing::info!(
                cached = %index.corpus_version(),
                requested = %corpus_version,
                "corpus version changed; rebuilding retrieval index"
            );
        }

        let built = build().await?;
        anyhow::ensure!(
            built.corpus_version() == corpus_version,
            "built index version {} does not match requested {corpus_version}",
            built.corpus_version()
        );

        let built = Arc::new(built);
        *guard = Some(Arc::clone(&built));
        Ok(built)
    }

    pub async fn invalidate(&self) {
        *self.inner.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index(version: &str) -> RetrievalIndex {
        RetrievalIndex {
            corpus_version: version.to_string(),
            chunks: vec!["alpha".into(), "beta".into(), "gamma".into()],
            vectors: vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.7, 0.7],
            ],
        }
    }

    #[test]
    fn top_k_orders_by_similarity() {
        let idx = index("v1");
        let hits = idx.top_k(&[1.0, 0.1], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 0);
        assert_eq!(hits[1].0, 2);
        assert!(hits[0].1 > hits[1].1);
        assert_eq!(idx.chunk(hits[0].0), Some("alpha"));
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        let sim = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn parses_embeddings_response_shape() {
        let v = json!({
            "data": [
                {"embedding": [0.1, 0.2], "index": 0},
                {"embedding": [0.3, 0.4], "index": 1}
            ],
            "model": "text-embedding-3-small"
        });
        let parsed: EmbeddingsResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[1].embedding, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn cache_reuses_matching_version() {
        let cache = RetrievalCache::new();
        let first = cache
            .get_or_build("v1", || async { Ok(index("v1")) })
            .await
            .unwrap();
        let second = cache
            .get_or_build("v1", || async {
                panic!("must not rebuild for a matching version")
            })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn cache_rebuilds_on_version_change_and_invalidate() {
        let cache = RetrievalCache::new();
        let v1 = cache
            .get_or_build("v1", || async { Ok(index("v1")) })
            .await
            .unwrap();

        let v2 = cache
            .get_or_build("v2", || async { Ok(index("v2")) })
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&v1, &v2));
        assert_eq!(v2.corpus_version(), "v2");

        cache.invalidate().await;
        let rebuilt = cache
            .get_or_build("v2", || async { Ok(index("v2")) })
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&v2, &rebuilt));
    }

    #[tokio::test]
    async fn cache_rejects_mismatched_build_output() {
        let cache = RetrievalCache::new();
        let res = cache
            .get_or_build("v1", || async { Ok(index("other")) })
            .await;
        assert!(res.is_err());
    }
}
