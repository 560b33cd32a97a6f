pub mod chunk;
pub mod corpus;
pub mod error;
pub mod llm;
pub mod retrieval;

use crate::qa::retrieval::{EmbeddingsClient, RetrievalCache, RetrievalIndex};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, Copy)]
pub enum Provider {
    Anthropic,
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct AnswerInput {
    pub question: String,
    pub excerpts: Vec<String>,
}

#[async_trait::async_trait]
pub trait AnswerClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn answer(&self, input: AnswerInput) -> Result<String>;
}

#[derive(Debug, Clone, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    pub corpus_version: String,
    pub context_chunks: usize,
}

/// Document Q&A: corpus -> chunks -> embeddings -> top-k excerpts -> LLM.
///
/// The retrieval cache is injected and keyed by the corpus fingerprint, so a
/// corpus edit on disk rebuilds the index on the next question.
pub struct QaPipeline {
    embeddings: Arc<dyn EmbeddingsClient>,
    answerer: Arc<dyn AnswerClient>,
    cache: RetrievalCache,
    corpus_path: PathBuf,
    top_k: usize,
}

impl QaPipeline {
    pub fn new(
        embeddings: Arc<dyn EmbeddingsClient>,
        answerer: Arc<dyn AnswerClient>,
        corpus_path: PathBuf,
    ) -> Self {
        let top_k = std::env::var("QA_TOP_K")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|k| *k >= 1)
            .unwrap_or(DEFAULT_TOP_K);

        Self {
            embeddings,
            answerer,
            cache: RetrievalCache::new(),
            corpus_path,
            top_k,
        }
    }

    pub async fn invalidate_index(&self) {
        self.cache.invalidate().await;
    }

    pub async fn ask(&self, question: &str) -> Result<QaAnswer> {
        let question = question.trim();
        anyhow::ensure!(!question.is_empty(), "question must be non-empty");

        let loaded = corpus::load_jsonl(&self.corpus_path)?;
        let version = loaded.version.clone();
        let index = self
            .cache
            .get_or_build(&version, || {
                let embeddings = Arc::clone(&self.embeddings);
                async move {
                    let chunks = loaded.chunks()?;
                    RetrievalIndex::build(embeddings.as_ref(), loaded.version, chunks).await
                }
            })
            .await?;

        let query_vecs = self
            .embeddings
            .embed(&[question.to_string()])
            .await
            .context("failed to embed question")?;
        let query = query_vecs
            .into_iter()
            .next()
            .context("embeddings returned no vector for the question")?;

        let hits = index.top_k(&query, self.top_k);
        let excerpts: Vec<String> = hits
            .iter()
            .filter_map(|(i, _)| index.chunk(*i).map(|c| c.to_string()))
            .collect();
        anyhow::ensure!(!excerpts.is_empty(), "retrieval produced no excerpts");

        tracing::debug!(
            corpus_version = %version,
            excerpts = excerpts.len(),
            "answering question from retrieved excerpts"
        );

        let answer = self
            .answerer
            .answer(AnswerInput {
                question: question.to_string(),
                excerpts: excerpts.clone(),
            })
            .await?;

        Ok(QaAnswer {
            answer,
            corpus_version: version,
            context_chunks: excerpts.len(),
        })
    }
}
