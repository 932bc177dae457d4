//! Hybrid retrieval over the vector store and the lexical index
//!
//! Both searches run concurrently for every query. Vector scores become
//! `1 - distance`, lexical scores are divided by a fixed scale and clamped to
//! 1.0, then the two lists are concatenated (vector first), deduplicated by
//! chunk id keeping the first occurrence, and stably sorted by score.

mod classifier;

pub use classifier::{QueryCategory, classify_query};

use crate::bm25_search::{KeywordSearch, LexicalHit};
use crate::embedding::Embedder;
use crate::error::RetrievalError;
use crate::types::{MatchSource, ScoredResult};
use crate::vector_db::{VectorMatch, VectorStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Results of one query grouped by owning file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContext {
    pub file_path: String,
    /// In ranked order
    pub results: Vec<ScoredResult>,
}

/// Everything retrieved for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalContext {
    pub query: String,
    pub category: QueryCategory,
    pub results: Vec<ScoredResult>,
    /// Files in order of their best-ranked result
    pub files: Vec<FileContext>,
}

impl RetrievalContext {
    pub fn new(query: impl Into<String>, results: Vec<ScoredResult>) -> Self {
        let query = query.into();
        let mut files: Vec<FileContext> = Vec::new();
        for result in &results {
            match files
                .iter_mut()
                .find(|f| f.file_path == result.metadata.file_path)
            {
                Some(file) => file.results.push(result.clone()),
                None => files.push(FileContext {
                    file_path: result.metadata.file_path.clone(),
                    results: vec![result.clone()],
                }),
            }
        }

        Self {
            category: classify_query(&query),
            query,
            results,
            files,
        }
    }
}

/// Vector hit with similarity `1 - distance`
pub fn vector_result(hit: VectorMatch) -> ScoredResult {
    ScoredResult {
        id: hit.id,
        document: hit.document,
        metadata: hit.metadata,
        score: 1.0 - hit.distance,
        source: MatchSource::Vector,
    }
}

/// Lexical hit with its raw score scaled into [0, 1]
pub fn lexical_result(hit: LexicalHit, scale: f32) -> ScoredResult {
    ScoredResult {
        id: hit.id,
        document: hit.document,
        metadata: hit.metadata,
        score: (hit.score / scale).min(1.0),
        source: MatchSource::Lexical,
    }
}

/// Union of both lists, first occurrence of each id kept, highest score first.
///
/// The sort is stable, so equal scores keep concatenation order.
pub fn fuse(vector: Vec<ScoredResult>, lexical: Vec<ScoredResult>, k: usize) -> Vec<ScoredResult> {
    let mut seen = HashSet::new();
    let mut fused: Vec<ScoredResult> = vector
        .into_iter()
        .chain(lexical)
        .filter(|r| seen.insert(r.id.clone()))
        .collect();

    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(k);
    fused
}

pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    keyword: Arc<dyn KeywordSearch>,
    lexical_score_scale: f32,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        keyword: Arc<dyn KeywordSearch>,
        lexical_score_scale: f32,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            keyword,
            lexical_score_scale,
        }
    }

    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>> {
        let embedder = self.embedder.clone();
        let text = query.to_string();
        let mut embeddings = tokio::task::spawn_blocking(move || embedder.embed_batch(vec![text]))
            .await
            .context("Embedding task failed")?
            .context("Failed to embed query")?;
        let vector = embeddings
            .pop()
            .context("Embedder returned no vector for the query")?;

        let hits = self.vector_store.query(&vector, k).await?;
        Ok(hits.into_iter().map(vector_result).collect())
    }

    async fn lexical_search(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>> {
        let keyword = self.keyword.clone();
        let text = query.to_string();
        let hits = tokio::task::spawn_blocking(move || keyword.search(&text, k))
            .await
            .context("Lexical search task failed")??;

        let scale = self.lexical_score_scale;
        Ok(hits.into_iter().map(|hit| lexical_result(hit, scale)).collect())
    }

    /// Top `k` chunks for `query`.
    ///
    /// If one search path fails the other's results are returned; only when
    /// both fail is the query reported as unavailable.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredResult>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let (vector, lexical) =
            tokio::join!(self.vector_search(query, k), self.lexical_search(query, k));

        match (vector, lexical) {
            (Ok(vector), Ok(lexical)) => {
                tracing::debug!(
                    "Fusing {} vector and {} lexical results",
                    vector.len(),
                    lexical.len()
                );
                Ok(fuse(vector, lexical, k))
            }
            (Err(e), Ok(lexical)) => {
                tracing::warn!("Vector search failed, using lexical results only: {:#}", e);
                Ok(fuse(Vec::new(), lexical, k))
            }
            (Ok(vector), Err(e)) => {
                tracing::warn!("Lexical search failed, using vector results only: {:#}", e);
                Ok(fuse(vector, Vec::new(), k))
            }
            (Err(vector), Err(lexical)) => Err(RetrievalError::Unavailable {
                vector: format!("{:#}", vector),
                lexical: format!("{:#}", lexical),
            }),
        }
    }

    /// Search and wrap the results with their category and per-file grouping
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalContext, RetrievalError> {
        let results = self.search(query, k).await?;
        let context = RetrievalContext::new(query, results);
        tracing::info!(
            "Retrieved {} chunks from {} files (category: {})",
            context.results.len(),
            context.files.len(),
            context.category
        );
        Ok(context)
    }
}

#[cfg(test)]
mod tests;
