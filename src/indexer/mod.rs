//! Full and incremental indexing of a project tree
//!
//! A run walks the eligible files, chunks them (in parallel on the rayon pool
//! when enabled), then stores each file in turn: dependency edges, embeddings,
//! vector store, lexical index and finally the file's fingerprint. A file whose
//! pipeline fails keeps its old fingerprint and is retried by the next run.

mod file_walker;
mod profile;

pub use file_walker::{ExcludeMatcher, FileWalker};
pub use profile::ProjectProfile;

use crate::bm25_search::{LexicalDocument, LexicalIndex};
use crate::chunker::{Chunk, Chunker, Dependency, language};
use crate::config::{Config, EmbeddingConfig, IndexingConfig};
use crate::embedding::Embedder;
use crate::error::{EmbeddingError, IndexingError};
use crate::graph::{DependencyGraph, fingerprint_bytes};
use crate::types::{ChunkId, ChunkMetadata, IndexResponse, IndexingMode};
use crate::vector_db::{VectorRecord, VectorStore};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Helper macro to check for cancellation and return early if cancelled
macro_rules! check_cancelled {
    ($cancel_token:expr) => {
        if $cancel_token.is_cancelled() {
            tracing::info!("Indexing operation cancelled");
            return Err(IndexingError::Cancelled.into());
        }
    };
}

/// A file read and chunked, waiting for the store phase
struct PreparedFile {
    path: PathBuf,
    /// Digest of exactly the bytes that were chunked
    fingerprint: String,
    chunks: Vec<Chunk>,
    dependencies: Vec<Dependency>,
}

/// Counts from storing one file
struct StoredFile {
    chunks: usize,
    embeddings: usize,
}

fn prepare(chunker: &dyn Chunker, path: &Path) -> Result<PreparedFile, IndexingError> {
    let bytes = std::fs::read(path).map_err(|e| IndexingError::FileReadFailed {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let fingerprint = fingerprint_bytes(&bytes);
    let content = String::from_utf8(bytes)
        .map_err(|_| IndexingError::InvalidUtf8(path.display().to_string()))?;

    Ok(PreparedFile {
        path: path.to_path_buf(),
        fingerprint,
        chunks: chunker.chunk(path, &content),
        dependencies: chunker.dependencies(path, &content),
    })
}

/// Chunk ids and metadata for a file's chunks, numbering each type tag from 0
fn describe_chunks(
    file_path: &str,
    file_hash: &str,
    chunks: &[Chunk],
) -> Vec<(ChunkId, ChunkMetadata)> {
    let language = language::language_of(Path::new(file_path)).map(str::to_string);
    let indexed_at = chrono::Utc::now().timestamp();
    let mut ordinals: HashMap<&str, usize> = HashMap::new();

    chunks
        .iter()
        .map(|chunk| {
            let next = ordinals.entry(chunk.chunk_type.as_str()).or_default();
            let ordinal = *next;
            *next += 1;

            let metadata = ChunkMetadata {
                file_path: file_path.to_string(),
                chunk_type: chunk.chunk_type.clone(),
                ordinal,
                framework: chunk.framework.clone(),
                language: language.clone(),
                file_hash: file_hash.to_string(),
                indexed_at,
            };
            (ChunkId::derive(file_path, &chunk.chunk_type, ordinal), metadata)
        })
        .collect()
}

/// Drives indexing runs against shared graph and stores
pub struct Indexer {
    indexing: IndexingConfig,
    embedding: EmbeddingConfig,
    graph_path: PathBuf,
    graph: Arc<RwLock<DependencyGraph>>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    lexical: Arc<LexicalIndex>,
}

impl Indexer {
    pub fn new(
        config: &Config,
        graph: Arc<RwLock<DependencyGraph>>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        lexical: Arc<LexicalIndex>,
    ) -> Self {
        Self {
            indexing: config.indexing.clone(),
            embedding: config.embedding.clone(),
            graph_path: config.storage.graph_path.clone(),
            graph,
            chunker,
            embedder,
            vector_store,
            lexical,
        }
    }

    /// Index `root`. Per-file failures are reported in the response; walk
    /// failures and cancellation abort the run.
    pub async fn index(
        &self,
        root: &Path,
        mode: IndexingMode,
        cancel_token: CancellationToken,
    ) -> Result<IndexResponse> {
        let start = Instant::now();
        let mut response = IndexResponse::empty(mode);

        let walker = FileWalker::new(root, self.indexing.max_file_size)
            .with_extensions(self.indexing.extensions.clone())
            .with_exclude_patterns(self.indexing.exclude_patterns.clone())
            .with_cancellation(cancel_token.clone());

        let (root, files, profile) = tokio::task::spawn_blocking(move || {
            let root = walker.resolve_root()?;
            let files = walker.walk()?;
            let profile = ProjectProfile::scan(&root, &files);
            Ok::<_, IndexingError>((root, files, profile))
        })
        .await
        .context("Failed to spawn file walker task")??;

        tracing::info!(
            "Project profile: {} libraries, plugins {:?}, compose: {}, DI: {:?}, {} permissions",
            profile.libraries.len(),
            profile.plugins,
            profile.compose,
            profile.di_frameworks,
            profile.permissions.len()
        );
        response.files_scanned = files.len();
        check_cancelled!(cancel_token);

        let candidates = match mode {
            IndexingMode::Full => files.clone(),
            IndexingMode::Incremental => {
                let graph = self.graph.read().await;
                files
                    .iter()
                    .filter(|path| graph.has_changed(path))
                    .cloned()
                    .collect()
            }
        };
        response.files_unchanged = files.len() - candidates.len();
        tracing::info!(
            "{} indexing of {:?}: {} files, {} to process",
            mode,
            root,
            files.len(),
            candidates.len()
        );

        let chunker = self.chunker.clone();
        let parallel = self.indexing.parallel_chunking;
        let prepared = tokio::task::spawn_blocking(move || {
            let run = |path: &PathBuf| (path.clone(), prepare(chunker.as_ref(), path));
            if parallel {
                candidates.par_iter().map(run).collect::<Vec<_>>()
            } else {
                candidates.iter().map(run).collect::<Vec<_>>()
            }
        })
        .await
        .context("Failed to spawn chunking task")?;

        for (path, prepared) in prepared {
            check_cancelled!(cancel_token);

            let file = match prepared {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", path, e);
                    response.files_failed += 1;
                    response.errors.push(e.to_string());
                    continue;
                }
            };

            match self.store_file(file).await {
                Ok(stored) => {
                    response.files_indexed += 1;
                    response.chunks_created += stored.chunks;
                    response.embeddings_generated += stored.embeddings;
                }
                Err(e) => {
                    tracing::warn!("Failed to index {:?}: {:#}", path, e);
                    response.files_failed += 1;
                    response.errors.push(format!("{}: {:#}", path.display(), e));
                }
            }
        }

        if self.indexing.prune_deleted {
            response.files_removed = self.prune_deleted(&root).await?;
        }

        response.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Indexing finished in {} ms: {} indexed, {} unchanged, {} failed, {} chunks",
            response.duration_ms,
            response.files_indexed,
            response.files_unchanged,
            response.files_failed,
            response.chunks_created
        );
        Ok(response)
    }

    /// Store one prepared file. The fingerprint is advanced only after both
    /// stores hold the file's new chunks. If a store step fails the file keeps
    /// its old fingerprint and the lexical index is re-aligned with whatever
    /// the vector store retained.
    async fn store_file(&self, file: PreparedFile) -> Result<StoredFile> {
        let file_path = file.path.to_string_lossy().into_owned();

        {
            let mut graph = self.graph.write().await;
            graph.add_file(&file.path);
            graph.clear_dependencies(&file.path);
            for dependency in &file.dependencies {
                graph.add_dependency(&file.path, &dependency.target, &dependency.kind);
            }
        }

        let described = describe_chunks(&file_path, &file.fingerprint, &file.chunks);
        let texts: Vec<String> = file.chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embed(texts).await?;
        let embeddings = vectors.len();

        let mut records = Vec::with_capacity(described.len());
        let mut documents = Vec::with_capacity(described.len());
        for (((id, metadata), chunk), vector) in described.into_iter().zip(file.chunks).zip(vectors) {
            documents.push(LexicalDocument {
                id: id.clone(),
                text: chunk.content.clone(),
                metadata: metadata.clone(),
            });
            records.push(VectorRecord {
                id,
                vector,
                document: chunk.content,
                metadata,
            });
        }
        let chunks = records.len();

        if let Err(e) = self.replace_chunks(&file_path, records, documents).await {
            self.resync_lexical(&file_path).await;
            return Err(e);
        }

        let mut graph = self.graph.write().await;
        graph.mark_indexed(&file.path, file.fingerprint);
        if let Err(e) = graph.save(&self.graph_path) {
            tracing::warn!("Failed to save dependency graph: {:#}", e);
        }
        tracing::debug!("Indexed {} ({} chunks)", file_path, chunks);

        Ok(StoredFile { chunks, embeddings })
    }

    /// Swap a file's chunks in both stores and flush the vector store
    async fn replace_chunks(
        &self,
        file_path: &str,
        records: Vec<VectorRecord>,
        documents: Vec<LexicalDocument>,
    ) -> Result<()> {
        self.vector_store
            .delete_by_file(file_path)
            .await
            .context("Failed to remove previous chunks")?;
        self.lexical.delete_by_file_path(file_path);

        if !records.is_empty() {
            self.vector_store
                .upsert(records)
                .await
                .context("Failed to store embeddings")?;
            self.lexical.add_documents(documents);
        }
        self.vector_store
            .flush()
            .await
            .context("Failed to flush vector store")
    }

    /// After a failed store step, make the lexical index hold exactly the
    /// chunks the vector store kept for `file_path`
    async fn resync_lexical(&self, file_path: &str) {
        self.lexical.delete_by_file_path(file_path);
        match self.vector_store.records().await {
            Ok(records) => {
                let documents: Vec<LexicalDocument> = records
                    .into_iter()
                    .filter(|r| r.metadata.file_path == file_path)
                    .map(|r| LexicalDocument {
                        id: r.id,
                        text: r.document,
                        metadata: r.metadata,
                    })
                    .collect();
                self.lexical.add_documents(documents);
            }
            Err(e) => {
                tracing::warn!("Failed to read back chunks of {}: {:#}", file_path, e);
            }
        }
    }

    /// Embed in configured batches, each on a blocking thread with a timeout
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.embedding.batch_size.max(1);
        let timeout_secs = self.embedding.timeout_secs;
        let dimension = self.embedder.dimension();
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(batch_size) {
            let expected = batch.len();
            let batch = batch.to_vec();
            let embedder = self.embedder.clone();
            let task = tokio::task::spawn_blocking(move || embedder.embed_batch(batch));

            let embeddings = match tokio::time::timeout(Duration::from_secs(timeout_secs), task).await
            {
                Ok(Ok(Ok(embeddings))) => embeddings,
                Ok(Ok(Err(e))) => {
                    return Err(EmbeddingError::GenerationFailed(format!("{:#}", e)).into());
                }
                Ok(Err(e)) => {
                    return Err(
                        EmbeddingError::GenerationFailed(format!("embedding task panicked: {}", e))
                            .into(),
                    );
                }
                Err(_) => return Err(EmbeddingError::Timeout(timeout_secs).into()),
            };

            if embeddings.len() != expected {
                return Err(EmbeddingError::CountMismatch {
                    expected,
                    actual: embeddings.len(),
                }
                .into());
            }
            if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: bad.len(),
                }
                .into());
            }
            vectors.extend(embeddings);
        }

        Ok(vectors)
    }

    /// Drop indexed files under `root` that no longer exist on disk
    async fn prune_deleted(&self, root: &Path) -> Result<usize> {
        let stale: Vec<PathBuf> = {
            let graph = self.graph.read().await;
            graph
                .indexed_files()
                .into_iter()
                .filter(|path| path.starts_with(root) && !path.exists())
                .collect()
        };
        if stale.is_empty() {
            return Ok(0);
        }

        for path in &stale {
            let file_path = path.to_string_lossy();
            self.vector_store
                .delete_by_file(&file_path)
                .await
                .context("Failed to remove chunks of deleted file")?;
            self.lexical.delete_by_file_path(&file_path);
            tracing::debug!("Pruned deleted file {:?}", path);
        }
        self.vector_store.flush().await?;

        let mut graph = self.graph.write().await;
        for path in &stale {
            graph.remove_file(path);
        }
        graph
            .save(&self.graph_path)
            .context("Failed to save dependency graph")?;

        tracing::info!("Pruned {} deleted files", stale.len());
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests;
