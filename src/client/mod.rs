//! Core library client for code-rag
//!
//! [`RagClient`] owns the dependency graph and both stores, and exposes
//! indexing, querying, graph traversal and statistics.

use crate::answer::{Answerer, ContextAnswerer};
use crate::bm25_search::{LexicalDocument, LexicalIndex};
use crate::chunker::{Chunker, DefaultChunker};
use crate::config::Config;
use crate::embedding::{Embedder, FastEmbedManager};
use crate::graph::DependencyGraph;
use crate::indexer::Indexer;
use crate::retrieval::{HybridRetriever, RetrievalContext};
use crate::types::{IndexResponse, IndexingMode, StatisticsResponse};
use crate::vector_db::{USearchStore, VectorStore};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Pluggable collaborators of a client
pub struct Components {
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_store: Arc<dyn VectorStore>,
    pub answerer: Arc<dyn Answerer>,
}

/// Answer to one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub context: RetrievalContext,
    pub answer: String,
    /// Incremental run performed before the query, if the index was stale
    pub refreshed: Option<IndexResponse>,
    pub duration_ms: u64,
}

/// State shared by clones of one client
#[derive(Default)]
struct RunState {
    /// Root of the most recent index run
    root: Option<PathBuf>,
    /// Unix timestamp when the most recent run finished
    finished_at: Option<i64>,
}

/// Main client for indexing a project and querying it
///
/// # Example
///
/// ```no_run
/// use code_rag::RagClient;
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = RagClient::new().await?;
///     client.index(Path::new("/path/to/app"), code_rag::IndexingMode::Incremental).await?;
///
///     let response = client.query("Where is the Hilt network module?", None).await?;
///     println!("{}", response.answer);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct RagClient {
    config: Arc<Config>,
    graph: Arc<RwLock<DependencyGraph>>,
    vector_store: Arc<dyn VectorStore>,
    lexical: Arc<LexicalIndex>,
    indexer: Arc<Indexer>,
    retriever: Arc<HybridRetriever>,
    answerer: Arc<dyn Answerer>,
    /// Held for the duration of an index run so runs never interleave
    run_state: Arc<Mutex<RunState>>,
}

impl RagClient {
    /// Create a client from the default configuration sources
    pub async fn new() -> Result<Self> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::with_config(config).await
    }

    /// Create a client with the fastembed model and the persistent in-process
    /// vector store named by `config`
    pub async fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing RAG client");
        tracing::debug!("Embedding model: {}", config.embedding.model_name);
        tracing::debug!("Graph snapshot: {:?}", config.storage.graph_path);

        let model_name = config.embedding.model_name.clone();
        let embedder = tokio::task::spawn_blocking(move || FastEmbedManager::from_model_name(&model_name))
            .await
            .context("Embedding model task failed")?
            .context("Failed to initialize embedding provider")?;

        let store_path = config.storage.vector_store_path.clone();
        let vector_store = tokio::task::spawn_blocking(move || USearchStore::open(&store_path))
            .await
            .context("Vector store task failed")?
            .context("Failed to open vector store")?;
        tracing::info!(
            "Using vector store directory: {:?}",
            config.storage.vector_store_path
        );

        let components = Components {
            chunker: Arc::new(DefaultChunker::new(&config.chunking)),
            embedder: Arc::new(embedder),
            vector_store: Arc::new(vector_store),
            answerer: Arc::new(ContextAnswerer::default()),
        };
        Self::with_components(config, components).await
    }

    /// Create a client around injected collaborators. The graph is loaded from
    /// `config.storage.graph_path` and the lexical index is rebuilt from the
    /// vector store's records.
    pub async fn with_components(config: Config, components: Components) -> Result<Self> {
        let graph_path = config.storage.graph_path.clone();
        let mut graph = DependencyGraph::load(&graph_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load dependency graph: {:#}, starting fresh", e);
            DependencyGraph::new()
        });

        let records = components
            .vector_store
            .records()
            .await
            .context("Failed to read vector store records")?;
        if records.is_empty() && graph.indexed_file_count() > 0 {
            tracing::warn!(
                "Vector store is empty but {} files are recorded as indexed; they will be re-indexed",
                graph.indexed_file_count()
            );
            graph = DependencyGraph::new();
        }

        let lexical = Arc::new(LexicalIndex::new(
            config.search.bm25_k1,
            config.search.bm25_b,
        ));
        lexical.rebuild(
            records
                .into_iter()
                .map(|r| LexicalDocument {
                    id: r.id,
                    text: r.document,
                    metadata: r.metadata,
                })
                .collect(),
        );
        tracing::info!(
            "Loaded {} tracked files and {} chunks",
            graph.file_count(),
            lexical.len()
        );

        let graph = Arc::new(RwLock::new(graph));
        let indexer = Indexer::new(
            &config,
            graph.clone(),
            components.chunker,
            components.embedder.clone(),
            components.vector_store.clone(),
            lexical.clone(),
        );
        let retriever = HybridRetriever::new(
            components.embedder,
            components.vector_store.clone(),
            lexical.clone(),
            config.search.lexical_score_scale,
        );

        Ok(Self {
            config: Arc::new(config),
            graph,
            vector_store: components.vector_store,
            lexical,
            indexer: Arc::new(indexer),
            retriever: Arc::new(retriever),
            answerer: components.answerer,
            run_state: Arc::new(Mutex::new(RunState::default())),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index a project directory
    pub async fn index(&self, root: &Path, mode: IndexingMode) -> Result<IndexResponse> {
        self.index_with_cancellation(root, mode, CancellationToken::new())
            .await
    }

    /// Index a project directory, stopping between files once `cancel_token` fires
    pub async fn index_with_cancellation(
        &self,
        root: &Path,
        mode: IndexingMode,
        cancel_token: CancellationToken,
    ) -> Result<IndexResponse> {
        let mut state = self.run_state.lock().await;
        let response = self.indexer.index(root, mode, cancel_token).await?;

        state.root = Some(std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()));
        state.finished_at = Some(chrono::Utc::now().timestamp());
        Ok(response)
    }

    /// Incremental run over the last indexed root when the index is older
    /// than `auto_refresh_secs`. Returns `None` when no run was needed.
    async fn refresh_if_stale(&self) -> Option<IndexResponse> {
        let max_age = self.config.indexing.auto_refresh_secs;
        if max_age == 0 {
            return None;
        }

        let root = {
            // A run in progress will leave the index fresh
            let Ok(state) = self.run_state.try_lock() else {
                return None;
            };
            let root = state.root.clone()?;
            let graph_latest = self.graph.read().await.last_indexed_at();
            let latest = state.finished_at.max(graph_latest);
            let now = chrono::Utc::now().timestamp();
            if latest.is_some_and(|at| now - at < max_age as i64) {
                return None;
            }
            root
        };

        tracing::info!("Index is older than {} s, refreshing {:?}", max_age, root);
        match self.index(&root, IndexingMode::Incremental).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!("Auto-refresh failed, querying stale index: {:#}", e);
                None
            }
        }
    }

    /// Remember `root` as the project to refresh before queries
    pub async fn set_project_root(&self, root: &Path) {
        let mut state = self.run_state.lock().await;
        state.root = Some(std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf()));
    }

    /// Retrieve context for `query` and produce an answer from it.
    ///
    /// `limit` defaults to `search.limit`. Fails with a
    /// [`RetrievalError`](crate::error::RetrievalError) when neither search
    /// path is available; an empty result is a success.
    pub async fn query(&self, query: &str, limit: Option<usize>) -> Result<QueryResponse> {
        let start = Instant::now();
        let refreshed = self.refresh_if_stale().await;

        let limit = limit.unwrap_or(self.config.search.limit);
        let context = self.retriever.retrieve(query, limit).await?;
        let answer = self
            .answerer
            .answer(query, &context)
            .await
            .context("Failed to produce answer")?;

        Ok(QueryResponse {
            context,
            answer,
            refreshed,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Files within `depth` hops of `path` in either direction
    pub async fn related_files(&self, path: &Path, depth: usize) -> Vec<PathBuf> {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.graph.read().await.related_files(&path, depth)
    }

    /// True if `path` would be processed by an incremental run
    pub async fn has_changed(&self, path: &Path) -> bool {
        let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.graph.read().await.has_changed(&path)
    }

    pub async fn stats(&self) -> Result<StatisticsResponse> {
        let (tracked_files, indexed_files, dependency_edges) = {
            let graph = self.graph.read().await;
            (graph.file_count(), graph.indexed_file_count(), graph.edge_count())
        };
        Ok(StatisticsResponse {
            tracked_files,
            indexed_files,
            dependency_edges,
            vector_chunks: self.vector_store.len().await?,
            lexical_documents: self.lexical.len(),
        })
    }
}
