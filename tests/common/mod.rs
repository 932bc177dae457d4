//! Deterministic collaborators shared by the integration tests
#![allow(dead_code)]

use anyhow::Result;
use code_rag::answer::ContextAnswerer;
use code_rag::chunker::{Chunk, Chunker, Dependency};
use code_rag::embedding::Embedder;
use code_rag::graph::IMPORTS;
use code_rag::vector_db::{USearchStore, VectorMatch, VectorRecord, VectorStore};
use code_rag::{Components, Config, RagClient};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

pub const DIM: usize = 32;

/// Token-hashing embedder: texts sharing words get similar vectors
pub struct TokenEmbedder;

impl Embedder for TokenEmbedder {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.0; DIM];
                for token in text.split_whitespace() {
                    let slot = token.bytes().fold(7usize, |h, b| h.wrapping_mul(31) + b as usize);
                    vector[slot % DIM] += 1.0;
                }
                vector
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn model_name(&self) -> &str {
        "token-hash"
    }
}

/// One chunk per blank-line separated paragraph, tagged `paragraph`.
/// `uses <File>` lines become `imports` edges to sibling files.
pub struct ParagraphChunker;

impl Chunker for ParagraphChunker {
    fn chunk(&self, file_path: &Path, content: &str) -> Vec<Chunk> {
        content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| Chunk::new("paragraph", file_path, p))
            .collect()
    }

    fn dependencies(&self, file_path: &Path, content: &str) -> Vec<Dependency> {
        let Some(dir) = file_path.parent() else {
            return Vec::new();
        };
        content
            .lines()
            .filter_map(|line| line.trim().strip_prefix("uses "))
            .map(|name| dir.join(name.trim()))
            .filter(|target| target.is_file())
            .map(|target| Dependency {
                target,
                kind: IMPORTS.to_string(),
            })
            .collect()
    }
}

/// Vector store whose queries can be switched off
pub struct FlakyStore {
    inner: USearchStore,
    pub queries_fail: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: USearchStore::new(),
            queries_fail: AtomicBool::new(false),
        }
    }

    pub fn fail_queries(&self, fail: bool) {
        self.queries_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl VectorStore for FlakyStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        self.inner.upsert(records).await
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        if self.queries_fail.load(Ordering::SeqCst) {
            anyhow::bail!("vector index unavailable");
        }
        self.inner.query(vector, limit).await
    }

    async fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        self.inner.delete_by_file(file_path).await
    }

    async fn records(&self) -> Result<Vec<VectorRecord>> {
        self.inner.records().await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// A temporary project plus isolated state paths
pub struct Project {
    pub dir: TempDir,
    pub root: PathBuf,
    pub config: Config,
}

impl Project {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();

        let mut config = Config::default();
        config.storage.graph_path = dir.path().join("state/graph.json");
        config.storage.vector_store_path = dir.path().join("state/vectors");
        config.indexing.auto_refresh_secs = 0;
        Self { dir, root, config }
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// Client with the paragraph chunker and the given store
    pub async fn client_with_store(&self, store: Arc<dyn VectorStore>) -> RagClient {
        let components = Components {
            chunker: Arc::new(ParagraphChunker),
            embedder: Arc::new(TokenEmbedder),
            vector_store: store,
            answerer: Arc::new(ContextAnswerer::default()),
        };
        RagClient::with_components(self.config.clone(), components)
            .await
            .unwrap()
    }

    /// Client with the paragraph chunker and a persistent in-process store
    pub async fn client(&self) -> (RagClient, Arc<USearchStore>) {
        let store = Arc::new(USearchStore::open(&self.config.storage.vector_store_path).unwrap());
        (self.client_with_store(store.clone()).await, store)
    }
}

/// Stored records as comparable rows, keyed by file name rather than full path
pub async fn store_rows(store: &dyn VectorStore) -> Vec<(String, String, usize, String)> {
    let mut rows: Vec<_> = store
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| {
            let name = Path::new(&r.metadata.file_path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned();
            (name, r.metadata.chunk_type, r.metadata.ordinal, r.document)
        })
        .collect();
    rows.sort();
    rows
}
