// USearch HNSW store with a metadata sidecar and write journal
pub mod usearch_store;
pub use usearch_store::USearchStore;

use crate::types::{ChunkId, ChunkMetadata};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// One stored chunk: identity, embedding, text and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// A nearest-neighbour hit. `distance` is `1 - cosine similarity`.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: ChunkId,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Trait for vector store operations
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace records by id; returns the number written
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize>;

    /// Up to `limit` nearest records, closest first (ties by id)
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>>;

    /// Delete every record owned by a file; returns the number removed
    async fn delete_by_file(&self, file_path: &str) -> Result<usize>;

    /// All records in write order, oldest first
    async fn records(&self) -> Result<Vec<VectorRecord>>;

    /// Number of stored records
    async fn len(&self) -> Result<usize>;

    /// Flush/save changes to disk
    async fn flush(&self) -> Result<()>;
}
