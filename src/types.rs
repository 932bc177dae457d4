use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identity of a stored chunk.
///
/// Derived from the owning file, the chunk's type tag and its ordinal among
/// chunks of that tag in the file, never from content. Re-chunking a file
/// therefore overwrites the same slots instead of adding duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn derive(file_path: &str, chunk_type: &str, ordinal: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}-{}", file_path, chunk_type, ordinal).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChunkId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ChunkId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored with each chunk in both stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Absolute path of the owning file
    pub file_path: String,
    /// Type tag (class, function, text_chunk, di_component, ...)
    pub chunk_type: String,
    /// Position among chunks with the same type tag in this file
    pub ordinal: usize,
    /// DI framework the chunk belongs to, if any
    #[serde(default)]
    pub framework: Option<String>,
    /// Language detected from the file extension
    #[serde(default)]
    pub language: Option<String>,
    /// Fingerprint of the file content the chunk was cut from
    pub file_hash: String,
    /// Unix timestamp when indexed
    pub indexed_at: i64,
}

/// Which search path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Vector,
    Lexical,
}

/// A chunk with a unit-interval relevance score (per query, never persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: ChunkId,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
    pub source: MatchSource,
}

/// Indexing mode used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingMode {
    /// Every eligible file was processed
    Full,
    /// Only files whose fingerprint changed were processed
    Incremental,
}

impl fmt::Display for IndexingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexingMode::Full => f.write_str("full"),
            IndexingMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Summary of an indexing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub mode: IndexingMode,
    /// Eligible files found by the walk
    pub files_scanned: usize,
    /// Files whose chunks were stored and fingerprint advanced
    pub files_indexed: usize,
    /// Files skipped because their fingerprint had not changed
    pub files_unchanged: usize,
    /// Files that failed somewhere in the pipeline (retried next run)
    pub files_failed: usize,
    /// Files pruned because they disappeared from disk
    pub files_removed: usize,
    pub chunks_created: usize,
    pub embeddings_generated: usize,
    pub duration_ms: u64,
    /// Per-file failures (non-fatal)
    #[serde(default)]
    pub errors: Vec<String>,
}

impl IndexResponse {
    pub(crate) fn empty(mode: IndexingMode) -> Self {
        Self {
            mode,
            files_scanned: 0,
            files_indexed: 0,
            files_unchanged: 0,
            files_failed: 0,
            files_removed: 0,
            chunks_created: 0,
            embeddings_generated: 0,
            duration_ms: 0,
            errors: Vec::new(),
        }
    }
}

/// Counts reported by `RagClient::stats`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub tracked_files: usize,
    pub indexed_files: usize,
    pub dependency_edges: usize,
    pub vector_chunks: usize,
    pub lexical_documents: usize,
}
