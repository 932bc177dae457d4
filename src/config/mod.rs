/// Configuration system for code-rag
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, RagError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Which files are indexed and how runs behave
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Chunk size bounds for the built-in chunkers
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Hybrid search tuning
    #[serde(default)]
    pub search: SearchConfig,

    /// Where durable state lives
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File extensions (without dot) eligible for indexing
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Glob patterns or path components to skip
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,

    /// Chunk files on the rayon pool before the embed/store phase
    #[serde(default = "default_true")]
    pub parallel_chunking: bool,

    /// Drop graph nodes and stored chunks of files that no longer exist
    #[serde(default)]
    pub prune_deleted: bool,

    /// Run an incremental pass before a query when the last run is older than this (0 = never)
    #[serde(default = "default_auto_refresh_secs")]
    pub auto_refresh_secs: u64,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Upper bound (in characters) for a single chunk
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Structured nodes smaller than this are not emitted on their own
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2", "BAAI/bge-small-en-v1.5")
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Batch size for embedding generation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Timeout in seconds for one embedding batch
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result limit
    #[serde(default = "default_result_limit")]
    pub limit: usize,

    /// Raw BM25 score treated as maximally relevant when normalizing
    #[serde(default = "default_lexical_score_scale")]
    pub lexical_score_scale: f32,

    /// BM25 term-frequency saturation
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f32,

    /// BM25 length normalization
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f32,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Dependency graph + fingerprint snapshot
    #[serde(default = "default_graph_path")]
    pub graph_path: PathBuf,

    /// Vector store persistence file
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: PathBuf,
}

fn default_extensions() -> Vec<String> {
    ["java", "kt", "xml", "gradle", "kts", "properties"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_patterns() -> Vec<String> {
    ["build", ".gradle", ".git", ".idea", "target", "node_modules"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_file_size() -> usize {
    1_048_576 // 1 MB
}

fn default_true() -> bool {
    true
}

fn default_auto_refresh_secs() -> u64 {
    3600
}

fn default_max_chunk_size() -> usize {
    2000
}

fn default_min_chunk_size() -> usize {
    500
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_result_limit() -> usize {
    15
}

fn default_lexical_score_scale() -> f32 {
    10.0
}

fn default_bm25_k1() -> f32 {
    1.5
}

fn default_bm25_b() -> f32 {
    0.75
}

fn default_graph_path() -> PathBuf {
    crate::paths::PlatformPaths::default_graph_path()
}

fn default_vector_store_path() -> PathBuf {
    crate::paths::PlatformPaths::default_vector_store_path()
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size: default_max_file_size(),
            parallel_chunking: true,
            prune_deleted: false,
            auto_refresh_secs: default_auto_refresh_secs(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_result_limit(),
            lexical_score_scale: default_lexical_score_scale(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            graph_path: default_graph_path(),
            vector_store_path: default_vector_store_path(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, RagError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or fall back to defaults
    pub fn load_or_default() -> Result<Self, RagError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RagError> {
        fn invalid(key: &str, reason: impl Into<String>) -> RagError {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: reason.into(),
            }
            .into()
        }

        if self.indexing.extensions.is_empty() {
            return Err(invalid("indexing.extensions", "must list at least one extension"));
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        if self.chunking.max_chunk_size == 0 {
            return Err(invalid("chunking.max_chunk_size", "must be greater than 0"));
        }

        if self.chunking.min_chunk_size > self.chunking.max_chunk_size {
            return Err(invalid(
                "chunking.min_chunk_size",
                format!(
                    "must not exceed max_chunk_size ({}), got {}",
                    self.chunking.max_chunk_size, self.chunking.min_chunk_size
                ),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "must be greater than 0"));
        }

        if self.search.limit == 0 {
            return Err(invalid("search.limit", "must be greater than 0"));
        }

        let scale = self.search.lexical_score_scale;
        if scale.is_nan() || scale <= 0.0 {
            return Err(invalid(
                "search.lexical_score_scale",
                format!("must be positive, got {}", self.search.lexical_score_scale),
            ));
        }

        if !(0.0..=1.0).contains(&self.search.bm25_b) {
            return Err(invalid(
                "search.bm25_b",
                format!("must be between 0.0 and 1.0, got {}", self.search.bm25_b),
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("CODE_RAG_MODEL") {
            self.embedding.model_name = model;
        }

        if let Ok(batch_size) = std::env::var("CODE_RAG_BATCH_SIZE")
            && let Ok(size) = batch_size.parse()
        {
            self.embedding.batch_size = size;
        }

        if let Ok(limit) = std::env::var("CODE_RAG_LIMIT")
            && let Ok(limit) = limit.parse()
        {
            self.search.limit = limit;
        }

        if let Ok(scale) = std::env::var("CODE_RAG_LEXICAL_SCALE")
            && let Ok(scale) = scale.parse()
        {
            self.search.lexical_score_scale = scale;
        }

        if let Ok(path) = std::env::var("CODE_RAG_GRAPH_PATH") {
            self.storage.graph_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("CODE_RAG_VECTOR_PATH") {
            self.storage.vector_store_path = PathBuf::from(path);
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, RagError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
