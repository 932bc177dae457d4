//! # code-rag - incremental codebase indexing with hybrid retrieval
//!
//! Indexes a source tree into retrievable chunks and answers natural-language
//! queries with the most relevant ones, ranked by a fusion of BM25 keyword
//! scores and embedding similarity.
//!
//! ## Overview
//!
//! A dependency graph records, for every file, the content fingerprint seen at
//! its last successful index together with `imports` edges discovered while
//! chunking. Incremental runs re-process only files whose fingerprint changed,
//! and a file's fingerprint is advanced only after both stores hold its new
//! chunks, so an interrupted run is simply resumed by the next one.
//!
//! ## Architecture
//!
//! ```text
//!              index                          query
//!                |                              |
//!          +-----v-----+                 +------v---------+
//!          |  Indexer  |                 | HybridRetriever|
//!          +-----+-----+                 +---+--------+---+
//!                |                           |        |
//!   FileWalker -> Chunker -> Embedder        |        |
//!                |      \                    |        |
//!   DependencyGraph      +--> VectorStore <--+        |
//!   (fingerprints,       +--> LexicalIndex <----------+
//!    imports edges)                          |
//!                                      Answerer
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: dependency graph, change detection and its JSON snapshot
//! - [`chunker`]: tree-sitter, XML, DI and line-based chunking
//! - [`embedding`]: embedding trait and the FastEmbed implementation
//! - [`vector_db`]: vector store trait and the USearch-backed store
//! - [`bm25_search`]: incremental BM25 inverted index
//! - [`indexer`]: file walking, project profile and the indexing pipeline
//! - [`retrieval`]: hybrid search, fusion and query categories
//! - [`answer`]: turning retrieved context into a response
//! - [`client`]: [`RagClient`], wiring everything together
//!
//! ## Usage Example
//!
//! ```no_run
//! use code_rag::{IndexingMode, RagClient};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RagClient::new().await?;
//!     let summary = client.index(Path::new("."), IndexingMode::Incremental).await?;
//!     println!("{} files indexed", summary.files_indexed);
//!
//!     let response = client.query("which module provides Retrofit?", Some(10)).await?;
//!     println!("{}", response.answer);
//!     Ok(())
//! }
//! ```

/// Answer generation from retrieved context
pub mod answer;

/// BM25 keyword search over chunk texts
pub mod bm25_search;

/// Content chunking strategies
pub mod chunker;

/// Library client tying the pipeline together
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Embedding generation using FastEmbed
pub mod embedding;

/// Error types and utilities
pub mod error;

/// File dependency graph and change tracking
pub mod graph;

/// File walking and the indexing pipeline
pub mod indexer;

/// Platform data, cache and config directories
pub mod paths;

/// Hybrid vector + lexical retrieval
pub mod retrieval;

/// Shared request/response and identity types
pub mod types;

/// Vector store abstraction
pub mod vector_db;

pub use client::{Components, QueryResponse, RagClient};
pub use config::Config;
pub use error::RagError;
pub use types::{ChunkId, IndexResponse, IndexingMode, ScoredResult};
