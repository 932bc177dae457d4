//! Splitting file content into retrievable chunks
//!
//! [`DefaultChunker`] routes each file to the structured chunker for its
//! type (tree-sitter grammars, XML), falls back to line blocks when nothing
//! structured comes out, and appends DI declarations for JVM sources.

pub mod ast;
pub mod di;
pub mod imports;
pub mod language;
pub mod lines;
pub mod xml;

pub use ast::AstChunker;
pub use di::{DiAnalysis, DiAnalyzer};
pub use imports::ImportResolver;
pub use lines::LineChunker;
pub use xml::XmlChunker;

use crate::config::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A bounded excerpt of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Type tag (class, function, text_chunk, layout_element, di_module, ...)
    pub chunk_type: String,
    pub file_path: String,
    pub content: String,
    /// DI framework for DI chunks
    #[serde(default)]
    pub framework: Option<String>,
}

impl Chunk {
    pub fn new(chunk_type: impl Into<String>, file_path: &Path, content: impl Into<String>) -> Self {
        Self {
            chunk_type: chunk_type.into(),
            file_path: file_path.to_string_lossy().into_owned(),
            content: content.into(),
            framework: None,
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }
}

/// A relation discovered while chunking a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub target: PathBuf,
    pub kind: String,
}

/// Produces chunks for a file. Must not fail for any UTF-8 input.
pub trait Chunker: Send + Sync {
    fn chunk(&self, file_path: &Path, content: &str) -> Vec<Chunk>;

    /// Files this one depends on; fed into the dependency graph
    fn dependencies(&self, _file_path: &Path, _content: &str) -> Vec<Dependency> {
        Vec::new()
    }
}

/// Chunker used by the indexer unless one is injected
pub struct DefaultChunker {
    ast: AstChunker,
    xml: XmlChunker,
    lines: LineChunker,
    di: DiAnalyzer,
    imports: ImportResolver,
}

impl DefaultChunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            ast: AstChunker::new(config.max_chunk_size, config.min_chunk_size),
            xml: XmlChunker::new(config.max_chunk_size),
            lines: LineChunker::new(config.max_chunk_size),
            di: DiAnalyzer::new(),
            imports: ImportResolver::new(),
        }
    }

    /// DI frameworks seen in chunked files so far
    pub fn detected_frameworks(&self) -> Vec<String> {
        self.di.detected_frameworks()
    }

    fn structured(&self, file_path: &Path, content: &str) -> Vec<Chunk> {
        let is_xml = file_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));

        let result = if is_xml {
            self.xml.chunk(file_path, content)
        } else if AstChunker::supports(file_path) {
            self.ast.chunk(file_path, content)
        } else {
            return Vec::new();
        };

        result.unwrap_or_else(|e| {
            tracing::debug!(
                "Structured chunking failed for {:?}, using line fallback: {}",
                file_path,
                e
            );
            Vec::new()
        })
    }
}

impl Chunker for DefaultChunker {
    fn chunk(&self, file_path: &Path, content: &str) -> Vec<Chunk> {
        let mut chunks = self.structured(file_path, content);
        if chunks.is_empty() {
            chunks = self.lines.chunk(file_path, content);
        }

        if language::is_jvm_source(file_path) {
            chunks.extend(self.di.chunks(file_path, content));
        }

        chunks
    }

    fn dependencies(&self, file_path: &Path, content: &str) -> Vec<Dependency> {
        if language::is_jvm_source(file_path) {
            self.imports.dependencies(file_path, content)
        } else {
            Vec::new()
        }
    }
}
