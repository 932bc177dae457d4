//! Turning retrieved context into a response

use crate::retrieval::RetrievalContext;
use anyhow::Result;
use std::fmt::Write;

/// Roughly 4000 tokens of context
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 16_000;

/// Consumes ranked chunks and the query, produces a response
#[async_trait::async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, query: &str, context: &RetrievalContext) -> Result<String>;
}

/// Renders the retrieved context as plain text without calling a model.
///
/// Ranked snippets come first, then the same chunks grouped by file. Output
/// stops at the first section that would push it past `max_chars`.
#[derive(Debug, Clone)]
pub struct ContextAnswerer {
    max_chars: usize,
}

impl Default for ContextAnswerer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_CHARS)
    }
}

impl ContextAnswerer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn render(&self, query: &str, context: &RetrievalContext) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Question: {}", query);
        let _ = writeln!(out, "Category: {}", context.category);

        if context.results.is_empty() {
            out.push_str("\nNo relevant code found in the index.\n");
            return out;
        }

        let mut sections = Vec::new();
        sections.push("\nMost relevant snippets:\n".to_string());
        for (i, result) in context.results.iter().enumerate() {
            let mut section = String::new();
            let _ = writeln!(
                section,
                "### Snippet {} ({}, score {:.3})",
                i + 1,
                result.metadata.chunk_type,
                result.score
            );
            let _ = writeln!(section, "File: {}", result.metadata.file_path);
            if let Some(framework) = &result.metadata.framework {
                let _ = writeln!(section, "Framework: {}", framework);
            }
            let _ = writeln!(section, "{}\n", result.document);
            sections.push(section);
        }

        sections.push("Relevant files:\n".to_string());
        for file in &context.files {
            let mut section = String::new();
            let _ = writeln!(section, "### File: {}", file.file_path);
            for result in &file.results {
                let _ = writeln!(section, "- {} #{}", result.metadata.chunk_type, result.metadata.ordinal);
            }
            section.push('\n');
            sections.push(section);
        }

        for section in sections {
            if out.len() + section.len() > self.max_chars {
                tracing::debug!("Context truncated at {} chars", out.len());
                out.push_str("[truncated]\n");
                break;
            }
            out.push_str(&section);
        }
        out
    }
}

#[async_trait::async_trait]
impl Answerer for ContextAnswerer {
    async fn answer(&self, query: &str, context: &RetrievalContext) -> Result<String> {
        Ok(self.render(query, context))
    }
}
