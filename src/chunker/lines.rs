use super::{Chunk, Chunker};
use std::path::Path;

/// Tag used for line-fallback chunks
pub const TEXT_CHUNK: &str = "text_chunk";

/// Split `text` on line boundaries into pieces of at most `max_chars`.
///
/// A single line longer than the limit becomes its own piece. Pieces are
/// trimmed and whitespace-only pieces are dropped.
pub fn split_on_lines(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            push_trimmed(&mut pieces, &current);
            current.clear();
            current_len = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len + 1;
    }
    push_trimmed(&mut pieces, &current);

    pieces
}

fn push_trimmed(pieces: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        pieces.push(trimmed.to_string());
    }
}

/// Chunker for files with no structured parser
#[derive(Debug, Clone)]
pub struct LineChunker {
    max_chunk_size: usize,
}

impl LineChunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { max_chunk_size }
    }
}

impl Chunker for LineChunker {
    fn chunk(&self, file_path: &Path, content: &str) -> Vec<Chunk> {
        split_on_lines(content, self.max_chunk_size)
            .into_iter()
            .map(|piece| Chunk::new(TEXT_CHUNK, file_path, piece))
            .collect()
    }
}
