use crate::types::{ChunkId, ChunkMetadata};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Default BM25 term-frequency saturation
pub const DEFAULT_K1: f32 = 1.5;
/// Default BM25 length normalization
pub const DEFAULT_B: f32 = 0.75;

/// A chunk handed to the lexical index
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalDocument {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Search result from BM25 with its raw (unnormalized) score
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub id: ChunkId,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Statistics about the lexical index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalStats {
    pub total_documents: usize,
    pub distinct_terms: usize,
}

/// Keyword search seam used by the hybrid retriever
pub trait KeywordSearch: Send + Sync {
    /// Top `limit` documents by raw relevance, highest first
    fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>>;
}

/// Whitespace tokenization, case preserved
pub fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

struct Slot {
    doc: LexicalDocument,
    length: usize,
    /// Arrival position among the live documents of the same file
    position: usize,
}

/// Per-file counters; an entry disappears with the file's last document
#[derive(Default)]
struct FileSlots {
    live: usize,
    next: usize,
}

#[derive(Default)]
struct Inner {
    /// Insertion-ordered arena; `None` marks a removed document
    slots: Vec<Option<Slot>>,
    by_id: HashMap<ChunkId, usize>,
    /// term -> (slot, term frequency), slots ascending
    postings: HashMap<String, Vec<(usize, u32)>>,
    files: HashMap<String, FileSlots>,
    live: usize,
    total_length: usize,
}

impl Inner {
    fn append(&mut self, doc: LexicalDocument) {
        let slot = self.slots.len();

        let mut counts: HashMap<&str, u32> = HashMap::new();
        let mut length = 0usize;
        for term in tokenize(&doc.text) {
            *counts.entry(term).or_default() += 1;
            length += 1;
        }
        for (term, tf) in counts {
            self.postings
                .entry(term.to_string())
                .or_default()
                .push((slot, tf));
        }

        let file = self.files.entry(doc.metadata.file_path.clone()).or_default();
        let position = file.next;
        file.next += 1;
        file.live += 1;

        self.by_id.insert(doc.id.clone(), slot);
        self.slots.push(Some(Slot {
            doc,
            length,
            position,
        }));
        self.live += 1;
        self.total_length += length;
    }

    fn remove_slot(&mut self, slot: usize) {
        let Some(removed) = self.slots.get_mut(slot).and_then(Option::take) else {
            return;
        };

        let mut terms: Vec<&str> = tokenize(&removed.doc.text).collect();
        terms.sort_unstable();
        terms.dedup();
        for term in terms {
            if let Some(list) = self.postings.get_mut(term) {
                list.retain(|(s, _)| *s != slot);
                if list.is_empty() {
                    self.postings.remove(term);
                }
            }
        }

        let path = &removed.doc.metadata.file_path;
        if let Some(file) = self.files.get_mut(path) {
            file.live -= 1;
            if file.live == 0 {
                self.files.remove(path);
            }
        }

        self.by_id.remove(&removed.doc.id);
        self.live -= 1;
        self.total_length -= removed.length;
    }

    /// Renumber slots once tombstones dominate, preserving insertion order
    fn maybe_compact(&mut self) {
        let dead = self.slots.len() - self.live;
        if dead < 64 || dead < self.live {
            return;
        }
        let docs: Vec<LexicalDocument> = self
            .slots
            .drain(..)
            .flatten()
            .map(|slot| slot.doc)
            .collect();
        *self = Inner::default();
        for doc in docs {
            self.append(doc);
        }
    }
}

/// In-process BM25 index over chunk texts.
///
/// Postings are updated per document, so adding or removing a file's chunks
/// costs time proportional to those chunks only. Results are ordered by score;
/// ties are broken by file path, then by arrival order within the file. A file
/// re-indexed on its own therefore ranks exactly as it would after a full run.
pub struct LexicalIndex {
    inner: RwLock<Inner>,
    k1: f32,
    b: f32,
}

impl Default for LexicalIndex {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl LexicalIndex {
    pub fn new(k1: f32, b: f32) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            k1,
            b,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add documents; an existing id is replaced and moves to the end of its file
    pub fn add_documents(&self, documents: Vec<LexicalDocument>) {
        let mut inner = self.write();
        for doc in documents {
            if let Some(&slot) = inner.by_id.get(&doc.id) {
                inner.remove_slot(slot);
            }
            inner.append(doc);
        }
        inner.maybe_compact();
    }

    /// Remove every document owned by `file_path`
    pub fn delete_by_file_path(&self, file_path: &str) -> usize {
        let mut inner = self.write();
        let slots: Vec<usize> = inner
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| {
                s.as_ref()
                    .filter(|slot| slot.doc.metadata.file_path == file_path)
                    .map(|_| i)
            })
            .collect();
        for &slot in &slots {
            inner.remove_slot(slot);
        }
        inner.maybe_compact();
        slots.len()
    }

    /// Replace the whole corpus
    pub fn rebuild(&self, documents: Vec<LexicalDocument>) {
        let mut inner = self.write();
        *inner = Inner::default();
        for doc in documents {
            if let Some(&slot) = inner.by_id.get(&doc.id) {
                inner.remove_slot(slot);
            }
            inner.append(doc);
        }
        inner.maybe_compact();
    }

    pub fn clear(&self) {
        *self.write() = Inner::default();
    }

    pub fn len(&self) -> usize {
        self.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.read().by_id.contains_key(id)
    }

    /// Ids of live documents in insertion order
    pub fn ids(&self) -> Vec<ChunkId> {
        self.read()
            .slots
            .iter()
            .flatten()
            .map(|slot| slot.doc.id.clone())
            .collect()
    }

    pub fn get_stats(&self) -> LexicalStats {
        let inner = self.read();
        LexicalStats {
            total_documents: inner.live,
            distinct_terms: inner.postings.len(),
        }
    }

    /// BM25 over whitespace tokens of `query`. Only documents sharing at least
    /// one term are returned.
    pub fn search(&self, query: &str, limit: usize) -> Vec<LexicalHit> {
        let inner = self.read();
        if limit == 0 || inner.live == 0 {
            return Vec::new();
        }

        let n = inner.live as f32;
        let avg_len = (inner.total_length as f32 / n).max(1.0);
        let mut scores: HashMap<usize, f32> = HashMap::new();

        // Repeated query terms count once per occurrence
        for term in tokenize(query) {
            let Some(postings) = inner.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();

            for &(slot, tf) in postings {
                let Some(doc) = &inner.slots[slot] else {
                    continue;
                };
                let tf = tf as f32;
                let norm = 1.0 - self.b + self.b * doc.length as f32 / avg_len;
                *scores.entry(slot).or_default() += idf * tf * (self.k1 + 1.0) / (tf + self.k1 * norm);
            }
        }

        let mut ranked: Vec<(&Slot, f32)> = scores
            .into_iter()
            .filter(|(_, s)| *s > 0.0)
            .filter_map(|(slot, score)| inner.slots[slot].as_ref().map(|s| (s, score)))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.doc.metadata.file_path.cmp(&b.0.doc.metadata.file_path))
                .then(a.0.position.cmp(&b.0.position))
        });
        ranked.truncate(limit);

        ranked
            .into_iter()
            .map(|(s, score)| LexicalHit {
                id: s.doc.id.clone(),
                document: s.doc.text.clone(),
                metadata: s.doc.metadata.clone(),
                score,
            })
            .collect()
    }
}

impl KeywordSearch for LexicalIndex {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<LexicalHit>> {
        Ok(LexicalIndex::search(self, query, limit))
    }
}
