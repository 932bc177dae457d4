use super::{VectorMatch, VectorRecord, VectorStore};
use crate::error::VectorDbError;
use crate::types::{ChunkId, ChunkMetadata};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

const INDEX_FILE: &str = "chunks.usearch";
const META_FILE: &str = "chunks.meta.json";
const JOURNAL_FILE: &str = "chunks.journal";

/// A snapshot is taken once the journal holds at least this many operations
/// and at least as many as there are live records.
const MIN_SNAPSHOT_OPS: usize = 1024;

/// Everything about a record except its vector, which lives in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    id: ChunkId,
    document: String,
    metadata: ChunkMetadata,
}

/// Metadata sidecar written next to the saved index
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    dimension: Option<usize>,
    next_key: u64,
    /// Keys grow with every write, so key order is write order
    entries: BTreeMap<u64, Entry>,
}

/// One line of the journal. Replaying an operation twice is harmless.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalOp {
    Upsert {
        key: u64,
        vector: Vec<f32>,
        entry: Entry,
    },
    Delete {
        key: u64,
    },
}

#[derive(Default)]
struct State {
    index: Option<Index>,
    meta: Sidecar,
    keys: HashMap<ChunkId, u64>,
    /// Operations applied in memory but not yet appended to the journal
    unflushed: Vec<JournalOp>,
    /// Operations in the journal since the last snapshot
    journal_len: usize,
}

fn new_index(dimension: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        expansion_add: 128,
        expansion_search: 64,
        ..Default::default()
    };
    Index::new(&options).context("Failed to create USearch index")
}

impl State {
    fn ensure_index(&mut self, dimension: usize) -> Result<&Index> {
        if self.index.is_none() {
            self.index = Some(new_index(dimension)?);
            self.meta.dimension = Some(dimension);
        }
        match (&self.index, self.meta.dimension) {
            (Some(index), Some(expected)) if expected == dimension => Ok(index),
            (_, expected) => Err(VectorDbError::StoreFailed(format!(
                "vector has {} dimensions, store has {}",
                dimension,
                expected.unwrap_or_default()
            ))
            .into()),
        }
    }

    fn apply_upsert(&mut self, key: u64, vector: &[f32], entry: Entry) -> Result<()> {
        self.ensure_index(vector.len())?;
        if let Some(previous) = self.keys.get(&entry.id).copied() {
            self.apply_delete(previous)?;
        }

        let index = self.ensure_index(vector.len())?;
        if index.contains(key) {
            index
                .remove(key)
                .context("Failed to remove vector from USearch index")?;
        }
        if index.size() + 1 > index.capacity() {
            let capacity = (index.capacity() * 2).max(64);
            index
                .reserve(capacity)
                .context("Failed to reserve USearch capacity")?;
        }
        index
            .add(key, vector)
            .context("Failed to add vector to USearch index")?;

        self.keys.insert(entry.id.clone(), key);
        self.meta.entries.insert(key, entry);
        self.meta.next_key = self.meta.next_key.max(key + 1);
        Ok(())
    }

    fn apply_delete(&mut self, key: u64) -> Result<()> {
        if let Some(index) = &self.index
            && index.contains(key)
        {
            index
                .remove(key)
                .context("Failed to remove vector from USearch index")?;
        }
        if let Some(entry) = self.meta.entries.remove(&key)
            && self.keys.get(&entry.id) == Some(&key)
        {
            self.keys.remove(&entry.id);
        }
        Ok(())
    }

    fn apply(&mut self, op: &JournalOp) -> Result<()> {
        match op {
            JournalOp::Upsert { key, vector, entry } => self.apply_upsert(*key, vector, entry.clone()),
            JournalOp::Delete { key } => self.apply_delete(*key),
        }
    }

    /// Every sidecar entry must have a vector in the index
    fn is_consistent(&self) -> bool {
        match &self.index {
            Some(index) => self.meta.entries.keys().all(|key| index.contains(*key)),
            None => self.meta.entries.is_empty(),
        }
    }
}

fn persist_error(path: &Path, reason: impl ToString) -> VectorDbError {
    VectorDbError::PersistFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Approximate nearest-neighbour store on a USearch HNSW index (cosine).
///
/// Text and metadata are kept in a sidecar keyed by the index's `u64` keys.
/// A persistent store lives in a directory: `flush` appends the operations
/// since the previous flush to a journal, and once the journal outgrows the
/// live record count the index and sidecar are saved and the journal is
/// truncated. Each flush therefore writes in proportion to what changed.
pub struct USearchStore {
    state: RwLock<State>,
    persist_dir: Option<PathBuf>,
}

impl Default for USearchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl USearchStore {
    /// Store without persistence
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            persist_dir: None,
        }
    }

    /// Open a persistent store in `dir`. A missing directory yields an empty
    /// store. A snapshot whose index lacks vectors for its metadata is
    /// discarded with a warning; unreadable metadata is an error.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut state = State::default();

        let meta_path = dir.join(META_FILE);
        if meta_path.exists() {
            let content = fs::read_to_string(&meta_path)
                .with_context(|| format!("Failed to read vector metadata {:?}", meta_path))?;
            state.meta = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse vector metadata {:?}", meta_path))?;
        }

        let index_path = dir.join(INDEX_FILE);
        if let Some(dimension) = state.meta.dimension
            && index_path.exists()
        {
            let index = new_index(dimension)?;
            index
                .load(&index_path.to_string_lossy())
                .context("Failed to load USearch index")?;
            state.index = Some(index);
        }

        let journal_path = dir.join(JOURNAL_FILE);
        if !state.is_consistent() {
            tracing::warn!(
                "Vector index in {:?} does not match its metadata, starting empty",
                dir
            );
            for path in [&meta_path, &index_path, &journal_path] {
                if path.exists() {
                    fs::remove_file(path).map_err(|e| persist_error(path, e))?;
                }
            }
            state = State::default();
        }
        state.keys = state
            .meta
            .entries
            .iter()
            .map(|(key, entry)| (entry.id.clone(), *key))
            .collect();

        let mut torn = false;
        if journal_path.exists() {
            let file = fs::File::open(&journal_path)
                .with_context(|| format!("Failed to open vector journal {:?}", journal_path))?;
            for line in BufReader::new(file).lines() {
                let line = line.context("Failed to read vector journal")?;
                if line.trim().is_empty() {
                    continue;
                }
                // A torn final line from an interrupted append is dropped
                let Ok(op) = serde_json::from_str::<JournalOp>(&line) else {
                    tracing::warn!("Ignoring unreadable journal entry in {:?}", journal_path);
                    torn = true;
                    break;
                };
                state.apply(&op)?;
                state.journal_len += 1;
            }
        }
        // Later appends must not land behind the torn line
        if torn {
            Self::snapshot(dir, &state)?;
            state.journal_len = 0;
        }

        tracing::debug!(
            "Opened vector store {:?}: {} records, {} journal entries",
            dir,
            state.meta.entries.len(),
            state.journal_len
        );

        Ok(Self {
            state: RwLock::new(state),
            persist_dir: Some(dir.to_path_buf()),
        })
    }

    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| VectorDbError::LockPoisoned.into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| VectorDbError::LockPoisoned.into())
    }

    fn append_journal(dir: &Path, ops: &[JournalOp]) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| persist_error(dir, e))?;
        let path = dir.join(JOURNAL_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| persist_error(&path, e))?;

        let mut writer = BufWriter::new(file);
        for op in ops {
            serde_json::to_writer(&mut writer, op).context("Failed to serialize journal entry")?;
            writer.write_all(b"\n").map_err(|e| persist_error(&path, e))?;
        }
        writer.flush().map_err(|e| persist_error(&path, e))?;
        Ok(())
    }

    /// Save index and sidecar via temporary files, then empty the journal
    fn snapshot(dir: &Path, state: &State) -> Result<()> {
        let meta_path = dir.join(META_FILE);
        let meta_tmp = dir.join(format!("{}.tmp", META_FILE));
        let content =
            serde_json::to_string(&state.meta).context("Failed to serialize vector metadata")?;
        fs::write(&meta_tmp, content).map_err(|e| persist_error(&meta_tmp, e))?;

        let index_path = dir.join(INDEX_FILE);
        match &state.index {
            Some(index) => {
                let index_tmp = dir.join(format!("{}.tmp", INDEX_FILE));
                index
                    .save(&index_tmp.to_string_lossy())
                    .context("Failed to save USearch index")?;
                fs::rename(&index_tmp, &index_path).map_err(|e| persist_error(&index_path, e))?;
            }
            None if index_path.exists() => {
                fs::remove_file(&index_path).map_err(|e| persist_error(&index_path, e))?;
            }
            None => {}
        }
        fs::rename(&meta_tmp, &meta_path).map_err(|e| persist_error(&meta_path, e))?;

        let journal_path = dir.join(JOURNAL_FILE);
        fs::write(&journal_path, b"").map_err(|e| persist_error(&journal_path, e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorStore for USearchStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        let mut state = self.write()?;
        let journaled = self.persist_dir.is_some();
        let count = records.len();

        for record in records {
            let key = state.meta.next_key;
            let entry = Entry {
                id: record.id,
                document: record.document,
                metadata: record.metadata,
            };
            let previous = state.keys.get(&entry.id).copied();
            if let Err(e) = state.apply_upsert(key, &record.vector, entry.clone()) {
                // The replaced vector may already be gone; keep the journal in step
                if journaled
                    && let Some(previous) = previous
                    && !state.meta.entries.contains_key(&previous)
                {
                    state.unflushed.push(JournalOp::Delete { key: previous });
                }
                return Err(e);
            }
            if journaled {
                state.unflushed.push(JournalOp::Upsert {
                    key,
                    vector: record.vector,
                    entry,
                });
            }
        }
        Ok(count)
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        let state = self.read()?;
        let Some(index) = &state.index else {
            return Ok(Vec::new());
        };
        if limit == 0 || state.meta.entries.is_empty() {
            return Ok(Vec::new());
        }
        if index.dimensions() != vector.len() {
            return Err(VectorDbError::SearchFailed(format!(
                "query has {} dimensions, store has {}",
                vector.len(),
                index.dimensions()
            ))
            .into());
        }

        let matches = index
            .search(vector, limit)
            .context("Failed to search USearch index")?;

        let mut hits: Vec<VectorMatch> = matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                state.meta.entries.get(key).map(|entry| VectorMatch {
                    id: entry.id.clone(),
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                    distance: *distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let mut state = self.write()?;
        let keys: Vec<u64> = state
            .meta
            .entries
            .iter()
            .filter(|(_, entry)| entry.metadata.file_path == file_path)
            .map(|(key, _)| *key)
            .collect();

        let journaled = self.persist_dir.is_some();
        for &key in &keys {
            state.apply_delete(key)?;
            if journaled {
                state.unflushed.push(JournalOp::Delete { key });
            }
        }
        Ok(keys.len())
    }

    async fn records(&self) -> Result<Vec<VectorRecord>> {
        let state = self.read()?;
        let (Some(index), Some(dimension)) = (&state.index, state.meta.dimension) else {
            return Ok(Vec::new());
        };

        state
            .meta
            .entries
            .iter()
            .map(|(key, entry)| {
                let mut vector = vec![0.0f32; dimension];
                let found = index
                    .get(*key, vector.as_mut_slice())
                    .context("Failed to read vector from USearch index")?;
                if found == 0 {
                    return Err(VectorDbError::SearchFailed(format!(
                        "no vector stored for key {}",
                        key
                    ))
                    .into());
                }
                Ok(VectorRecord {
                    id: entry.id.clone(),
                    vector,
                    document: entry.document.clone(),
                    metadata: entry.metadata.clone(),
                })
            })
            .collect()
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.read()?.meta.entries.len())
    }

    async fn flush(&self) -> Result<()> {
        let Some(dir) = &self.persist_dir else {
            return Ok(());
        };
        let mut state = self.write()?;
        if state.unflushed.is_empty() {
            return Ok(());
        }

        Self::append_journal(dir, &state.unflushed)?;
        state.journal_len += state.unflushed.len();
        state.unflushed.clear();

        if state.journal_len >= MIN_SNAPSHOT_OPS.max(state.meta.entries.len()) {
            Self::snapshot(dir, &state)?;
            tracing::debug!(
                "Saved vector snapshot to {:?} after {} journal entries",
                dir,
                state.journal_len
            );
            state.journal_len = 0;
        }
        Ok(())
    }
}
