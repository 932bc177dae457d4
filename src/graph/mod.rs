//! File dependency graph with per-file change tracking
//!
//! Nodes are files keyed by absolute path, edges are typed relations such as
//! `imports`. Each node carries the content fingerprint recorded the last time
//! the file was successfully indexed, which drives incremental indexing.

mod snapshot;

pub use snapshot::GraphSnapshot;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

/// Relation kind produced by import statements
pub const IMPORTS: &str = "imports";

/// Per-file state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    /// Content digest; `None` when the file could not be read
    pub fingerprint: Option<String>,
    /// Unix timestamp of the last successful index, `None` if never indexed
    pub last_indexed: Option<i64>,
}

/// A typed edge from `source` to `target`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub kind: String,
}

/// Directed graph of files with set semantics per (source, target, kind)
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, FileNode>,
    /// source -> {(target, kind)}
    outgoing: BTreeMap<String, BTreeSet<(String, String)>>,
    /// target -> {(source, kind)}
    incoming: BTreeMap<String, BTreeSet<(String, String)>>,
}

/// SHA-256 hex digest of raw bytes
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a file on disk, `None` if it cannot be read
pub fn fingerprint_file(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(fingerprint_bytes(&bytes)),
        Err(e) => {
            tracing::debug!("Cannot fingerprint {:?}: {}", path, e);
            None
        }
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node if absent, recording its current fingerprint. Idempotent.
    pub fn add_file(&mut self, path: &Path) {
        let k = key(path);
        if !self.nodes.contains_key(&k) {
            let node = FileNode {
                fingerprint: fingerprint_file(path),
                last_indexed: None,
            };
            self.nodes.insert(k, node);
        }
    }

    /// Add an edge, creating both nodes if needed. Returns false if an edge of
    /// the same kind between the same pair already existed.
    pub fn add_dependency(&mut self, source: &Path, target: &Path, kind: &str) -> bool {
        self.add_file(source);
        self.add_file(target);

        let (s, t) = (key(source), key(target));
        let inserted = self
            .outgoing
            .entry(s.clone())
            .or_default()
            .insert((t.clone(), kind.to_string()));
        if inserted {
            self.incoming
                .entry(t)
                .or_default()
                .insert((s, kind.to_string()));
        }
        inserted
    }

    /// Files whose shortest-path distance from `path` is at most `depth`,
    /// following edges forward (dependencies) or backward (dependents).
    ///
    /// Returns an empty list for unknown paths or `depth == 0`.
    pub fn related_files(&self, path: &Path, depth: usize) -> Vec<PathBuf> {
        let start = key(path);
        if !self.nodes.contains_key(&start) || depth == 0 {
            return Vec::new();
        }

        let mut related: BTreeSet<String> = BTreeSet::new();
        related.extend(Self::within_depth(&self.outgoing, &start, depth));
        related.extend(Self::within_depth(&self.incoming, &start, depth));
        related.remove(&start);

        related.into_iter().map(PathBuf::from).collect()
    }

    /// Breadth-first search so every node is first reached at its shortest distance
    fn within_depth(
        adjacency: &BTreeMap<String, BTreeSet<(String, String)>>,
        start: &str,
        depth: usize,
    ) -> Vec<String> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        let mut found = Vec::new();

        seen.insert(start);
        queue.push_back((start, 0));

        while let Some((node, dist)) = queue.pop_front() {
            if dist == depth {
                continue;
            }
            let Some(neighbours) = adjacency.get(node) else {
                continue;
            };
            for (next, _kind) in neighbours {
                if seen.insert(next.as_str()) {
                    found.push(next.clone());
                    queue.push_back((next.as_str(), dist + 1));
                }
            }
        }

        found
    }

    /// True when the file has never been indexed, cannot be read, or its
    /// current content differs from the recorded fingerprint.
    pub fn has_changed(&self, path: &Path) -> bool {
        let Some(node) = self.nodes.get(&key(path)) else {
            return true;
        };
        let (Some(recorded), Some(_)) = (&node.fingerprint, node.last_indexed) else {
            return true;
        };
        match fingerprint_file(path) {
            Some(current) => &current != recorded,
            None => true,
        }
    }

    /// Re-read the file and record its fingerprint as indexed.
    ///
    /// Call only after the file's chunks were persisted downstream. Returns
    /// false if the file could not be read, in which case it stays changed.
    pub fn update_fingerprint(&mut self, path: &Path) -> bool {
        match fingerprint_file(path) {
            Some(fingerprint) => {
                self.mark_indexed(path, fingerprint);
                true
            }
            None => {
                if let Some(node) = self.nodes.get_mut(&key(path)) {
                    node.fingerprint = None;
                }
                false
            }
        }
    }

    /// Record `fingerprint` (the digest of the content that was actually
    /// chunked) as the indexed state of `path`.
    pub fn mark_indexed(&mut self, path: &Path, fingerprint: String) {
        let node = self.nodes.entry(key(path)).or_default();
        node.fingerprint = Some(fingerprint);
        node.last_indexed = Some(chrono::Utc::now().timestamp());
    }

    /// Remove the outgoing edges of `source`, keeping the node. Used before a
    /// re-indexed file reports its current dependencies.
    pub fn clear_dependencies(&mut self, source: &Path) -> usize {
        let k = key(source);
        let Some(targets) = self.outgoing.remove(&k) else {
            return 0;
        };
        let removed = targets.len();
        for (target, kind) in targets {
            if let Some(set) = self.incoming.get_mut(&target) {
                set.remove(&(k.clone(), kind));
                if set.is_empty() {
                    self.incoming.remove(&target);
                }
            }
        }
        removed
    }

    /// Drop a node together with every edge touching it
    pub fn remove_file(&mut self, path: &Path) -> bool {
        let k = key(path);
        if self.nodes.remove(&k).is_none() {
            return false;
        }

        if let Some(targets) = self.outgoing.remove(&k) {
            for (target, kind) in targets {
                if let Some(set) = self.incoming.get_mut(&target) {
                    set.remove(&(k.clone(), kind));
                }
            }
        }
        if let Some(sources) = self.incoming.remove(&k) {
            for (source, kind) in sources {
                if let Some(set) = self.outgoing.get_mut(&source) {
                    set.remove(&(k.clone(), kind));
                }
            }
        }
        true
    }

    pub fn node(&self, path: &Path) -> Option<&FileNode> {
        self.nodes.get(&key(path))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(&key(path))
    }

    pub fn file_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn indexed_file_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.last_indexed.is_some())
            .count()
    }

    /// Paths of nodes that have been indexed at least once
    pub fn indexed_files(&self) -> Vec<PathBuf> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.last_indexed.is_some())
            .map(|(p, _)| PathBuf::from(p))
            .collect()
    }

    /// Most recent successful index of any file
    pub fn last_indexed_at(&self) -> Option<i64> {
        self.nodes.values().filter_map(|n| n.last_indexed).max()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(BTreeSet::len).sum()
    }

    /// All edges in (source, target, kind) order
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.outgoing
            .iter()
            .flat_map(|(source, targets)| {
                targets.iter().map(move |(target, kind)| DependencyEdge {
                    source: source.clone(),
                    target: target.clone(),
                    kind: kind.clone(),
                })
            })
            .collect()
    }

    /// Snapshot for persistence
    pub fn to_snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(self.nodes.clone(), self.edges())
    }

    /// Rebuild from a snapshot; edges referencing unknown nodes create them
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self {
            nodes: snapshot.nodes,
            ..Self::default()
        };
        for edge in snapshot.edges {
            graph.nodes.entry(edge.source.clone()).or_default();
            graph.nodes.entry(edge.target.clone()).or_default();
            graph
                .outgoing
                .entry(edge.source.clone())
                .or_default()
                .insert((edge.target.clone(), edge.kind.clone()));
            graph
                .incoming
                .entry(edge.target)
                .or_default()
                .insert((edge.source, edge.kind));
        }
        graph
    }

    /// Load from disk; a missing file yields an empty graph
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Ok(Self::from_snapshot(GraphSnapshot::load(path)?))
    }

    /// Persist to disk
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.to_snapshot().save(path)
    }
}
