use super::{DependencyEdge, FileNode};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of the dependency graph and its fingerprints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphSnapshot {
    pub version: u32,
    /// Absolute path -> node state
    pub nodes: BTreeMap<String, FileNode>,
    pub edges: Vec<DependencyEdge>,
}

impl Default for GraphSnapshot {
    fn default() -> Self {
        Self::new(BTreeMap::new(), Vec::new())
    }
}

impl GraphSnapshot {
    pub fn new(nodes: BTreeMap<String, FileNode>, edges: Vec<DependencyEdge>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            nodes,
            edges,
        }
    }

    /// Load snapshot from disk
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Graph snapshot not found, starting with empty graph");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).context("Failed to read graph snapshot")?;

        let snapshot: GraphSnapshot =
            serde_json::from_str(&content).context("Failed to parse graph snapshot")?;

        tracing::info!(
            "Loaded graph snapshot with {} files and {} edges",
            snapshot.nodes.len(),
            snapshot.edges.len()
        );
        Ok(snapshot)
    }

    /// Save snapshot to disk, replacing the previous file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create graph directory")?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize graph snapshot")?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).context("Failed to write graph snapshot")?;
        fs::rename(&tmp, path).context("Failed to replace graph snapshot")?;

        tracing::debug!("Saved graph snapshot to {:?}", path);
        Ok(())
    }
}
