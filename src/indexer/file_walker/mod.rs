//! File walking functionality for directory traversal

use crate::error::IndexingError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Exclusion rules: bare names match any path component, patterns with glob
/// metacharacters are matched against the path relative to the walk root.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    components: HashSet<String>,
    globs: GlobSet,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let mut components = HashSet::new();
        let mut builder = GlobSetBuilder::new();

        for pattern in patterns {
            if !pattern.contains(['*', '?', '[', '{']) {
                components.insert(pattern.trim_matches('/').to_string());
                continue;
            }

            let mut variants = vec![pattern.clone()];
            if !pattern.starts_with("**") && !pattern.starts_with('/') {
                variants.push(format!("**/{}", pattern));
            }
            for variant in variants {
                match Glob::new(&variant) {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring invalid exclude pattern '{}': {}", pattern, e);
                    }
                }
            }
        }

        let globs = builder.build().unwrap_or_else(|e| {
            tracing::warn!("Failed to build exclude patterns: {}", e);
            GlobSet::empty()
        });

        Self { components, globs }
    }

    /// `relative` must be relative to the walk root
    pub fn is_excluded(&self, relative: &Path) -> bool {
        relative
            .components()
            .any(|c| self.components.contains(c.as_os_str().to_string_lossy().as_ref()))
            || self.globs.is_match(relative)
    }
}

pub struct FileWalker {
    pub(crate) root: PathBuf,
    pub(crate) max_file_size: usize,
    pub(crate) extensions: Vec<String>,
    pub(crate) exclude_patterns: Vec<String>,
    /// Optional cancellation token - if cancelled, walk() will exit early
    cancel_token: Option<CancellationToken>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>, max_file_size: usize) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
            extensions: vec![],
            exclude_patterns: vec![],
            cancel_token: None,
        }
    }

    /// Only files with one of these extensions (without dot) are returned.
    /// An empty list accepts every extension.
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    pub fn with_exclude_patterns(mut self, exclude_patterns: Vec<String>) -> Self {
        self.exclude_patterns = exclude_patterns;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Canonical root, checked to be an existing directory
    pub fn resolve_root(&self) -> Result<PathBuf, IndexingError> {
        if !self.root.exists() {
            return Err(IndexingError::DirectoryNotFound(
                self.root.display().to_string(),
            ));
        }
        if !self.root.is_dir() {
            return Err(IndexingError::NotADirectory(self.root.display().to_string()));
        }
        fs::canonicalize(&self.root).map_err(|e| IndexingError::WalkFailed(e.to_string()))
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Walk the directory and collect eligible files as absolute paths, sorted
    pub fn walk(&self) -> Result<Vec<PathBuf>, IndexingError> {
        let root = self.resolve_root()?;
        let exclude = ExcludeMatcher::new(&self.exclude_patterns);

        let filter_root = root.clone();
        let filter_exclude = exclude.clone();
        let walker = WalkBuilder::new(&root)
            .standard_filters(true) // Respect .gitignore, .ignore, etc.
            .hidden(false)
            .require_git(false)
            .filter_entry(move |entry| {
                let relative = entry
                    .path()
                    .strip_prefix(&filter_root)
                    .unwrap_or(entry.path());
                !filter_exclude.is_excluded(relative)
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            if self.is_cancelled() {
                tracing::info!("File walk cancelled after {} files", files.len());
                return Err(IndexingError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            if path.components().any(|c| c.as_os_str() == ".git") {
                continue;
            }

            if !self.has_wanted_extension(path) {
                continue;
            }

            if let Ok(metadata) = fs::metadata(path)
                && metadata.len() > self.max_file_size as u64
            {
                tracing::debug!("Skipping large file: {:?}", path);
                continue;
            }

            files.push(path.to_path_buf());
        }

        files.sort();
        tracing::info!("Found {} eligible files under {:?}", files.len(), root);
        Ok(files)
    }
}
