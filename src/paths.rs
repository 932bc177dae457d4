/// Platform-specific locations for the graph snapshot, vector store and config
///
/// Follows the XDG Base Directory specification on Unix-like systems.
use std::path::PathBuf;

const APP_DIR: &str = "code-rag";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Resolve a base directory: an explicit override variable, then a path
    /// under `$HOME`, then the current directory.
    fn resolve(override_var: &str, home_suffix: &str) -> PathBuf {
        std::env::var(override_var)
            .map(PathBuf::from)
            .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(home_suffix)))
            .unwrap_or_else(|_| PathBuf::from("."))
    }

    /// Data directory
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_DATA_HOME or ~/.local/share
    pub fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            Self::resolve("LOCALAPPDATA", "AppData/Local")
        } else if cfg!(target_os = "macos") {
            Self::resolve("CODE_RAG_MACOS_DATA_DIR", "Library/Application Support")
        } else {
            Self::resolve("XDG_DATA_HOME", ".local/share")
        }
    }

    /// Cache directory
    ///
    /// - Windows: %LOCALAPPDATA%
    /// - macOS: ~/Library/Caches
    /// - Linux/Unix: $XDG_CACHE_HOME or ~/.cache
    pub fn cache_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            Self::resolve("LOCALAPPDATA", "AppData/Local")
        } else if cfg!(target_os = "macos") {
            Self::resolve("CODE_RAG_MACOS_CACHE_DIR", "Library/Caches")
        } else {
            Self::resolve("XDG_CACHE_HOME", ".cache")
        }
    }

    /// Config directory
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            Self::resolve("APPDATA", "AppData/Roaming")
        } else if cfg!(target_os = "macos") {
            Self::resolve("CODE_RAG_MACOS_CONFIG_DIR", "Library/Application Support")
        } else {
            Self::resolve("XDG_CONFIG_HOME", ".config")
        }
    }

    /// Returns: {data_dir}/code-rag
    pub fn project_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// Returns: {cache_dir}/code-rag
    pub fn project_cache_dir() -> PathBuf {
        Self::cache_dir().join(APP_DIR)
    }

    /// Returns: {config_dir}/code-rag
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Returns: {cache_dir}/code-rag/dependency_graph.json
    pub fn default_graph_path() -> PathBuf {
        Self::project_cache_dir().join("dependency_graph.json")
    }

    /// Returns: {data_dir}/code-rag/vectors
    pub fn default_vector_store_path() -> PathBuf {
        Self::project_data_dir().join("vectors")
    }

    /// Returns: {config_dir}/code-rag/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }
}
