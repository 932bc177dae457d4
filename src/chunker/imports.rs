use super::Dependency;
use crate::graph::IMPORTS;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Resolves JVM `import` statements to source files on disk
pub struct ImportResolver {
    import: Regex,
}

impl Default for ImportResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportResolver {
    pub fn new() -> Self {
        Self {
            import: Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([A-Za-z_][\w.]*?)(\.\*)?\s*(?:;|\s+as\s+\w+)?\s*$")
                .expect("import pattern is a valid regex"),
        }
    }

    /// Fully qualified names imported by `content`, wildcards excluded
    pub fn imported_names<'a>(&self, content: &'a str) -> Vec<&'a str> {
        self.import
            .captures_iter(content)
            .filter(|c| c.get(2).is_none())
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Nearest ancestor named `java` or `kotlin`, else the file's own directory
    pub fn source_root(file_path: &Path) -> Option<&Path> {
        file_path
            .ancestors()
            .skip(1)
            .find(|dir| {
                dir.file_name()
                    .is_some_and(|name| name == "java" || name == "kotlin")
            })
            .or_else(|| file_path.parent())
    }

    /// Map a qualified name to an existing `.kt` or `.java` file.
    ///
    /// Falls back to the enclosing name so nested-type and static-member
    /// imports land on the declaring file.
    pub fn resolve(&self, qualified: &str, file_path: &Path) -> Option<PathBuf> {
        let root = Self::source_root(file_path)?;
        let mut segments: Vec<&str> = qualified.split('.').collect();

        while !segments.is_empty() {
            let relative: PathBuf = segments.iter().collect();
            for ext in ["kt", "java"] {
                let candidate = root.join(&relative).with_extension(ext);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
            segments.pop();
            if segments.len() < 2 && qualified.contains('.') {
                break;
            }
        }
        None
    }

    /// `imports` edges for every import that resolves to an existing file
    pub fn dependencies(&self, file_path: &Path, content: &str) -> Vec<Dependency> {
        let mut targets: Vec<PathBuf> = self
            .imported_names(content)
            .into_iter()
            .filter_map(|name| self.resolve(name, file_path))
            .filter(|target| target != file_path)
            .collect();
        targets.sort();
        targets.dedup();

        targets
            .into_iter()
            .map(|target| Dependency {
                target,
                kind: IMPORTS.to_string(),
            })
            .collect()
    }
}
