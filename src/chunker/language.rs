//! Language detection from file extensions

use std::path::Path;

/// Detect language from a file extension
pub fn detect_language(extension: &str) -> Option<&'static str> {
    let lang = match extension.to_lowercase().as_str() {
        "java" => "Java",
        "kt" => "Kotlin",
        "kts" => "Kotlin Script",
        "gradle" => "Gradle",
        "xml" => "XML",
        "properties" => "Properties",
        "rs" => "Rust",
        "py" => "Python",
        "js" | "mjs" | "cjs" | "jsx" => "JavaScript",
        "ts" | "tsx" => "TypeScript",
        "go" => "Go",
        "swift" => "Swift",
        "c" | "h" => "C",
        "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => "C++",
        "cs" => "C#",
        "rb" => "Ruby",
        "php" => "PHP",
        "json" => "JSON",
        "yaml" | "yml" => "YAML",
        "toml" => "TOML",
        "md" | "markdown" => "Markdown",
        _ => return None,
    };

    Some(lang)
}

/// Detect language for a path
pub fn language_of(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(detect_language)
}

/// JVM sources whose imports map to files under a source root
pub fn is_jvm_source(path: &Path) -> bool {
    matches!(language_of(path), Some("Java" | "Kotlin" | "Kotlin Script"))
}
