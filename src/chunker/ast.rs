use super::lines::split_on_lines;
use super::Chunk;
use crate::error::ChunkingError;
use std::path::Path;
use tree_sitter::{Language, Node, Parser};

/// Tag for class-like nodes (classes, interfaces, structs, modules, ...)
pub const CLASS: &str = "class";
/// Tag for function-like nodes (functions, methods, constructors)
pub const FUNCTION: &str = "function";

/// Grammar plus the node kinds worth chunking for one language
struct LanguageSpec {
    language: Language,
    class_kinds: &'static [&'static str],
    function_kinds: &'static [&'static str],
}

impl LanguageSpec {
    fn for_extension(extension: &str) -> Option<Self> {
        let (language, class_kinds, function_kinds): (Language, &[&str], &[&str]) =
            match extension.to_lowercase().as_str() {
                "java" => (
                    tree_sitter_java::LANGUAGE.into(),
                    &[
                        "class_declaration",
                        "interface_declaration",
                        "enum_declaration",
                        "record_declaration",
                    ],
                    &["method_declaration", "constructor_declaration"],
                ),
                "rs" => (
                    tree_sitter_rust::LANGUAGE.into(),
                    &["struct_item", "enum_item", "trait_item", "impl_item", "mod_item"],
                    &["function_item"],
                ),
                "py" => (
                    tree_sitter_python::LANGUAGE.into(),
                    &["class_definition"],
                    &["function_definition"],
                ),
                "js" | "mjs" | "cjs" | "jsx" => (
                    tree_sitter_javascript::LANGUAGE.into(),
                    &["class_declaration"],
                    &[
                        "function_declaration",
                        "generator_function_declaration",
                        "method_definition",
                    ],
                ),
                "ts" | "tsx" => (
                    tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
                    &["class_declaration", "interface_declaration"],
                    &[
                        "function_declaration",
                        "generator_function_declaration",
                        "method_definition",
                    ],
                ),
                "go" => (
                    tree_sitter_go::LANGUAGE.into(),
                    &["type_declaration"],
                    &["function_declaration", "method_declaration"],
                ),
                "swift" => (
                    tree_sitter_swift::LANGUAGE.into(),
                    &["class_declaration", "protocol_declaration"],
                    &[
                        "function_declaration",
                        "init_declaration",
                        "deinit_declaration",
                    ],
                ),
                "c" | "h" => (
                    tree_sitter_c::LANGUAGE.into(),
                    &["struct_specifier", "enum_specifier", "union_specifier"],
                    &["function_definition"],
                ),
                "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => (
                    tree_sitter_cpp::LANGUAGE.into(),
                    &[
                        "class_specifier",
                        "struct_specifier",
                        "enum_specifier",
                        "namespace_definition",
                    ],
                    &["function_definition"],
                ),
                "cs" => (
                    tree_sitter_c_sharp::LANGUAGE.into(),
                    &[
                        "class_declaration",
                        "struct_declaration",
                        "interface_declaration",
                        "enum_declaration",
                    ],
                    &["method_declaration", "constructor_declaration"],
                ),
                "rb" => (
                    tree_sitter_ruby::LANGUAGE.into(),
                    &["class", "singleton_class", "module"],
                    &["method", "singleton_method"],
                ),
                "php" => (
                    tree_sitter_php::LANGUAGE_PHP.into(),
                    &[
                        "class_declaration",
                        "interface_declaration",
                        "trait_declaration",
                    ],
                    &["function_definition", "method_declaration"],
                ),
                "kt" | "kts" => (
                    tree_sitter_kotlin_ng::LANGUAGE.into(),
                    &["class_declaration", "object_declaration"],
                    &["function_declaration"],
                ),
                _ => return None,
            };

        Some(Self {
            language,
            class_kinds,
            function_kinds,
        })
    }

    fn tag_for(&self, node: &Node) -> Option<&'static str> {
        let kind = node.kind();
        // C-family specifiers also appear as bare type references
        if kind.ends_with("_specifier") && node.child_by_field_name("body").is_none() {
            return None;
        }
        if self.class_kinds.contains(&kind) {
            Some(CLASS)
        } else if self.function_kinds.contains(&kind) {
            Some(FUNCTION)
        } else {
            None
        }
    }
}

/// Tree-sitter chunker emitting class and function chunks
#[derive(Debug, Clone)]
pub struct AstChunker {
    max_chunk_size: usize,
    min_chunk_size: usize,
}

impl AstChunker {
    pub fn new(max_chunk_size: usize, min_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            min_chunk_size,
        }
    }

    /// Whether a grammar exists for this file
    pub fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(LanguageSpec::for_extension)
            .is_some()
    }

    /// Extract structured chunks.
    ///
    /// Nodes up to `max_chunk_size` become one chunk; larger nodes are split
    /// on line boundaries into `{tag}_chunk` pieces. Nodes below
    /// `min_chunk_size` are skipped when an enclosing node was already emitted.
    pub fn chunk(&self, file_path: &Path, content: &str) -> Result<Vec<Chunk>, ChunkingError> {
        let extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let spec = LanguageSpec::for_extension(extension)
            .ok_or_else(|| ChunkingError::UnsupportedLanguage(extension.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&spec.language)
            .map_err(|e| ChunkingError::ParseFailed(format!("Failed to set language: {}", e)))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ChunkingError::ParseFailed(file_path.display().to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(ChunkingError::ParseFailed(format!(
                "Syntax errors in {}",
                file_path.display()
            )));
        }

        let mut chunks = Vec::new();
        self.collect(root, content, &spec, file_path, false, &mut chunks);
        Ok(chunks)
    }

    fn collect(
        &self,
        node: Node,
        source: &str,
        spec: &LanguageSpec,
        file_path: &Path,
        covered: bool,
        out: &mut Vec<Chunk>,
    ) {
        let mut covered_below = covered;

        if let Some(tag) = spec.tag_for(&node)
            && let Some(text) = source.get(node.byte_range())
        {
            let len = text.chars().count();
            if len > self.max_chunk_size {
                let piece_tag = format!("{}_chunk", tag);
                for piece in split_on_lines(text, self.max_chunk_size) {
                    out.push(Chunk::new(piece_tag.as_str(), file_path, piece));
                }
                covered_below = true;
            } else if len >= self.min_chunk_size || !covered {
                out.push(Chunk::new(tag, file_path, text.trim()));
                covered_below = true;
            }
        }

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            self.collect(child, source, spec, file_path, covered_below, out);
        }
    }
}
