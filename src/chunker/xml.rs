use super::Chunk;
use super::lines::split_on_lines;
use crate::error::ChunkingError;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::path::Path;

pub const MANIFEST_PERMISSIONS: &str = "manifest_permissions";
pub const MANIFEST_APPLICATION: &str = "manifest_application";
pub const LAYOUT_ELEMENT: &str = "layout_element";
pub const LAYOUT_ELEMENT_CHUNK: &str = "layout_element_chunk";

/// Chunker for Android manifests and resource/layout XML
#[derive(Debug, Clone)]
pub struct XmlChunker {
    max_chunk_size: usize,
}

impl XmlChunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { max_chunk_size }
    }

    pub fn chunk(&self, file_path: &Path, content: &str) -> Result<Vec<Chunk>, ChunkingError> {
        let is_manifest = file_path
            .file_name()
            .is_some_and(|name| name == "AndroidManifest.xml");

        if is_manifest {
            self.chunk_manifest(file_path, content)
        } else {
            self.chunk_layout(file_path, content)
        }
    }

    fn chunk_manifest(&self, file_path: &Path, content: &str) -> Result<Vec<Chunk>, ChunkingError> {
        let mut reader = Reader::from_str(content);
        let mut depth = 0usize;
        let mut permissions = Vec::new();
        let mut application: Option<Vec<String>> = None;

        loop {
            let event = reader.read_event().map_err(|e| parse_error(&reader, e))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_start = matches!(event, Event::Start(_));
                    match e.name().as_ref() {
                        b"uses-permission" => {
                            if let Some(name) = attribute(e, b"android:name") {
                                permissions.push(name);
                            }
                        }
                        b"application" if depth == 1 && application.is_none() => {
                            application = Some(attribute_lines(e));
                        }
                        _ => {}
                    }
                    if is_start {
                        depth += 1;
                    }
                }
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(ChunkingError::ParseFailed("unclosed element".to_string()));
        }

        let mut chunks = Vec::new();
        if !permissions.is_empty() {
            chunks.push(Chunk::new(
                MANIFEST_PERMISSIONS,
                file_path,
                permissions.join("\n"),
            ));
        }
        if let Some(lines) = application {
            chunks.push(Chunk::new(MANIFEST_APPLICATION, file_path, lines.join("\n")));
        }
        Ok(chunks)
    }

    /// One chunk per direct child of the root element
    fn chunk_layout(&self, file_path: &Path, content: &str) -> Result<Vec<Chunk>, ChunkingError> {
        let mut reader = Reader::from_str(content);
        let mut depth = 0usize;
        let mut child_start = 0usize;
        let mut spans = Vec::new();

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| parse_error(&reader, e))?;
            let after = reader.buffer_position() as usize;
            match event {
                Event::Start(_) => {
                    if depth == 1 {
                        child_start = before;
                    }
                    depth += 1;
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 1 {
                        spans.push((child_start, after));
                    }
                }
                Event::Empty(_) if depth == 1 => spans.push((before, after)),
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(ChunkingError::ParseFailed("unclosed element".to_string()));
        }

        let mut chunks = Vec::new();
        for (start, end) in spans {
            let Some(element) = content.get(start..end) else {
                continue;
            };
            if element.chars().count() > self.max_chunk_size {
                for piece in split_on_lines(element, self.max_chunk_size) {
                    chunks.push(Chunk::new(LAYOUT_ELEMENT_CHUNK, file_path, piece));
                }
            } else {
                chunks.push(Chunk::new(LAYOUT_ELEMENT, file_path, element));
            }
        }
        Ok(chunks)
    }
}

fn parse_error(reader: &Reader<&[u8]>, error: quick_xml::Error) -> ChunkingError {
    ChunkingError::ParseFailed(format!(
        "XML error at byte {}: {}",
        reader.error_position(),
        error
    ))
}

fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.into_owned())
}

fn attribute_lines(element: &BytesStart) -> Vec<String> {
    element
        .attributes()
        .flatten()
        .filter_map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().ok()?;
            Some(format!("{}: {}", key, value))
        })
        .collect()
}
