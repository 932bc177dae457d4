use super::Embedder;
use anyhow::{Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Mutex;

/// Models selectable by name: (config name, fastembed model, dimension)
const MODELS: &[(&str, EmbeddingModel, usize)] = &[
    ("all-MiniLM-L6-v2", EmbeddingModel::AllMiniLML6V2, 384),
    ("all-MiniLM-L12-v2", EmbeddingModel::AllMiniLML12V2, 384),
    ("BAAI/bge-small-en-v1.5", EmbeddingModel::BGESmallENV15, 384),
    ("BAAI/bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15, 768),
];

/// Look up a supported model by its configured name
pub(crate) fn lookup_model(name: &str) -> Option<(&'static str, EmbeddingModel, usize)> {
    MODELS
        .iter()
        .find(|(model_name, _, _)| model_name.eq_ignore_ascii_case(name))
        .map(|(model_name, model, dim)| (*model_name, model.clone(), *dim))
}

/// FastEmbed-based local embedder
pub struct FastEmbedManager {
    model: Mutex<TextEmbedding>,
    model_name: &'static str,
    dimension: usize,
}

impl FastEmbedManager {
    /// Create with the default model (all-MiniLM-L6-v2)
    pub fn new() -> Result<Self> {
        Self::from_model_name("all-MiniLM-L6-v2")
    }

    /// Create from a configured model name
    pub fn from_model_name(name: &str) -> Result<Self> {
        let (model_name, model, dimension) = lookup_model(name).with_context(|| {
            let supported: Vec<&str> = MODELS.iter().map(|(n, _, _)| *n).collect();
            format!(
                "Unsupported embedding model '{}', expected one of: {}",
                name,
                supported.join(", ")
            )
        })?;

        tracing::info!("Initializing FastEmbed model: {}", model_name);

        let options = InitOptions::new(model).with_show_download_progress(true);
        let embedding_model =
            TextEmbedding::try_new(options).context("Failed to initialize FastEmbed model")?;

        Ok(Self {
            model: Mutex::new(embedding_model),
            model_name,
            dimension,
        })
    }
}

impl Embedder for FastEmbedManager {
    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow::anyhow!("Embedding model lock poisoned"))?;
        let embeddings = model
            .embed(texts, None)
            .context("Failed to generate embeddings")?;

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        self.model_name
    }
}
