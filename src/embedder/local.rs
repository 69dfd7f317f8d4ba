//! Local embedding backend built on fastembed (ONNX Runtime).

use std::sync::Mutex;

use anyhow::{anyhow, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use super::Embedder;

pub(crate) const DEFAULT_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// In-process embedder; the first load downloads the model to the fastembed
/// cache directory.
pub struct LocalEmbedder {
    // TextEmbedding::embed takes &mut self.
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

impl LocalEmbedder {
    /// Loads the named model (default BAAI/bge-small-en-v1.5) and resolves
    /// its vector dimension by encoding a probe string.
    pub fn load(model_name: Option<&str>) -> Result<Self> {
        let requested = model_name.unwrap_or(DEFAULT_MODEL);
        let model_id = resolve_model(requested)?;
        info!("loading embedding model: {requested}");

        let mut model = TextEmbedding::try_new(
            InitOptions::new(model_id).with_show_download_progress(false),
        )
        .map_err(|err| anyhow!("failed to load embedding model {requested}: {err}"))?;

        let probe = model
            .embed(vec!["dimension probe"], None)
            .map_err(|err| anyhow!("embedding probe failed: {err}"))?;
        let dimension = probe
            .into_iter()
            .next()
            .map(|v| v.len())
            .ok_or_else(|| anyhow!("model returned no probe embedding"))?;
        info!("embedding model ready (dim={dimension})");

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }
}

impl Embedder for LocalEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut model = self
            .model
            .lock()
            .map_err(|_| anyhow!("embedding model mutex poisoned"))?;
        model
            .embed(texts.to_vec(), Some(batch_size.max(1)))
            .map_err(|err| anyhow!("local embedding failed: {err}"))
    }
}

/// Maps user-facing model names onto fastembed model identifiers.
fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    let model = match name.to_lowercase().as_str() {
        "baai/bge-small-en-v1.5" | "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "baai/bge-base-en-v1.5" | "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "baai/bge-large-en-v1.5" | "bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        "sentence-transformers/all-minilm-l6-v2" | "all-minilm-l6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "nomic-ai/nomic-embed-text-v1.5" | "nomic-embed-text-v1.5" => {
            EmbeddingModel::NomicEmbedTextV15
        }
        other => {
            anyhow::bail!(
                "unsupported local embedding model '{other}'; try {DEFAULT_MODEL} or all-MiniLM-L6-v2"
            )
        }
    };
    Ok(model)
}
