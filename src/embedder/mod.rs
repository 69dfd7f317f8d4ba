//! Embedding backends behind a shared capability trait.
//!
//! Backends are selected by explicit configuration, never by runtime type
//! inspection: `local` runs fastembed's ONNX models in-process, `openai`
//! calls an OpenAI-compatible embeddings endpoint.

pub mod local;
pub mod openai;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;

pub use local::LocalEmbedder;
pub use openai::OpenAiEmbedder;

/// Capability contract consumed by the sync engine and the query tool.
pub trait Embedder {
    /// Fixed output vector dimension, used to size the collection.
    fn dimension(&self) -> usize;

    /// Encodes `texts` into one vector per text, in order. Implementations
    /// split the input into requests of at most `batch_size` texts.
    fn encode(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>>;
}

/// Selectable embedding backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum BackendKind {
    /// fastembed ONNX models, downloaded and run locally.
    Local,
    /// OpenAI embeddings API.
    Openai,
}

/// Embedding configuration shared by the sync and query binaries.
#[derive(clap::Args, Debug, Clone)]
pub struct EmbedderArgs {
    /// Embedding backend
    #[arg(
        long = "embedding-backend",
        env = "EMBEDDING_BACKEND",
        value_enum,
        default_value_t = BackendKind::Local
    )]
    pub backend: BackendKind,

    /// Model name for the selected backend
    #[arg(long = "embedding-model", env = "EMBEDDING_MODEL")]
    pub model: Option<String>,

    /// Max texts per embedding request
    #[arg(long, env = "EMBEDDING_BATCH_SIZE", default_value_t = 32)]
    pub batch_size: usize,

    /// OpenAI API key (openai backend only)
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "OPENAI_BASE_URL",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Vector dimension override for unknown OpenAI models
    #[arg(long, env = "OPENAI_DIMENSIONS")]
    pub openai_dimensions: Option<usize>,

    /// Seconds to wait for each embedding request
    #[arg(long, env = "EMBEDDING_TIMEOUT_SECS", default_value_t = 60)]
    pub embedding_timeout_secs: u64,
}

impl EmbedderArgs {
    /// Model name that will actually be loaded, falling back to the selected
    /// backend's default when none is configured.
    pub fn model_label(&self) -> &str {
        match self.model.as_deref().filter(|m| !m.trim().is_empty()) {
            Some(model) => model,
            None => match self.backend {
                BackendKind::Local => local::DEFAULT_MODEL,
                BackendKind::Openai => openai::DEFAULT_MODEL,
            },
        }
    }
}

/// Builds the configured backend. Loading the local model may download it
/// on first use; this is the slow part of startup.
pub fn build_embedder(args: &EmbedderArgs) -> Result<Box<dyn Embedder>> {
    match args.backend {
        BackendKind::Local => {
            let embedder = LocalEmbedder::load(args.model.as_deref())?;
            Ok(Box::new(embedder))
        }
        BackendKind::Openai => {
            let api_key = args
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY must be set for the openai backend")?;
            let embedder = OpenAiEmbedder::new(
                api_key,
                args.openai_base_url.clone(),
                args.model.clone(),
                args.openai_dimensions,
                Duration::from_secs(args.embedding_timeout_secs.max(1)),
            )?;
            Ok(Box::new(embedder))
        }
    }
}
