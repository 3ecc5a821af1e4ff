//! Embedding generation using fastembed (local, no API keys)
//!
//! The vector level of the cascade is an optional capability: the engine
//! probes this service once at startup and runs without it when the model
//! cannot be loaded.

use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};

/// Embedding service for generating vector embeddings locally
pub struct EmbeddingService {
    model: Arc<Mutex<TextEmbedding>>,
    dimensions: usize,
}

impl EmbeddingService {
    /// Probe the local embedding capability.
    ///
    /// Uses all-MiniLM-L6-v2 (384 dimensions, fast, good quality); the model
    /// downloads on first use to ~/.cache/fastembed. Any failure here means
    /// the capability is absent for the process lifetime — callers degrade
    /// to lexical matching, they do not retry.
    pub fn probe(config: &Config) -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .map_err(|e| Error::backend(format!("failed to load embedding model: {e}")))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimensions: config.embedding_dimensions,
        })
    }

    /// Generate an embedding for a single text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model.clone();
        let text = text.to_string();

        let mut guard = model.lock().await;
        let embeddings = guard
            .embed(vec![text], None)
            .map_err(|e| Error::backend(format!("embedding failed: {e}")))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::backend("no embedding returned"))
    }

    /// Get the embedding dimensions
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}
