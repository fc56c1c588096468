//! Embedding backends for semantic entity matching
//!
//! The resolver's semantic tier embeds a search string and every candidate
//! record into a shared vector space and thresholds on cosine similarity.
//! Backends are optional: absence degrades to "no semantic candidates".

pub mod hashing;
pub mod local;

pub use hashing::HashingEmbedder;
pub use local::LocalEmbedder;

use crate::config::EmbeddingConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Contract for embedding generation
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output vector dimensions
    fn dimensions(&self) -> usize;

    /// Backend model name
    fn model_name(&self) -> &str;
}

/// Construct the configured backend. `hashing` selects the offline n-gram
/// embedder; anything else loads a fastembed model (downloading on first use).
pub async fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    if config.model == "hashing" {
        Ok(Arc::new(HashingEmbedder::new()))
    } else {
        Ok(Arc::new(LocalEmbedder::new(config.clone()).await?))
    }
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}
