//! Offline hashing embedder
//!
//! Character n-gram and word hashing into a fixed-size normalized vector.
//! No model download, fully deterministic. Coarser than a learned model but
//! usable where the pipeline must run with no network access at all.

use crate::error::Result;
use crate::embeddings::EmbeddingBackend;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Vector dimensions, matching the all-MiniLM-L6-v2 default so the two
/// backends are interchangeable in storage
pub const HASHING_DIM: usize = 384;

/// Deterministic n-gram hashing embedder
#[derive(Debug, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn embed_text(text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; HASHING_DIM];

        let text_lower = text.to_lowercase();
        let chars: Vec<char> = text_lower.chars().collect();

        // Character n-grams
        for window_size in 2..=4 {
            for window in chars.windows(window_size) {
                let mut hasher = DefaultHasher::new();
                window.iter().collect::<String>().hash(&mut hasher);
                let hash = hasher.finish();

                let dim = (hash as usize) % HASHING_DIM;
                embedding[dim] += 1.0;
            }
        }

        // Words weighted more than character n-grams
        for word in text_lower.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let hash = hasher.finish();

            let dim = (hash as usize) % HASHING_DIM;
            embedding[dim] += 2.0;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::embed_text(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_text(t)).collect())
    }

    fn dimensions(&self) -> usize {
        HASHING_DIM
    }

    fn model_name(&self) -> &str {
        "hashing"
    }
}
