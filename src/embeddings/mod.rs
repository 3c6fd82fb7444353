// Embeddings module
// Document splitting and the embedding service contract

pub mod chunking;

use async_trait::async_trait;

use crate::Result;

pub use chunking::{ChunkingConfig, split};

/// An embedding vector. All vectors stored in one index share a dimension.
pub type EmbeddingVector = Vec<f32>;

/// Turns text into embedding vectors
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Embed many texts. The output is in input order, one vector per text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
