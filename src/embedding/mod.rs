//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and a local, deterministic
//! implementation that hashes tokens and character trigrams into a fixed
//! number of bins. No model files, no network.

pub mod hashing;

pub use hashing::{vectorize, HashingVectorizer};

/// Default number of dimensions for memory vectors.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of a fixed length (or all
/// zeros for text with no usable tokens). Calls are synchronous and side-effect free.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Embed a batch of text strings.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Stable identifier recorded in the store so a change of provider or
    /// dimension can be detected on open.
    fn identifier(&self) -> String;
}

/// Create the embedding provider for a configured dimension count.
pub fn create_provider(dimensions: usize) -> Box<dyn EmbeddingProvider> {
    Box::new(HashingVectorizer::new(dimensions))
}
