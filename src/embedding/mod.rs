//! Embedding generation for dense retrieval.
//!
//! Provides an OpenAI-compatible HTTP embedder with retry/backoff and a
//! deterministic hash-based fallback for offline and test use.

mod fallback;
mod openai;

pub use fallback::FallbackEmbedder;
pub use openai::OpenAiEmbedder;

use crate::error::Result;

/// Default embedding dimensions (text-embedding-3-small).
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Hard maximum number of texts per embedding batch.
pub const MAX_BATCH_SIZE: usize = 64;

/// Maximum characters sent per text in an embedding call. Oversize chunk
/// text is truncated for the call only, never in the stored chunk.
pub const MAX_EMBED_CHARS: usize = 8000;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe to support parallel embedding
/// during ingestion.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// The default implementation calls `embed` sequentially; batch-aware
    /// implementations override this.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Truncates text to the embedding character cap on a grapheme boundary.
#[must_use]
pub fn truncate_for_embedding(text: &str) -> &str {
    use unicode_segmentation::UnicodeSegmentation;

    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = 0;
    for (idx, grapheme) in text.grapheme_indices(true) {
        if idx + grapheme.len() > MAX_EMBED_CHARS {
            break;
        }
        end = idx + grapheme.len();
    }
    &text[..end]
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns 0.0 for mismatched lengths or zero-magnitude vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Retry schedule for provider calls: exponential backoff with base
/// 500 ms, cap 8 s, up to 3 retries.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    /// Base delay in milliseconds.
    pub base_ms: u64,
    /// Delay cap in milliseconds.
    pub cap_ms: u64,
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base_ms: 500,
            cap_ms: 8_000,
            max_retries: 3,
        }
    }
}

impl Backoff {
    /// Delay before retry `attempt` (1-based), in milliseconds.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let exp = self.base_ms.saturating_mul(1_u64 << attempt.saturating_sub(1).min(16));
        exp.min(self.cap_ms)
    }
}
