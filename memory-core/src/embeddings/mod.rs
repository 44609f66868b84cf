//! Embedding adapter (component A).
//!
//! Wraps a text-to-vector function behind the [`EmbeddingProvider`] trait so
//! the rest of the crate never depends on a specific embedding backend. A
//! deterministic, dependency-free [`HashEmbeddingProvider`] is supplied so
//! the crate is buildable and testable without a live model; production
//! callers supply their own `EmbeddingProvider` implementation.

use async_trait::async_trait;

/// A text-to-vector embedding backend.
///
/// Vectors returned by `embed_text`/`embed_batch` must be L2-normalized and
/// of length `dimensions()`. Implementations should treat batch embedding as
/// semantically equivalent to mapping `embed_text` over each input, though
/// they may override `embed_batch` for efficiency.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text into a unit-normalized vector.
    async fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed a batch of texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text).await?);
        }
        Ok(out)
    }

    /// Name reported in `stats()`/bundle manifests for portability checks.
    fn model_name(&self) -> &str;

    /// Fixed output dimensionality of this provider.
    fn dimensions(&self) -> usize;

    /// Provider identifier for bundle manifests (e.g. `"hash-shingle"`, `"openai"`).
    fn provider(&self) -> &str;
}

/// A deterministic embedding provider with no external dependencies.
///
/// Maps text to a fixed-dimension unit vector derived from character
/// shingle hashes, so identical text always yields an identical vector and
/// near-identical text yields similar vectors (useful for dedup and
/// hybrid-search tests without a live model).
pub struct HashEmbeddingProvider {
    dimensions: usize,
    model_name: String,
}

impl HashEmbeddingProvider {
    /// Construct a provider emitting vectors of the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            model_name: "hash-shingle-v1".to_string(),
        }
    }

    fn shingle_hashes(text: &str) -> Vec<u64> {
        const SHINGLE_LEN: usize = 3;
        let chars: Vec<char> = text.to_lowercase().chars().collect();
        if chars.len() < SHINGLE_LEN {
            return vec![fnv1a(text)];
        }
        chars
            .windows(SHINGLE_LEN)
            .map(|w| fnv1a(&w.iter().collect::<String>()))
            .collect()
    }
}

fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut vec = vec![0f32; self.dimensions];
        for hash in Self::shingle_hashes(text) {
            let bucket = (hash as usize) % self.dimensions;
            let sign = if (hash >> 63) & 1 == 1 { -1.0 } else { 1.0 };
            vec[bucket] += sign;
        }
        normalize(&mut vec);
        Ok(vec)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider(&self) -> &str {
        "hash-shingle"
    }
}

/// L2-normalize `vec` in place; leaves an all-zero vector unchanged.
pub fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity of two vectors of equal length, in `[-1, 1]`.
/// Returns `0.0` for mismatched lengths or zero vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embeddings_are_unit_normalized() {
        let provider = HashEmbeddingProvider::new(64);
        let v = provider.embed_text("Auth service uses JWT").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed_text("hello world").await.unwrap();
        let b = provider.embed_text("hello world").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn similar_text_is_more_similar_than_unrelated_text() {
        let provider = HashEmbeddingProvider::new(128);
        let a = provider.embed_text("auth-service uses JWT tokens").await.unwrap();
        let b = provider
            .embed_text("auth-service uses JWT tokens for sessions")
            .await
            .unwrap();
        let c = provider.embed_text("bananas are a good source of potassium").await.unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[test]
    fn cosine_similarity_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }
}
