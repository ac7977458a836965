//! Embedding provider trait, gap-tolerant batch embedding and vector utilities.
//!
//! Concrete provider implementations (OpenAI-compatible, Ollama, fastembed)
//! live in the `notegraph` app crate.
//!
//! The helpers in this module never fail: a batch the provider cannot embed
//! comes back as a run of `None` markers of the same length, so callers keep
//! a one-to-one correspondence between texts and vectors.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ExtractionResult;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-v3"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1024`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts. The returned vectors must be in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Outcome of filling missing chunk embeddings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillReport {
    /// Chunks that had no vector before the fill.
    pub requested: usize,
    /// Chunks that received a vector.
    pub filled: usize,
}

impl FillReport {
    /// Chunks still without a vector after the fill.
    pub fn gaps(&self) -> usize {
        self.requested - self.filled
    }
}

/// Embed `texts` in batches of `batch_size`, marking failures as `None`.
///
/// A batch fails as a whole when the provider errors or returns a different
/// number of vectors than requested. A single vector whose length differs
/// from the provider's `dims()` is a gap on its own.
pub async fn embed_or_gaps<P: EmbeddingProvider + ?Sized>(
    provider: &P,
    texts: &[String],
    batch_size: usize,
) -> Vec<Option<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    let dims = provider.dims();

    for batch in texts.chunks(batch_size.max(1)) {
        match provider.embed(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                out.extend(vectors.into_iter().map(|v| {
                    if v.is_empty() || (dims > 0 && v.len() != dims) {
                        None
                    } else {
                        Some(v)
                    }
                }));
            }
            Ok(vectors) => {
                tracing::warn!(
                    expected = batch.len(),
                    got = vectors.len(),
                    "embedding response length mismatch, marking batch as gaps"
                );
                out.extend(std::iter::repeat_with(|| None).take(batch.len()));
            }
            Err(e) => {
                tracing::warn!(error = %e, size = batch.len(), "embedding batch failed");
                out.extend(std::iter::repeat_with(|| None).take(batch.len()));
            }
        }
    }

    out
}

/// Embed a single query text, or `None` if the provider cannot.
pub async fn embed_query<P: EmbeddingProvider + ?Sized>(
    provider: &P,
    text: &str,
) -> Option<Vec<f32>> {
    embed_or_gaps(provider, &[text.to_string()], 1)
        .await
        .into_iter()
        .next()
        .flatten()
}

/// Fill every chunk of `result` that has no usable embedding yet.
///
/// A vector supplied with the extraction payload whose length differs from
/// the provider's `dims()` is replaced. Chunks that still cannot be embedded
/// keep `None`; they are never dropped.
pub async fn fill_missing<P: EmbeddingProvider + ?Sized>(
    provider: &P,
    result: &mut ExtractionResult,
    batch_size: usize,
) -> FillReport {
    let dims = provider.dims();
    let missing: Vec<usize> = result
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| match &c.embedding {
            None => true,
            Some(v) => dims > 0 && v.len() != dims,
        })
        .map(|(i, _)| i)
        .collect();

    if missing.is_empty() {
        return FillReport::default();
    }

    let texts: Vec<String> = missing
        .iter()
        .map(|&i| result.chunks[i].content.clone())
        .collect();
    let vectors = embed_or_gaps(provider, &texts, batch_size).await;

    let mut filled = 0;
    for (idx, vector) in missing.iter().zip(vectors) {
        if vector.is_some() {
            filled += 1;
        }
        result.chunks[*idx].embedding = vector;
    }

    FillReport {
        requested: missing.len(),
        filled,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use notegraph_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
