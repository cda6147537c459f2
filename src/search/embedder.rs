//! Embedder trait plus the always-available hashing fallback.
//!
//! The engine treats the embedding model as an opaque function from text to
//! unit-norm vectors of a fixed dimension. Two implementations ship here:
//!
//! - **[`HashEmbedder`]**: FNV-1a feature hashing over word unigrams and
//!   bigrams. Not semantic, but deterministic, dependency-free, and always
//!   available; useful for tests and air-gapped smoke runs.
//! - `minilm` (see [`super::fastembed_embedder`], feature `ml`): ONNX
//!   MiniLM-L6-v2 via fastembed, the intended production embedder.
//!
//! A bundle records the ID of the embedder that produced its vectors;
//! serving must use the same ID or fail loudly.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedderError {
    /// Requested embedder is unknown or its backend is not compiled in /
    /// not installed.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),

    /// Backend inference call failed.
    #[error("embedding inference failed: {0}")]
    Inference(String),
}

pub type EmbedderResult<T> = Result<T, EmbedderError>;

/// Opaque text-to-vector function. Implementations must return unit-norm
/// vectors of exactly `dimension()` components.
pub trait Embedder: Send + Sync {
    /// Stable identifier recorded in bundles built with this embedder.
    fn id(&self) -> &str;

    /// Output vector dimension.
    fn dimension(&self) -> usize;

    /// Embed a batch of documents in one call.
    fn embed_batch(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed(&self, text: &str) -> EmbedderResult<Vec<f32>> {
        let mut batch = self.embed_batch(std::slice::from_ref(&text.to_string()))?;
        batch.pop().ok_or_else(|| {
            EmbedderError::Inference("embedder returned no vector for input".into())
        })
    }
}

/// Hash embedder name (always available).
pub const HASH_EMBEDDER: &str = "hash";

/// Names accepted by [`embedder_by_name`].
pub const EMBEDDER_NAMES: &[&str] = &[HASH_EMBEDDER, "minilm"];

/// Resolve an embedder by short name. `None` selects the hashing fallback.
pub fn embedder_by_name(name: Option<&str>) -> EmbedderResult<Arc<dyn Embedder>> {
    match name.unwrap_or(HASH_EMBEDDER) {
        HASH_EMBEDDER => Ok(Arc::new(HashEmbedder::default())),
        #[cfg(feature = "ml")]
        "minilm" => Ok(Arc::new(super::fastembed_embedder::FastEmbedder::load()?)),
        #[cfg(not(feature = "ml"))]
        "minilm" => Err(EmbedderError::Unavailable(
            "embedder 'minilm' requires the 'ml' feature".into(),
        )),
        other => Err(EmbedderError::Unavailable(format!(
            "unknown embedder '{}'. Available: {}",
            other,
            EMBEDDER_NAMES.join(", ")
        ))),
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left untouched
/// (there is no direction to preserve).
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v = (f64::from(*v) / norm) as f32;
        }
    }
}

/// FNV-1a feature hashing embedder.
///
/// Tokenizes on non-alphanumeric boundaries, lowercases, and hashes each
/// unigram and adjacent bigram into one of `dimension` buckets with a
/// hash-derived sign. Output is L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

impl HashEmbedder {
    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut add_feature = |feature: &str| {
            let hash = fnv1a(feature.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        };

        for token in &tokens {
            add_feature(token);
        }
        for pair in tokens.windows(2) {
            add_feature(&format!("{} {}", pair[0], pair[1]));
        }

        l2_normalize(&mut vector);
        vector
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        "fnv1a-384"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}
