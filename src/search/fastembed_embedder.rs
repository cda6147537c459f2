//! FastEmbed-backed ML embedder (MiniLM-L6-v2), behind the `ml` feature.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;

use super::embedder::{Embedder, EmbedderError, EmbedderResult, l2_normalize};

/// MiniLM sentence embedder via ONNX runtime.
///
/// The fastembed session is not `Sync`, so inference is serialized behind a
/// mutex; the engine's read path stays lock-free since query embedding is
/// the only mutable step.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    pub const ID: &'static str = "minilm-384";
    pub const DIMENSION: usize = 384;

    /// Initialize the MiniLM model, downloading it on first use.
    pub fn load() -> EmbedderResult<Self> {
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbedderError::Unavailable(format!("minilm init failed: {e}")))?;
        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for FastEmbedder {
    fn id(&self) -> &str {
        Self::ID
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn embed_batch(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>> {
        let mut model = self.model.lock();
        let mut vectors = model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbedderError::Inference(e.to_string()))?;
        // MiniLM output is already normalized; re-normalize to keep the
        // unit-norm contract independent of backend defaults.
        for vector in &mut vectors {
            if vector.len() != Self::DIMENSION {
                return Err(EmbedderError::Inference(format!(
                    "minilm returned dimension {}, expected {}",
                    vector.len(),
                    Self::DIMENSION
                )));
            }
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}
