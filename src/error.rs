//! Error taxonomy for the recommendation engine.
//!
//! The serving boundary maps these onto user-visible outcomes:
//! `Configuration` and `Build` are "service unavailable"-class (the deployment
//! is broken, nothing a caller can do), `InvalidInput` is "bad request"-class
//! and carries the specific reason.

use thiserror::Error;

use crate::search::embedder::EmbedderError;

#[derive(Debug, Error)]
pub enum RecommendError {
    /// The loaded bundle and the serving embedder disagree (embedder ID or
    /// vector dimensionality). Fatal: serving with a mismatched embedder
    /// would silently produce meaningless similarity scores.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller-supplied input was rejected before reaching the engine.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Index construction failed; no partial bundle was written.
    #[error("build error: {0}")]
    Build(String),

    /// Bundle I/O or format violation (bad magic, CRC mismatch, truncation).
    #[error("bundle error: {0}")]
    Bundle(#[from] anyhow::Error),

    #[error(transparent)]
    Embedding(#[from] EmbedderError),
}

pub type RecommendResult<T> = Result<T, RecommendError>;
