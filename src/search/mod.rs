//! Retrieval-and-rerank layer facade.
//!
//! This module provides the recommendation pipeline, including:
//!
//! - **[`document`]**: catalog record to embedding-input document synthesis.
//! - **[`embedder`]**: embedder trait, hash fallback, and name resolution.
//! - **[`fastembed_embedder`]**: FastEmbed-backed MiniLM embedder (feature `ml`).
//! - **[`vector_index`]**: ARVI bundle format and exact inner-product search.
//! - **[`query`]**: duration-window and keyword constraint extraction.
//! - **[`rerank`]**: keyword gate, duration fit, and score fusion.
//! - **[`engine`]**: index building and the end-to-end `recommend` entry point.

pub mod document;
pub mod embedder;
#[cfg(feature = "ml")]
pub mod fastembed_embedder;
pub mod engine;
pub mod query;
pub mod rerank;
pub mod vector_index;

pub use engine::{RecommendEngine, SharedEngine, build_and_save_index, build_index};
pub use query::QueryConstraint;
pub use vector_index::IndexBundle;
