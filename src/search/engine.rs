//! End-to-end recommendation engine.
//!
//! Wires the pipeline together: offline, [`build_index`] turns a catalog
//! snapshot plus an embedder into a persisted bundle; online,
//! [`RecommendEngine`] loads one bundle, and each call to
//! [`RecommendEngine::recommend`] runs vector search, constraint
//! extraction, and fusion reranking. The engine is read-only after load,
//! so concurrent queries need no coordination; [`SharedEngine`] adds the
//! atomic-swap handle for hot bundle reloads.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{RecommendError, RecommendResult};
use crate::model::types::{CatalogRecord, Recommendation};
use crate::search::document::synthesize_document;
use crate::search::embedder::Embedder;
use crate::search::query::QueryConstraint;
use crate::search::rerank::{RankedResult, ScoredRecord, rerank};
use crate::search::vector_index::{IndexBundle, bundle_path};

/// Callers may ask for at most this many recommendations; larger requests
/// are clamped, not rejected.
pub const MAX_TOP_K: usize = 10;

/// The vector stage retrieves a wider pool than the caller asked for, so
/// the keyword gate and duration rerank have candidates to work with.
pub const CANDIDATE_POOL_FACTOR: usize = 4;

/// Build an [`IndexBundle`] from a catalog snapshot.
///
/// Fatal on an empty catalog or a failed embedding call; nothing is
/// written to disk here, so a failed build leaves no partial bundle.
pub fn build_index(
    records: Vec<CatalogRecord>,
    embedder: &dyn Embedder,
) -> RecommendResult<IndexBundle> {
    if records.is_empty() {
        return Err(RecommendError::Build(
            "catalog snapshot is empty; nothing to index".into(),
        ));
    }

    info!(
        records = records.len(),
        embedder = embedder.id(),
        "index_build_start"
    );

    let documents: Vec<String> = records.iter().map(synthesize_document).collect();
    let vectors = embedder.embed_batch(&documents)?;
    let bundle = IndexBundle::build(embedder.id(), embedder.dimension(), records, vectors)?;

    info!(
        rows = bundle.len(),
        dimension = bundle.header().dimension,
        "index_build_done"
    );
    Ok(bundle)
}

/// Build a bundle and persist it under `index_dir` in one step.
pub fn build_and_save_index(
    records: Vec<CatalogRecord>,
    embedder: &dyn Embedder,
    index_dir: &Path,
) -> RecommendResult<IndexBundle> {
    let bundle = build_index(records, embedder)?;
    let path = bundle_path(index_dir, embedder.id());
    bundle.save(&path)?;
    info!(path = %path.display(), "index_bundle_saved");
    Ok(bundle)
}

/// A loaded bundle paired with the embedder that must serve it.
pub struct RecommendEngine {
    bundle: IndexBundle,
    embedder: Arc<dyn Embedder>,
}

impl RecommendEngine {
    /// Load the bundle for `embedder` from `index_dir`.
    pub fn load(index_dir: &Path, embedder: Arc<dyn Embedder>) -> RecommendResult<Self> {
        let path = bundle_path(index_dir, embedder.id());
        let bundle = IndexBundle::load(&path)?;
        Self::from_parts(bundle, embedder)
    }

    /// Pair an already-materialized bundle with a serving embedder,
    /// enforcing the compatibility invariant: the embedder that serves
    /// queries must be the one that built the bundle.
    pub fn from_parts(bundle: IndexBundle, embedder: Arc<dyn Embedder>) -> RecommendResult<Self> {
        if bundle.header().embedder_id != embedder.id() {
            return Err(RecommendError::Configuration(format!(
                "bundle was built with embedder '{}' but serving embedder is '{}'",
                bundle.header().embedder_id,
                embedder.id()
            )));
        }
        if bundle.header().dimension as usize != embedder.dimension() {
            return Err(RecommendError::Configuration(format!(
                "bundle dimension {} does not match embedder dimension {}",
                bundle.header().dimension,
                embedder.dimension()
            )));
        }
        Ok(Self { bundle, embedder })
    }

    pub fn bundle(&self) -> &IndexBundle {
        &self.bundle
    }

    /// Raw vector search: top `top_n` records by descending inner-product
    /// similarity. Callers are expected to have validated `query_text`.
    pub fn search(&self, query_text: &str, top_n: usize) -> RecommendResult<Vec<ScoredRecord>> {
        let query_vec = self.embedder.embed(query_text)?;
        if query_vec.len() != self.bundle.header().dimension as usize {
            return Err(RecommendError::Configuration(format!(
                "query vector dimension {} does not match bundle dimension {}",
                query_vec.len(),
                self.bundle.header().dimension
            )));
        }

        let hits = self.bundle.search_top_k(&query_vec, top_n)?;
        let mut candidates = Vec::with_capacity(hits.len());
        for hit in hits {
            let record = self
                .bundle
                .record(hit.row)
                .ok_or_else(|| {
                    RecommendError::Configuration(format!(
                        "search returned row {} outside the metadata table",
                        hit.row
                    ))
                })?
                .clone();
            candidates.push(ScoredRecord {
                record,
                similarity: hit.score,
            });
        }
        Ok(candidates)
    }

    /// The single end-to-end entry point: vector search, constraint
    /// extraction, fusion rerank, truncation to `top_k`.
    pub fn recommend(&self, query_text: &str, top_k: usize) -> RecommendResult<Vec<Recommendation>> {
        let query = query_text.trim();
        if query.is_empty() {
            return Err(RecommendError::InvalidInput("empty query".into()));
        }
        let top_k = top_k.clamp(1, MAX_TOP_K);

        let pool_size = top_k * CANDIDATE_POOL_FACTOR;
        let candidates = self.search(query, pool_size)?;
        let constraint = QueryConstraint::extract(query);
        debug!(
            query = query,
            pool = candidates.len(),
            keywords = constraint.keywords.len(),
            has_duration = constraint.duration.is_some(),
            "recommend_rerank"
        );

        let ranked = rerank(candidates, &constraint, top_k);
        Ok(ranked.into_iter().map(to_recommendation).collect())
    }
}

fn to_recommendation(ranked: RankedResult) -> Recommendation {
    let record = ranked.record;
    Recommendation {
        assessment_name: record.title,
        assessment_url: record.url,
        test_type: record.test_type,
        level: record.level,
        language: record.language,
        duration_minutes: record.duration_minutes,
        similarity: ranked.similarity,
        duration_fit: ranked.duration_fit,
        score: ranked.final_score,
        description: record.description,
    }
}

/// Hot-swap handle for serving processes: queries read the current engine
/// through an `Arc`, rebuilds install a replacement atomically. A bundle a
/// search is reading is never mutated; old engines are dropped when the
/// last in-flight query releases its `Arc`.
pub struct SharedEngine {
    inner: RwLock<Arc<RecommendEngine>>,
}

impl SharedEngine {
    pub fn new(engine: RecommendEngine) -> Self {
        Self {
            inner: RwLock::new(Arc::new(engine)),
        }
    }

    pub fn current(&self) -> Arc<RecommendEngine> {
        self.inner.read().clone()
    }

    pub fn swap(&self, engine: RecommendEngine) {
        *self.inner.write() = Arc::new(engine);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedder::HashEmbedder;

    fn record(id: &str, title: &str) -> CatalogRecord {
        serde_json::from_str(&format!(r#"{{"id":"{id}","title":"{title}"}}"#)).unwrap()
    }

    fn hash_engine() -> RecommendEngine {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let records = vec![
            record("a", "Python Programming Test"),
            record("b", "Sales Aptitude Screen"),
            record("c", "Excel Data Analysis"),
        ];
        let bundle = build_index(records, embedder.as_ref()).unwrap();
        RecommendEngine::from_parts(bundle, embedder).unwrap()
    }

    #[test]
    fn build_index_rejects_empty_catalog() {
        let embedder = HashEmbedder::default();
        let err = build_index(Vec::new(), &embedder).unwrap_err();
        assert!(matches!(err, RecommendError::Build(_)));
    }

    #[test]
    fn from_parts_rejects_embedder_id_mismatch() {
        let build_embedder = HashEmbedder::default();
        let bundle = build_index(vec![record("a", "Alpha")], &build_embedder).unwrap();

        struct OtherEmbedder;
        impl Embedder for OtherEmbedder {
            fn id(&self) -> &str {
                "other-384"
            }
            fn dimension(&self) -> usize {
                384
            }
            fn embed_batch(
                &self,
                _texts: &[String],
            ) -> crate::search::embedder::EmbedderResult<Vec<Vec<f32>>> {
                unreachable!("never embeds in this test")
            }
        }

        // from_parts' Ok side holds a trait object, so unwrap_err() has no
        // Debug bound to lean on.
        let err = match RecommendEngine::from_parts(bundle, Arc::new(OtherEmbedder)) {
            Ok(_) => panic!("mismatched embedder must be rejected"),
            Err(err) => err,
        };
        assert!(matches!(err, RecommendError::Configuration(_)));
        assert!(err.to_string().contains("fnv1a-384"));
    }

    #[test]
    fn recommend_rejects_empty_and_whitespace_queries() {
        let engine = hash_engine();
        assert!(matches!(
            engine.recommend("", 5).unwrap_err(),
            RecommendError::InvalidInput(_)
        ));
        assert!(matches!(
            engine.recommend("   \t\n", 5).unwrap_err(),
            RecommendError::InvalidInput(_)
        ));
    }

    #[test]
    fn recommend_clamps_top_k_instead_of_erroring() {
        let engine = hash_engine();
        // top_k = 0 clamps to 1
        let one = engine.recommend("python skills", 0).unwrap();
        assert_eq!(one.len(), 1);
        // Oversized top_k returns at most the catalog size.
        let all = engine.recommend("python skills", 10_000).unwrap();
        assert!(all.len() <= 3);
    }

    #[test]
    fn recommend_never_mutates_the_bundle() {
        let engine = hash_engine();
        let before: Vec<String> = engine
            .bundle()
            .records()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        engine.recommend("python developer", 3).unwrap();
        engine.recommend("sales manager", 3).unwrap();
        let after: Vec<String> = engine
            .bundle()
            .records()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn shared_engine_swaps_atomically() {
        let shared = SharedEngine::new(hash_engine());
        let held = shared.current();

        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());
        let bundle = build_index(vec![record("z", "Replacement")], embedder.as_ref()).unwrap();
        shared.swap(RecommendEngine::from_parts(bundle, embedder).unwrap());

        // The held handle still serves the old bundle; new readers see the
        // replacement.
        assert_eq!(held.bundle().len(), 3);
        assert_eq!(shared.current().bundle().len(), 1);
    }
}
