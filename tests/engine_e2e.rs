//! End-to-end engine scenarios: build, persist, load, recommend.

use std::sync::Arc;

use assessment_recommender::model::types::CatalogRecord;
use assessment_recommender::search::document::synthesize_document;
use assessment_recommender::search::embedder::{
    Embedder, EmbedderResult, HashEmbedder,
};
use assessment_recommender::search::engine::{
    RecommendEngine, build_and_save_index, build_index,
};

fn record(id: &str, title: &str, duration: Option<f64>) -> CatalogRecord {
    let mut r: CatalogRecord =
        serde_json::from_str(&format!(
            r#"{{"id":"{id}","title":"{title}","url":"https://example.com/{id}"}}"#
        ))
        .unwrap();
    r.duration_minutes = duration;
    r
}

/// Deterministic embedder with hand-picked similarities: documents are
/// recognized by a marker word in their title, queries get the reference
/// vector. All outputs are unit-norm by construction.
struct StubEmbedder;

impl StubEmbedder {
    fn vector_for(text: &str) -> Vec<f32> {
        let first: f32 = if text.contains("Alpha") {
            0.9
        } else if text.contains("Beta") {
            0.95
        } else if text.contains("Gamma") {
            0.7
        } else {
            1.0
        };
        vec![first, (1.0 - first * first).sqrt(), 0.0]
    }
}

impl Embedder for StubEmbedder {
    fn id(&self) -> &str {
        "stub-3"
    }

    fn dimension(&self) -> usize {
        3
    }

    fn embed_batch(&self, texts: &[String]) -> EmbedderResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }
}

#[test]
fn keyword_gate_and_duration_fusion_pick_the_right_order() {
    // A: duration 60, on-topic, similarity 0.9
    // B: duration 20, off-topic, similarity 0.95 (highest raw similarity!)
    // C: duration 58, on-topic, similarity 0.7
    let records = vec![
        record("a", "Alpha Python Test", Some(60.0)),
        record("b", "Beta Numerical Screen", Some(20.0)),
        record("c", "Gamma Python Screen", Some(58.0)),
    ];

    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
    let bundle = build_index(records, embedder.as_ref()).unwrap();
    let engine = RecommendEngine::from_parts(bundle, embedder).unwrap();

    let results = engine
        .recommend("python developer test, about 60 minutes", 2)
        .unwrap();

    // B is gated out despite winning the vector stage; A beats C on the
    // fused score: 0.85*0.9 + 0.15*1.0 = 0.915 vs
    // 0.85*0.7 + 0.15*(1 - 2/15) ~= 0.725.
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].assessment_name, "Alpha Python Test");
    assert_eq!(results[1].assessment_name, "Gamma Python Screen");
    assert!((results[0].score - 0.915).abs() < 1e-3);
    assert!((results[1].score - 0.725).abs() < 1e-3);
    assert!((results[0].similarity - 0.9).abs() < 1e-3);
    assert!((results[0].duration_fit - 1.0).abs() < 1e-3);
}

#[test]
fn gate_survivors_below_top_k_are_returned_without_padding() {
    let records = vec![
        record("a", "Alpha Python Test", None),
        record("b", "Beta Numerical Screen", None),
        record("c", "Gamma Whiteboard Interview", None),
    ];
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
    let bundle = build_index(records, embedder.as_ref()).unwrap();
    let engine = RecommendEngine::from_parts(bundle, embedder).unwrap();

    // Only A mentions python; the other two are gated out.
    let results = engine.recommend("python skills", 10).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].assessment_name, "Alpha Python Test");
}

#[test]
fn queries_without_vocabulary_words_keep_every_candidate() {
    let records = vec![
        record("a", "Alpha Python Test", None),
        record("b", "Beta Numerical Screen", None),
    ];
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
    let bundle = build_index(records, embedder.as_ref()).unwrap();
    let engine = RecommendEngine::from_parts(bundle, embedder).unwrap();

    let results = engine.recommend("general screening", 10).unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn persisted_bundle_round_trips_through_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());

    let records = vec![
        record("a", "Cobol Maintenance Basics", Some(30.0)),
        record("b", "Fortran Numerics Deep Dive", Some(90.0)),
        record("c", "Ada Avionics Safety", Some(45.0)),
    ];
    build_and_save_index(records.clone(), embedder.as_ref(), dir.path()).unwrap();

    let engine = RecommendEngine::load(dir.path(), embedder).unwrap();
    assert_eq!(engine.bundle().len(), 3);

    // Querying with record b's own synthesized document must surface b
    // first with similarity ~1: metadata row i really is vector i.
    let probe = synthesize_document(&records[1]);
    let results = engine.recommend(&probe, 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].assessment_name, "Fortran Numerics Deep Dive");
    assert!((results[0].similarity - 1.0).abs() < 1e-4);
}

#[test]
fn recommendations_serialize_with_render_ready_fields() {
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
    let bundle = build_index(
        vec![record("a", "Alpha Python Test", Some(60.0))],
        embedder.as_ref(),
    )
    .unwrap();
    let engine = RecommendEngine::from_parts(bundle, embedder).unwrap();

    let results = engine.recommend("anything at all", 1).unwrap();
    let json = serde_json::to_value(&results).unwrap();
    let row = &json[0];
    for field in [
        "assessment_name",
        "assessment_url",
        "test_type",
        "level",
        "language",
        "duration_minutes",
        "similarity",
        "duration_fit",
        "score",
        "description",
    ] {
        assert!(row.get(field).is_some(), "missing field {field}");
    }
    assert_eq!(row["assessment_url"], "https://example.com/a");
}
