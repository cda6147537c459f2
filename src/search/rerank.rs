//! Fusion reranking of vector-search candidates.
//!
//! Combines three signals into the final ranking: raw semantic similarity
//! from the vector stage, a keyword relevance gate, and a triangular
//! duration-fit score. Pure and stateless per call.

use crate::model::types::CatalogRecord;
use crate::search::query::QueryConstraint;

/// Semantic similarity dominates; duration acts as a tie-breaking nudge.
pub const SIMILARITY_WEIGHT: f32 = 0.85;
pub const DURATION_WEIGHT: f32 = 0.15;

/// Floor on the duration tolerance, in minutes.
pub const MIN_TOLERANCE_MINUTES: f32 = 15.0;

/// A candidate surfaced by the vector stage: full record plus its raw
/// inner-product similarity.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: CatalogRecord,
    pub similarity: f32,
}

/// One row of the fused ranking.
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub record: CatalogRecord,
    pub similarity: f32,
    pub duration_fit: f32,
    /// 0.85 x similarity + 0.15 x duration_fit. Deliberately not clamped:
    /// the raw inner product flows through unchanged.
    pub final_score: f32,
}

/// Rerank candidates against the extracted constraints and truncate to
/// `top_k`. Returns fewer rows when fewer candidates survive the gate;
/// never pads, never errors on oversized `top_k`.
pub fn rerank(
    candidates: Vec<ScoredRecord>,
    constraint: &QueryConstraint,
    top_k: usize,
) -> Vec<RankedResult> {
    let gated = apply_keyword_gate(candidates, constraint);

    let mut ranked: Vec<RankedResult> = gated
        .into_iter()
        .map(|candidate| {
            let duration_fit = duration_fit(candidate.record.duration_minutes, constraint);
            let final_score =
                SIMILARITY_WEIGHT * candidate.similarity + DURATION_WEIGHT * duration_fit;
            RankedResult {
                record: candidate.record,
                similarity: candidate.similarity,
                duration_fit,
                final_score,
            }
        })
        .collect();

    // Stable sort: exact final-score ties keep the incoming similarity
    // order.
    ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    ranked.truncate(top_k);
    ranked
}

/// Drop candidates containing none of the matched keyword terms. Inert
/// when the keyword set is empty: nothing is dropped by default.
fn apply_keyword_gate(
    candidates: Vec<ScoredRecord>,
    constraint: &QueryConstraint,
) -> Vec<ScoredRecord> {
    if constraint.keywords.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|candidate| {
            let haystack = searchable_text(&candidate.record);
            constraint.keywords.iter().any(|kw| haystack.contains(kw))
        })
        .collect()
}

fn searchable_text(record: &CatalogRecord) -> String {
    let tags = record
        .tags
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        "{} {} {} {}",
        record.title, record.description, tags, record.category
    )
    .to_lowercase()
}

/// Triangular falloff around the window center: 1.0 at the center,
/// linearly down to 0 at one tolerance-width away, clamped at 0 beyond.
/// Unknown durations and absent windows both score 0 (no penalty, no
/// boost).
fn duration_fit(duration_minutes: Option<f64>, constraint: &QueryConstraint) -> f32 {
    let Some(window) = constraint.duration else {
        return 0.0;
    };
    let Some(d) = duration_minutes else {
        return 0.0;
    };
    let lo = f64::from(window.min_minutes);
    let hi = f64::from(window.max_minutes);
    let center = (lo + hi) / 2.0;
    let tolerance = (f64::from(MIN_TOLERANCE_MINUTES)).max((hi - lo) / 2.0);
    (1.0 - (d - center).abs() / tolerance).max(0.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::{DurationWindow, QueryConstraint};
    use std::collections::BTreeSet;

    fn record(id: &str, duration: Option<f64>, text: &str) -> CatalogRecord {
        let mut r: CatalogRecord =
            serde_json::from_str(&format!(r#"{{"id":"{id}","title":"{text}"}}"#)).unwrap();
        r.duration_minutes = duration;
        r
    }

    fn candidate(id: &str, similarity: f32, duration: Option<f64>, text: &str) -> ScoredRecord {
        ScoredRecord {
            record: record(id, duration, text),
            similarity,
        }
    }

    fn with_window(min: u32, max: u32) -> QueryConstraint {
        QueryConstraint {
            duration: Some(DurationWindow {
                min_minutes: min,
                max_minutes: max,
            }),
            keywords: BTreeSet::new(),
        }
    }

    #[test]
    fn duration_fit_boundaries() {
        // Window (45, 75): center 60, tolerance 15.
        let constraint = with_window(45, 75);
        let fit = |d: f64| duration_fit(Some(d), &constraint);
        assert_eq!(fit(60.0), 1.0);
        assert_eq!(fit(75.0), 0.0);
        assert_eq!(fit(90.0), 0.0); // clamped, not negative
        assert!((fit(52.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn wide_windows_stretch_the_tolerance() {
        // Window (60, 120): center 90, tolerance max(15, 30) = 30.
        let constraint = with_window(60, 120);
        assert!((duration_fit(Some(75.0), &constraint) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_duration_scores_zero_without_dropping() {
        let constraint = with_window(45, 75);
        let results = rerank(
            vec![candidate("a", 0.5, None, "anything")],
            &constraint,
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].duration_fit, 0.0);
    }

    #[test]
    fn absent_window_contributes_nothing() {
        let results = rerank(
            vec![candidate("a", 0.5, Some(60.0), "anything")],
            &QueryConstraint::default(),
            10,
        );
        assert_eq!(results[0].duration_fit, 0.0);
        assert!((results[0].final_score - 0.85 * 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_keyword_set_is_inert() {
        let results = rerank(
            vec![
                candidate("a", 0.9, None, "totally unrelated content"),
                candidate("b", 0.8, None, "more unrelated content"),
            ],
            &QueryConstraint::default(),
            10,
        );
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn keyword_gate_drops_off_topic_candidates() {
        let constraint = QueryConstraint {
            duration: None,
            keywords: BTreeSet::from(["python"]),
        };
        let results = rerank(
            vec![
                candidate("a", 0.9, None, "Python Programming Test"),
                candidate("b", 0.95, None, "Sales Aptitude Screen"),
            ],
            &constraint,
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, "a");
    }

    #[test]
    fn keyword_gate_searches_tags_and_category_too() {
        let constraint = QueryConstraint {
            duration: None,
            keywords: BTreeSet::from(["sql"]),
        };
        let mut tagged = candidate("a", 0.5, None, "Data Screen");
        tagged.record.tags = BTreeSet::from(["SQL".to_string()]);
        let mut categorized = candidate("b", 0.5, None, "Analyst Screen");
        categorized.record.category = "SQL Databases".into();
        let results = rerank(vec![tagged, categorized], &constraint, 10);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn truncates_to_top_k_but_never_pads() {
        let candidates: Vec<ScoredRecord> = (0..5)
            .map(|i| candidate(&format!("c{i}"), 0.5 - i as f32 * 0.01, None, "x"))
            .collect();
        assert_eq!(rerank(candidates.clone(), &QueryConstraint::default(), 3).len(), 3);
        assert_eq!(rerank(candidates, &QueryConstraint::default(), 50).len(), 5);
    }

    #[test]
    fn exact_ties_keep_incoming_order() {
        let results = rerank(
            vec![
                candidate("first", 0.5, None, "x"),
                candidate("second", 0.5, None, "x"),
            ],
            &QueryConstraint::default(),
            10,
        );
        assert_eq!(results[0].record.id, "first");
        assert_eq!(results[1].record.id, "second");
    }

    #[test]
    fn duration_fit_can_reorder_near_ties() {
        let constraint = with_window(45, 75);
        let results = rerank(
            vec![
                candidate("fast", 0.80, Some(20.0), "x"),
                candidate("fit", 0.79, Some(60.0), "x"),
            ],
            &constraint,
            10,
        );
        // 0.85*0.80 + 0 = 0.68 < 0.85*0.79 + 0.15 = 0.8215
        assert_eq!(results[0].record.id, "fit");
    }

    proptest::proptest! {
        /// Holding duration_fit inputs fixed, a higher similarity never
        /// produces a lower final score (and vice versa for duration).
        #[test]
        fn fusion_is_monotone(
            sim_lo in 0.0f32..1.0,
            sim_delta in 0.0f32..0.5,
            dur in 0.0f64..200.0,
        ) {
            let constraint = with_window(45, 75);
            let low = rerank(
                vec![candidate("a", sim_lo, Some(dur), "x")],
                &constraint,
                1,
            );
            let high = rerank(
                vec![candidate("a", sim_lo + sim_delta, Some(dur), "x")],
                &constraint,
                1,
            );
            proptest::prop_assert!(high[0].final_score >= low[0].final_score);
        }
    }
}
