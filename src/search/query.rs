//! Query constraint extraction.
//!
//! Parses a free-text query into the structured signals the reranker can
//! act on: an optional soft duration window and the set of recognized
//! domain keywords. Pure text-to-structure, no I/O; the pattern tables are
//! built once at startup, not per call.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Soft tolerance band applied around a single stated duration, in minutes.
/// Applied regardless of magnitude ("5 minutes" also gets a +/-15 band,
/// with the lower bound saturating at 0); intent for very short durations
/// is ambiguous, so the band is left uniform.
pub const SINGLE_VALUE_TOLERANCE_MINUTES: u32 = 15;

/// Closed vocabulary of domain-relevant terms (skills, roles, tools) used
/// as a relevance gate downstream, not as a score.
pub static KEYWORD_VOCABULARY: &[&str] = &[
    "python",
    "sql",
    "excel",
    "powerbi",
    "tableau",
    "r",
    "statistics",
    "statistical",
    "developer",
    "engineer",
    "analyst",
    "data",
    "qa",
    "testing",
    "automation",
    "communication",
    "stakeholder",
    "manager",
    "sales",
    "marketing",
    "java",
    "javascript",
];

// Range form first: "45-60 minutes", "1-2 hours". Single-value form only
// applies when no range matched.
static RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+)\s*-\s*(\d+)\s*(hours?|hrs?|minutes?|mins?)\b").expect("valid range pattern")
});

static SINGLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(hours?|hrs?|minutes?|mins?)\b").expect("valid single pattern"));

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]+").expect("valid word pattern"));

static VOCABULARY_SET: Lazy<BTreeSet<&'static str>> =
    Lazy::new(|| KEYWORD_VOCABULARY.iter().copied().collect());

/// Soft duration window in minutes, inclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationWindow {
    pub min_minutes: u32,
    pub max_minutes: u32,
}

/// Structured constraints extracted from one query. Ephemeral, never
/// persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryConstraint {
    pub duration: Option<DurationWindow>,
    pub keywords: BTreeSet<&'static str>,
}

impl QueryConstraint {
    pub fn extract(query: &str) -> Self {
        let lowered = query.to_lowercase();
        Self {
            duration: extract_duration_window(&lowered),
            keywords: extract_keywords(&lowered),
        }
    }
}

/// First match wins: range form, then single value, else no constraint.
fn extract_duration_window(lowered: &str) -> Option<DurationWindow> {
    if let Some(caps) = RANGE_RE.captures(lowered) {
        let a: u32 = caps[1].parse().ok()?;
        let b: u32 = caps[2].parse().ok()?;
        let (a, b) = (to_minutes(a, &caps[3]), to_minutes(b, &caps[3]));
        return Some(DurationWindow {
            min_minutes: a.min(b),
            max_minutes: a.max(b),
        });
    }

    if let Some(caps) = SINGLE_RE.captures(lowered) {
        let v: u32 = caps[1].parse().ok()?;
        let v = to_minutes(v, &caps[2]);
        // A single stated duration is an approximate target, not an exact
        // bound.
        return Some(DurationWindow {
            min_minutes: v.saturating_sub(SINGLE_VALUE_TOLERANCE_MINUTES),
            max_minutes: v.saturating_add(SINGLE_VALUE_TOLERANCE_MINUTES),
        });
    }

    None
}

// Saturating: extraction must never panic on free text, however absurd
// the stated number.
fn to_minutes(value: u32, unit: &str) -> u32 {
    if unit.starts_with('h') {
        value.saturating_mul(60)
    } else {
        value
    }
}

fn extract_keywords(lowered: &str) -> BTreeSet<&'static str> {
    WORD_RE
        .find_iter(lowered)
        .filter_map(|word| VOCABULARY_SET.get(word.as_str()).copied())
        .collect()
}
