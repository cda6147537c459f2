//! Normalized catalog entity structs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Broad classification of an assessment product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestType {
    Knowledge,
    Personality,
    #[default]
    Unknown,
}

impl TestType {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "knowledge" | "k" => TestType::Knowledge,
            "personality" | "p" => TestType::Personality,
            _ => TestType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestType::Knowledge => "Knowledge",
            TestType::Personality => "Personality",
            TestType::Unknown => "",
        }
    }
}

impl From<String> for TestType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TestType> for String {
    fn from(value: TestType) -> Self {
        value.as_str().to_string()
    }
}

/// One assessment item from the catalog snapshot.
///
/// Identity is `id`; `url` is a secondary natural key used for dedup during
/// catalog loading. Optional fields are tolerated as absent throughout the
/// engine, never propagated as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub test_type: TestType,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// One row of the final ranked output, shaped so any front end can render
/// it without further catalog lookups.
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub assessment_name: String,
    pub assessment_url: String,
    pub test_type: TestType,
    pub level: Option<String>,
    pub language: Option<String>,
    pub duration_minutes: Option<f64>,
    /// Raw inner-product similarity from the vector stage.
    pub similarity: f32,
    /// Triangular duration-fit score in [0, 1]; 0 when no window applies.
    pub duration_fit: f32,
    /// Fused ranking key: 0.85 x similarity + 0.15 x duration_fit.
    pub score: f32,
    pub description: String,
}
