//! Catalog document synthesis.
//!
//! Every catalog record is flattened into one canonical natural-language
//! string before embedding. The fixed slot order lets a single embedding
//! model capture structured signals (type, level, duration) alongside the
//! free-text description. Synthesis is **deterministic**: the same record
//! always produces the same bytes, absent fields render as empty strings.

use crate::model::types::CatalogRecord;

/// Produce the embedding input document for one record.
pub fn synthesize_document(record: &CatalogRecord) -> String {
    let tags = record
        .tags
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Assessment Name: {title}. Category: {category}. Type: {test_type}. \
         Level: {level}. Duration: {duration} minutes. Language: {language}. \
         Tags: {tags}. Description: {description}. ",
        title = record.title,
        category = record.category,
        test_type = record.test_type.as_str(),
        level = record.level.as_deref().unwrap_or(""),
        duration = format_duration(record.duration_minutes),
        language = record.language.as_deref().unwrap_or(""),
        tags = tags,
        description = record.description,
    )
}

/// Render a duration value without a spurious trailing `.0` for whole
/// minutes; absent durations render empty.
fn format_duration(duration: Option<f64>) -> String {
    match duration {
        None => String::new(),
        Some(d) if d.fract() == 0.0 => format!("{}", d as i64),
        Some(d) => format!("{d}"),
    }
}
