//! Catalog snapshot loading.
//!
//! The catalog itself is produced by an external ingestion pipeline; this
//! module only materializes a snapshot file into [`CatalogRecord`]s. Two
//! layouts are accepted: a JSON array of records, or JSON Lines (one record
//! per line). Records are deduped by normalized URL, keeping the first
//! occurrence.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use crate::model::types::CatalogRecord;

/// Load and sanitize a catalog snapshot.
///
/// Malformed records (missing `id`/`title`, invalid JSON) fail the whole
/// load rather than being skipped; absent optional fields are tolerated.
pub fn load_catalog(path: &Path) -> Result<Vec<CatalogRecord>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read catalog {path:?}"))?;
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        bail!("catalog file is empty: {path:?}");
    }

    let records = if trimmed.starts_with('[') {
        serde_json::from_str::<Vec<CatalogRecord>>(trimmed)
            .with_context(|| format!("parse catalog array {path:?}"))?
    } else {
        let mut records = Vec::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: CatalogRecord = serde_json::from_str(line)
                .with_context(|| format!("parse catalog record at {path:?}:{}", lineno + 1))?;
            records.push(record);
        }
        records
    };

    Ok(sanitize(records))
}

/// Dedup by normalized URL and scrub field values the engine cannot use.
pub fn sanitize(records: Vec<CatalogRecord>) -> Vec<CatalogRecord> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for mut record in records {
        if !record.url.is_empty() {
            let key = normalize_url(&record.url);
            if !seen_urls.insert(key) {
                debug!(id = %record.id, url = %record.url, "catalog_dedup_drop");
                continue;
            }
        }
        if let Some(d) = record.duration_minutes
            && (!d.is_finite() || d < 0.0)
        {
            warn!(id = %record.id, duration = d, "catalog_bad_duration_cleared");
            record.duration_minutes = None;
        }
        out.push(record);
    }
    out
}

/// Canonical form of a catalog URL for dedup purposes: whitespace trimmed,
/// trailing slashes dropped, scheme and host lowercased. The path is left
/// case-sensitive.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let authority_end = trimmed
        .find("://")
        .map(|scheme_end| {
            trimmed[scheme_end + 3..]
                .find('/')
                .map(|p| scheme_end + 3 + p)
                .unwrap_or(trimmed.len())
        })
        .unwrap_or(0);
    let (authority, path) = trimmed.split_at(authority_end);
    format!("{}{}", authority.to_lowercase(), path)
}
