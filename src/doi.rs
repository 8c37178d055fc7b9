//! DOI cleaning, validation and ingestion tracking.

use crate::error::{IndexError, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, warn};

/// Crossref-recommended DOI pattern, anchored at the end
static DOI_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)10\.\d{4,9}/[-._;()/:A-Z0-9]+$").expect("DOI pattern is valid")
});

/// Strip whitespace, a trailing period and any `doi.org` prefix.
pub fn clean_doi(raw: &str) -> String {
    let doi = raw.trim().trim_end_matches('.');
    let doi = doi
        .strip_prefix("https://doi.org/")
        .or_else(|| doi.strip_prefix("http://doi.org/"))
        .or_else(|| doi.strip_prefix("doi.org/"))
        .unwrap_or(doi);
    doi.trim().to_string()
}

/// True if the DOI matches the DOI pattern.
pub fn is_valid_doi(doi: &str) -> bool {
    DOI_PATTERN.is_match(doi)
}

/// Read a DOI list: one DOI per row in the first column, with an optional
/// `doi` header row. Blank rows are ignored.
pub fn read_doi_list(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut dois = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let Some(value) = record.get(0).filter(|v| !v.is_empty()) else {
            continue;
        };
        if index == 0 && value.eq_ignore_ascii_case("doi") {
            continue;
        }
        dois.push(value.to_string());
    }
    debug!(path = %path.display(), count = dois.len(), "Read DOI list");
    Ok(dois)
}

/// Per-DOI ingestion status
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DoiStatus {
    pub doi: String,
    pub valid_pattern: bool,
    pub already_exists: bool,
    pub openalex_metadata: bool,
    pub openaire_metadata: bool,
    pub ingestion_success: bool,
}

/// Summary of an ingestion run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionMetrics {
    pub submitted_dois: usize,
    pub new_dois: usize,
    pub existing_dois: usize,
    pub ingested_dois: usize,
    pub metadata_failure: usize,
    pub valid_pattern_dois: usize,
    pub invalid_pattern_dois: usize,
    pub openalex_success: usize,
    pub openaire_success: usize,
    pub total_time_seconds: f64,
}

/// Tracks a batch of submitted DOIs through ingestion
#[derive(Debug)]
pub struct DoiManager {
    submitted: usize,
    update_metadata: bool,
    tracker: Vec<DoiStatus>,
    started: Option<Instant>,
    elapsed_secs: f64,
}

impl DoiManager {
    /// Track the first `limit` cleaned DOIs of `dois`.
    pub fn new(dois: &[String], limit: usize, update_metadata: bool) -> Result<Self> {
        if dois.is_empty() {
            return Err(IndexError::Validation("DOI list cannot be empty".to_string()));
        }
        if limit == 0 || limit > dois.len() {
            return Err(IndexError::Validation(
                "Limit must be positive and less than the number of DOIs".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let tracker = dois
            .iter()
            .take(limit)
            .map(|raw| clean_doi(raw))
            .filter(|doi| seen.insert(doi.clone()))
            .map(|doi| DoiStatus { doi, ..Default::default() })
            .collect();

        Ok(Self {
            submitted: dois.len(),
            update_metadata,
            tracker,
            started: None,
            elapsed_secs: 0.0,
        })
    }

    pub fn update_metadata(&self) -> bool {
        self.update_metadata
    }

    pub fn statuses(&self) -> &[DoiStatus] {
        &self.tracker
    }

    pub fn status_mut(&mut self, doi: &str) -> Option<&mut DoiStatus> {
        self.tracker.iter_mut().find(|s| s.doi == doi)
    }

    /// Mark every tracked DOI that matches the DOI pattern.
    pub fn pattern_check(&mut self) {
        for status in &mut self.tracker {
            status.valid_pattern = is_valid_doi(&status.doi);
            if status.valid_pattern {
                debug!(doi = %status.doi, "Valid DOI pattern");
            } else {
                warn!(doi = %status.doi, "Invalid DOI pattern");
            }
        }
    }

    /// DOIs that passed the pattern check, in submission order.
    pub fn valid_dois(&self) -> Vec<String> {
        self.tracker
            .iter()
            .filter(|s| s.valid_pattern)
            .map(|s| s.doi.clone())
            .collect()
    }

    /// Record which valid DOIs are already present in the store.
    pub fn mark_existing(&mut self, existing: &HashSet<String>) {
        for status in &mut self.tracker {
            status.already_exists = status.valid_pattern && existing.contains(&status.doi);
        }
    }

    pub fn start_ingestion(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn end_ingestion(&mut self) {
        if let Some(started) = self.started {
            self.elapsed_secs = started.elapsed().as_secs_f64();
        }
    }

    pub fn metrics(&self) -> IngestionMetrics {
        let count = |f: fn(&DoiStatus) -> bool| self.tracker.iter().filter(|s| f(s)).count();

        let valid = count(|s| s.valid_pattern);
        let existing = count(|s| s.already_exists);
        let ingested = count(|s| s.ingestion_success);

        let metadata_failure = if self.update_metadata {
            valid.saturating_sub(ingested)
        } else {
            count(|s| s.valid_pattern && !s.ingestion_success && !s.already_exists)
        };

        IngestionMetrics {
            submitted_dois: self.submitted,
            new_dois: valid.saturating_sub(existing),
            existing_dois: existing,
            ingested_dois: ingested,
            metadata_failure,
            valid_pattern_dois: valid,
            invalid_pattern_dois: self.tracker.len() - valid,
            openalex_success: count(|s| s.openalex_metadata),
            openaire_success: count(|s| s.openaire_metadata),
            total_time_seconds: (self.elapsed_secs * 1000.0).round() / 1000.0,
        }
    }
}
