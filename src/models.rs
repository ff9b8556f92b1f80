use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintRecord {
    pub id: String,           // unique per source, parsed from the permalink
    pub municipality: String, // canonical lowercase key, e.g. "karachi"
    pub submitted_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
    pub image_urls: Vec<String>,
    pub category: String,
}

/// A complaint plus whatever enrichment succeeded. Fields left `None` (or a
/// shorter-than-expected description list) carry an explanation in `notes`,
/// so the dashboard can say what is missing and why instead of hiding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: ComplaintRecord,

    pub translated_title: Option<String>,
    pub translated_body: Option<String>,

    /// One entry per image that was successfully described; may be shorter
    /// than `record.image_urls` when individual images failed.
    #[serde(default)]
    pub image_descriptions: Vec<String>,

    /// Severity level in 0..=10, or absent when classification failed.
    pub severity: Option<u8>,

    /// Raw model output from the classification stage. Retained even when
    /// `severity` is absent, for manual review.
    pub severity_rationale: Option<String>,

    #[serde(default)]
    pub notes: EnrichmentNotes,
}

/// Per-stage reasons for missing enrichment fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentNotes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl EnrichedRecord {
    /// A record that carries no enrichment at all, with one note explaining why.
    pub fn unenriched(record: ComplaintRecord, reason: &str) -> Self {
        EnrichedRecord {
            record,
            translated_title: None,
            translated_body: None,
            image_descriptions: Vec::new(),
            severity: None,
            severity_rationale: None,
            notes: EnrichmentNotes {
                translation: Some(reason.to_string()),
                images: Vec::new(),
                severity: Some(reason.to_string()),
            },
        }
    }

    /// Best available title/body for downstream stages: translated when the
    /// translation stage succeeded, original-language otherwise.
    pub fn best_title(&self) -> &str {
        self.translated_title.as_deref().unwrap_or(&self.record.title)
    }

    pub fn best_body(&self) -> &str {
        self.translated_body.as_deref().unwrap_or(&self.record.body)
    }
}

/// Transient filter input; never persisted. Empty sets match everything.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub municipalities: BTreeSet<String>,
    pub categories: BTreeSet<String>,
}

impl FilterCriteria {
    pub fn matches(&self, r: &ComplaintRecord) -> bool {
        if let Some(from) = self.from {
            if r.submitted_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if r.submitted_at > to {
                return false;
            }
        }
        if !self.municipalities.is_empty() && !self.municipalities.contains(&r.municipality) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&r.category) {
            return false;
        }
        true
    }
}
