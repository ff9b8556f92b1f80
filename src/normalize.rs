use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::errors::MalformedRecord;
use crate::models::ComplaintRecord;
use crate::scrape_types::RawComplaintEntry;

/// Canonical key for a municipality or category: NFC-normalized, lowercased,
/// trimmed. The filter layer relies on these being a small stable set.
pub fn canonical_key(s: &str) -> String {
    s.trim().nfc().collect::<String>().to_lowercase()
}

/// The portal embeds municipality and identifier in the permalink path as
/// ".../{municipality}/{id}". Query strings and fragments are portal noise
/// and ignored. Returns (municipality, id, parsed permalink).
fn parse_permalink(permalink: &str) -> Result<(String, String, Url), MalformedRecord> {
    let url =
        Url::parse(permalink.trim()).map_err(|_| MalformedRecord { field: "permalink" })?;

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    // Need at least {municipality}/{id}; a bare host doesn't count.
    if segments.len() < 2 {
        return Err(MalformedRecord { field: "permalink" });
    }
    let id = segments[segments.len() - 1];
    let municipality = segments[segments.len() - 2];

    if !id.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(MalformedRecord { field: "permalink" });
    }
    // A purely numeric "municipality" means the path shape is wrong.
    if municipality.chars().all(|c| c.is_ascii_digit()) {
        return Err(MalformedRecord { field: "permalink" });
    }

    Ok((canonical_key(municipality), id.to_string(), url))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MalformedRecord> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(MalformedRecord {
        field: "submitted_at",
    })
}

/// Resolve a possibly-partial image path against the record's permalink.
/// Absolute URLs pass through; anything join can't make sense of is kept
/// verbatim so the image stage reports it as a broken reference.
fn resolve_image_url(fragment: &str, base: &Url) -> String {
    let fragment = fragment.trim();
    match base.join(fragment) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => fragment.to_string(),
    }
}

/// Pure transform from one raw scraper row to a canonical complaint record.
/// Missing images are fine (empty list); an unparseable permalink or
/// timestamp fails the record.
pub fn normalize_entry(raw: &RawComplaintEntry) -> Result<ComplaintRecord, MalformedRecord> {
    if raw.title.trim().is_empty() {
        return Err(MalformedRecord { field: "title" });
    }
    let (municipality, id, permalink) = parse_permalink(&raw.permalink)?;
    let submitted_at = parse_timestamp(&raw.submitted_at)?;

    let image_urls = raw
        .image_paths
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| resolve_image_url(p, &permalink))
        .collect();

    Ok(ComplaintRecord {
        id,
        municipality,
        submitted_at,
        title: raw.title.trim().to_string(),
        body: raw.body.trim().to_string(),
        image_urls,
        category: canonical_key(&raw.category),
    })
}

/// Normalize a whole scrape. Malformed rows are logged and dropped; the rest
/// of the batch continues. Returns the kept records and the drop count.
pub fn normalize_batch(raw: &[RawComplaintEntry]) -> (Vec<ComplaintRecord>, usize) {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = 0usize;

    for (i, entry) in raw.iter().enumerate() {
        match normalize_entry(entry) {
            Ok(rec) => {
                debug!("Normalized record - index={}, id={}, municipality={}", i, rec.id, rec.municipality);
                records.push(rec);
            }
            Err(e) => {
                warn!("Dropping record - index={}, permalink={}, error={}", i, entry.permalink, e);
                dropped += 1;
            }
        }
    }

    info!("Normalization completed - kept={}, dropped={}", records.len(), dropped);
    (records, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(permalink: &str, images: Vec<&str>) -> RawComplaintEntry {
        RawComplaintEntry {
            title: "Overflowing garbage container".to_string(),
            body: "The container on the corner has not been emptied in two weeks.".to_string(),
            image_paths: images.into_iter().map(String::from).collect(),
            permalink: permalink.to_string(),
            submitted_at: "2025-06-14 09:30:00".to_string(),
            category: "Sanitation".to_string(),
        }
    }

    #[test]
    fn entry_without_images_yields_empty_list_not_failure() {
        let rec = normalize_entry(&raw("https://portal.example/complaints/karachi/48211", vec![]))
            .expect("should normalize");
        assert!(rec.image_urls.is_empty());
        assert_eq!(rec.id, "48211");
        assert_eq!(rec.municipality, "karachi");
        assert_eq!(rec.category, "sanitation");
    }

    #[test]
    fn partial_image_paths_resolve_against_permalink_origin() {
        let rec = normalize_entry(&raw(
            "https://portal.example/complaints/lahore/99",
            vec!["/uploads/a.jpg", "https://cdn.example/b.jpg"],
        ))
        .expect("should normalize");
        assert_eq!(
            rec.image_urls,
            vec![
                "https://portal.example/uploads/a.jpg".to_string(),
                "https://cdn.example/b.jpg".to_string()
            ]
        );
    }

    #[test]
    fn query_strings_and_fragments_do_not_drop_the_record() {
        let rec = normalize_entry(&raw(
            "https://portal.example/complaints/karachi/48211?src=share&utm_medium=app",
            vec![],
        ))
        .expect("query string is portal noise, not a malformed record");
        assert_eq!(rec.id, "48211");
        assert_eq!(rec.municipality, "karachi");

        let rec = normalize_entry(&raw("https://portal.example/complaints/karachi/48211#photos", vec![]))
            .expect("fragment is portal noise, not a malformed record");
        assert_eq!(rec.id, "48211");
    }

    #[test]
    fn unparseable_permalink_is_a_hard_failure_naming_the_field() {
        let err = normalize_entry(&raw("https://portal.example/", vec![])).unwrap_err();
        assert_eq!(err.field, "permalink");

        // Numeric path tail without a municipality segment.
        let err = normalize_entry(&raw("https://portal.example/123/456", vec![])).unwrap_err();
        assert_eq!(err.field, "permalink");
    }

    #[test]
    fn bad_timestamp_is_a_hard_failure() {
        let mut e = raw("https://portal.example/complaints/karachi/1", vec![]);
        e.submitted_at = "a fortnight ago".to_string();
        let err = normalize_entry(&e).unwrap_err();
        assert_eq!(err.field, "submitted_at");
    }

    #[test]
    fn batch_drops_bad_rows_and_keeps_the_rest() {
        let rows = vec![
            raw("https://portal.example/complaints/karachi/1", vec![]),
            raw("not-a-permalink", vec![]),
            raw("https://portal.example/complaints/quetta/2", vec![]),
        ];
        let (records, dropped) = normalize_batch(&rows);
        assert_eq!(records.len(), 2);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn municipality_keys_are_case_and_form_insensitive() {
        let rec = normalize_entry(&raw("https://portal.example/complaints/Karachi/7", vec![]))
            .expect("should normalize");
        assert_eq!(rec.municipality, "karachi");
    }
}
