use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::{fs, path::Path};

use crate::filter::Aggregates;
use crate::models::EnrichedRecord;

/// One dashboard row: the flattened record plus explicit missing-field flags,
/// so the UI shows partial enrichment instead of hiding it.
#[derive(Serialize)]
struct DashRow<'a> {
    #[serde(flatten)]
    record: &'a EnrichedRecord,
    missing_fields: Vec<&'static str>,
}

fn missing_fields(r: &EnrichedRecord) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if r.translated_title.is_none() {
        missing.push("translation");
    }
    if r.image_descriptions.len() < r.record.image_urls.len() {
        missing.push("image_descriptions");
    }
    if r.severity.is_none() {
        missing.push("severity");
    }
    missing
}

/// Write the chart-ready dashboard bundle: the record table and the derived
/// aggregate counts for filter widgets and charts.
pub fn write_dashboard(path: &Path, records: &[&EnrichedRecord], aggregates: &Aggregates) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("create {:?}", parent))?;
        }
    }

    let rows: Vec<DashRow> = records
        .iter()
        .map(|r| DashRow {
            record: r,
            missing_fields: missing_fields(r),
        })
        .collect();

    let bundle = json!({
        "version": 1,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "records": rows,
        "aggregates": aggregates,
    });

    fs::write(path, serde_json::to_vec_pretty(&bundle)?)
        .with_context(|| format!("writing dashboard bundle {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplaintRecord, EnrichmentNotes};
    use chrono::{TimeZone, Utc};

    #[test]
    fn rows_name_every_missing_enrichment_field() {
        let r = EnrichedRecord {
            record: ComplaintRecord {
                id: "1".to_string(),
                municipality: "karachi".to_string(),
                submitted_at: Utc.with_ymd_and_hms(2025, 6, 14, 9, 0, 0).unwrap(),
                title: "t".to_string(),
                body: "b".to_string(),
                image_urls: vec!["https://portal.example/a.jpg".to_string()],
                category: "roads".to_string(),
            },
            translated_title: None,
            translated_body: None,
            image_descriptions: vec![],
            severity: None,
            severity_rationale: None,
            notes: EnrichmentNotes::default(),
        };
        assert_eq!(missing_fields(&r), vec!["translation", "image_descriptions", "severity"]);
    }
}
