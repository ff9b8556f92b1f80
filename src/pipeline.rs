use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::errors::StageError;
use crate::llm::ChatBackend;
use crate::models::{ComplaintRecord, EnrichedRecord, EnrichmentNotes};
use crate::rubric::SeverityRubric;
use crate::stages;

pub struct PipelineOpts {
    /// Records enriched concurrently per batch. Within a record the three
    /// stages stay strictly sequential.
    pub concurrency: usize,
    pub source_language: String,
    pub target_language: String,
}

const CANCELLED: &str = "skipped: run cancelled";

/// Enrich a single record: translate, then describe images, then classify
/// severity. Every stage failure degrades this record and is recorded in its
/// notes; the record itself always comes back.
pub async fn enrich_one<B: ChatBackend>(
    backend: &B,
    rubric: &SeverityRubric,
    opts: &PipelineOpts,
    record: ComplaintRecord,
    cancel: &AtomicBool,
) -> EnrichedRecord {
    if cancel.load(Ordering::Relaxed) {
        return EnrichedRecord::unenriched(record, CANCELLED);
    }

    let mut out = EnrichedRecord {
        record,
        translated_title: None,
        translated_body: None,
        image_descriptions: Vec::new(),
        severity: None,
        severity_rationale: None,
        notes: EnrichmentNotes::default(),
    };

    // 1) translate
    match stages::translate(
        backend,
        &out.record.title,
        &out.record.body,
        &opts.source_language,
        &opts.target_language,
    )
    .await
    {
        Ok((title, body)) => {
            out.translated_title = Some(title);
            out.translated_body = Some(body);
        }
        Err(e) => {
            warn!("Translation degraded - record={}, error={}", out.record.id, e);
            out.notes.translation = Some(e.to_string());
        }
    }

    // 2) describe images, one call per image; failures are per-image.
    // Without a translation the stage runs image-only, no text grounding.
    let title_for_images = out.best_title().to_string();
    let body_for_images = out.translated_body.clone();
    let image_urls = out.record.image_urls.clone();
    for (i, url) in image_urls.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            out.notes.images.push(format!("image {}: {}", i + 1, CANCELLED));
            continue;
        }
        match stages::describe_image(backend, &title_for_images, body_for_images.as_deref(), url, i).await {
            Ok(description) => out.image_descriptions.push(description),
            Err(e) => {
                warn!("Image description degraded - record={}, error={}", out.record.id, e);
                out.notes.images.push(e.to_string());
            }
        }
    }

    // 3) classify severity on whatever survived the earlier stages
    if cancel.load(Ordering::Relaxed) {
        out.notes.severity = Some(CANCELLED.to_string());
        return out;
    }
    let title = out.best_title().to_string();
    let body = out.best_body().to_string();
    match stages::classify_severity(backend, rubric, &title, &body, &out.image_descriptions).await {
        Ok((level, rationale)) => {
            if let Ok(entry) = rubric.lookup(level) {
                debug!("Severity assigned - record={}, level={} ({})", out.record.id, level, entry.label);
            }
            out.severity = Some(level);
            out.severity_rationale = Some(rationale);
        }
        Err(StageError::ClassificationAmbiguous { raw }) => {
            warn!("Classification ambiguous - record={}, kept raw reply for review", out.record.id);
            out.severity_rationale = Some(raw);
            out.notes.severity = Some("classification reply had no level in 0..=10".to_string());
        }
        Err(e) => {
            warn!("Classification degraded - record={}, error={}", out.record.id, e);
            out.notes.severity = Some(e.to_string());
        }
    }

    out
}

/// Enrich a batch of records with bounded concurrency. Results come back in
/// input order (join_all preserves positions, so no shared mutable state is
/// needed). Cancellation stops new batches; records never enriched are still
/// returned, marked as skipped, so partial runs stay usable.
pub async fn enrich_all<B: ChatBackend>(
    backend: &B,
    rubric: &SeverityRubric,
    opts: &PipelineOpts,
    records: Vec<ComplaintRecord>,
    cancel: &AtomicBool,
) -> Vec<EnrichedRecord> {
    let total = records.len();
    let batch_size = opts.concurrency.max(1);
    let start = std::time::Instant::now();
    info!(
        "Enrichment starting - records={}, batch_size={}, stages=translate/describe/classify",
        total, batch_size
    );

    let mut out: Vec<EnrichedRecord> = Vec::with_capacity(total);
    let mut remaining = records.into_iter();
    let mut total_batch_time = 0.0f32;
    let mut batches_done = 0u32;

    loop {
        let batch: Vec<ComplaintRecord> = remaining.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        if cancel.load(Ordering::Relaxed) {
            warn!("Run cancelled - skipping {} remaining records", batch.len() + remaining.len());
            out.extend(batch.into_iter().map(|r| EnrichedRecord::unenriched(r, CANCELLED)));
            out.extend(remaining.map(|r| EnrichedRecord::unenriched(r, CANCELLED)));
            break;
        }

        let batch_start = std::time::Instant::now();
        let tasks: Vec<_> = batch
            .into_iter()
            .map(|r| enrich_one(backend, rubric, opts, r, cancel))
            .collect();
        let results = join_all(tasks).await;
        out.extend(results);

        let batch_elapsed = batch_start.elapsed().as_secs_f32();
        total_batch_time += batch_elapsed;
        batches_done += 1;

        let completed = out.len();
        let pct = (completed as f32 / total as f32 * 100.0) as u32;
        let avg_batch_time = total_batch_time / batches_done as f32;
        let remaining_batches = ((total - completed) as f32 / batch_size as f32).ceil() as u32;
        let eta_seconds = avg_batch_time * remaining_batches as f32;
        info!(
            "Enrichment progress: {}/{} ({}%) | Batch: {:.1}s | Avg batch: {:.1}s | ETA: {}m {}s",
            completed,
            total,
            pct,
            batch_elapsed,
            avg_batch_time,
            (eta_seconds / 60.0) as u32,
            (eta_seconds % 60.0) as u32
        );
    }

    let elapsed = start.elapsed();
    let scored = out.iter().filter(|r| r.severity.is_some()).count();
    let translated = out.iter().filter(|r| r.translated_title.is_some()).count();
    info!(
        "Enrichment completed - duration={:.2}s, records={}, translated={}, scored={}",
        elapsed.as_secs_f32(),
        out.len(),
        translated,
        scored
    );
    debug!("Unscored records retain raw rationale where available for manual review");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CallError;
    use crate::llm::ChatRequest;
    use chrono::{TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted backend: pops one canned reply per call, records requests.
    struct StubBackend {
        script: Mutex<VecDeque<Result<String, String>>>,
        calls: Mutex<Vec<ChatRequest>>,
    }

    impl StubBackend {
        fn new(script: Vec<Result<&str, &str>>) -> Self {
            StubBackend {
                script: Mutex::new(
                    script
                        .into_iter()
                        .map(|r| r.map(String::from).map_err(String::from))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ChatBackend for StubBackend {
        async fn chat(&self, req: &ChatRequest) -> Result<String, CallError> {
            self.calls.lock().unwrap().push(req.clone());
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(s)) => Ok(s),
                Some(Err(e)) => Err(CallError::Permanent(e)),
                None => Err(CallError::Permanent("script exhausted".to_string())),
            }
        }
    }

    fn record(id: &str, images: usize) -> ComplaintRecord {
        ComplaintRecord {
            id: id.to_string(),
            municipality: "karachi".to_string(),
            submitted_at: Utc.with_ymd_and_hms(2025, 6, 14, 9, 30, 0).unwrap(),
            title: "Sewage on the street".to_string(),
            body: "Standing sewage near the school gate.".to_string(),
            image_urls: (0..images)
                .map(|i| format!("https://portal.example/uploads/{}.jpg", i))
                .collect(),
            category: "sanitation".to_string(),
        }
    }

    fn opts() -> PipelineOpts {
        PipelineOpts {
            concurrency: 4,
            source_language: "Urdu".to_string(),
            target_language: "English".to_string(),
        }
    }

    #[tokio::test]
    async fn failed_translation_still_yields_a_scored_record() {
        // translate fails; classify runs on original-language text and succeeds
        let backend = StubBackend::new(vec![
            Err("model refused"),
            Ok("6\nStanding sewage near a school matches the Level 6 health-risk bar."),
        ]);
        let rubric = SeverityRubric::default();
        let cancel = AtomicBool::new(false);

        let out = enrich_all(&backend, &rubric, &opts(), vec![record("r1", 0)], &cancel).await;
        assert_eq!(out.len(), 1);
        let r = &out[0];
        assert!(r.translated_title.is_none());
        assert!(r.notes.translation.is_some());
        assert_eq!(r.severity, Some(6));
        assert!(r.severity_rationale.is_some());

        // classification prompt fell back to the original text
        let calls = backend.calls.lock().unwrap();
        assert!(calls[1].user.contains("Sewage on the street"));
    }

    #[tokio::test]
    async fn ambiguous_classification_keeps_raw_reply_and_no_level() {
        let backend = StubBackend::new(vec![
            Ok(r#"{"title": "Sewage on the street", "body": "Standing sewage near the school gate."}"#),
            Ok("Honestly somewhere between moderate and high."),
        ]);
        let rubric = SeverityRubric::default();
        let cancel = AtomicBool::new(false);

        let out = enrich_all(&backend, &rubric, &opts(), vec![record("r1", 0)], &cancel).await;
        let r = &out[0];
        assert_eq!(r.severity, None);
        assert_eq!(
            r.severity_rationale.as_deref(),
            Some("Honestly somewhere between moderate and high.")
        );
        assert!(r.notes.severity.is_some());
    }

    #[tokio::test]
    async fn image_failures_are_per_image_not_per_record() {
        let backend = StubBackend::new(vec![
            Ok(r#"{"title": "t", "body": "b"}"#),
            Ok("A flooded walkway with visible sewage pooling near a gate."),
            Err("broken link"),
            Ok("4\nLocalized flooding."),
        ]);
        let rubric = SeverityRubric::default();
        let cancel = AtomicBool::new(false);

        let out = enrich_all(&backend, &rubric, &opts(), vec![record("r1", 2)], &cancel).await;
        let r = &out[0];
        assert_eq!(r.image_descriptions.len(), 1);
        assert_eq!(r.notes.images.len(), 1);
        assert_eq!(r.severity, Some(4));
    }

    #[tokio::test]
    async fn cancellation_skips_records_without_dropping_them() {
        let backend = StubBackend::new(vec![]);
        let rubric = SeverityRubric::default();
        let cancel = AtomicBool::new(true);

        let records = vec![record("r1", 0), record("r2", 1)];
        let out = enrich_all(&backend, &rubric, &opts(), records, &cancel).await;
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.severity.is_none()));
        assert_eq!(backend.call_count(), 0);
    }
}
