use tracing::{debug, info};

use crate::errors::QueryError;
use crate::llm::{ChatBackend, ChatRequest};
use crate::models::EnrichedRecord;
use crate::prompts;

/// Heuristic ~4 chars/token, same scale the model endpoints bill against.
pub fn approx_tokens(s: &str) -> usize {
    (s.chars().count() + 3) / 4
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

fn render_record(r: &EnrichedRecord, body_chars: usize, rationale_chars: usize) -> String {
    let severity = match r.severity {
        Some(level) => level.to_string(),
        None => "unscored".to_string(),
    };
    let mut block = format!(
        "[{}] {} | {} | {} | severity={}\n",
        r.record.id,
        r.record.submitted_at.format("%Y-%m-%d"),
        r.record.municipality,
        r.record.category,
        severity
    );
    block.push_str(&format!("  title: {}\n", r.best_title()));
    if body_chars > 0 && !r.best_body().is_empty() {
        block.push_str(&format!("  body: {}\n", truncate_chars(r.best_body(), body_chars)));
    }
    if rationale_chars > 0 {
        if let Some(rationale) = &r.severity_rationale {
            block.push_str(&format!("  rationale: {}\n", truncate_chars(rationale, rationale_chars)));
        }
    }
    block
}

/// Build a bounded textual context from a filtered subset: first tighten the
/// per-record snippets, then sample the subset evenly. If even the minimal
/// rendering exceeds the budget, fail loudly so the caller narrows the filter
/// instead of getting an answer grounded on a mangled context.
pub fn build_context(subset: &[&EnrichedRecord], budget_tokens: usize) -> Result<String, QueryError> {
    // (body chars, rationale chars) per record, loosest first
    const STEPS: [(usize, usize); 3] = [(400, 200), (160, 80), (0, 0)];
    const STRIDES: [usize; 4] = [1, 2, 4, 8];

    let mut tightest = usize::MAX;
    for (body_chars, rationale_chars) in STEPS {
        for stride in STRIDES {
            let blocks: Vec<String> = subset
                .iter()
                .step_by(stride)
                .map(|r| render_record(r, body_chars, rationale_chars))
                .collect();
            let sampled = blocks.len();
            let text = blocks.join("\n");
            let tokens = approx_tokens(&text);
            if tokens <= budget_tokens {
                debug!(
                    "Context built - records={}/{}, stride={}, body_chars={}, tokens={}",
                    sampled,
                    subset.len(),
                    stride,
                    body_chars,
                    tokens
                );
                return Ok(text);
            }
            tightest = tightest.min(tokens);
        }
    }
    Err(QueryError::ContextTooLarge {
        needed: tightest,
        limit: budget_tokens,
    })
}

/// Answer a natural-language question over a filtered subset by delegating to
/// the model with the subset as context.
pub async fn ask<B: ChatBackend>(
    backend: &B,
    question: &str,
    subset: &[&EnrichedRecord],
    budget_tokens: usize,
) -> Result<String, QueryError> {
    let context = build_context(subset, budget_tokens)?;
    info!(
        "Query starting - records={}, context_tokens={}, question_length={}",
        subset.len(),
        approx_tokens(&context),
        question.len()
    );
    let req = ChatRequest {
        system: prompts::SYSTEM_ANSWER.to_string(),
        user: prompts::user_answer(question, &context),
        image_url: None,
    };
    Ok(backend.chat(&req).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplaintRecord, EnrichmentNotes};
    use chrono::{TimeZone, Utc};

    fn rec(i: usize) -> EnrichedRecord {
        EnrichedRecord {
            record: ComplaintRecord {
                id: format!("c{}", i),
                municipality: "karachi".to_string(),
                submitted_at: Utc.with_ymd_and_hms(2025, 6, 14, 9, 0, 0).unwrap(),
                title: "Overflowing garbage container near the market entrance".to_string(),
                body: "The container has not been emptied for two weeks and waste is spreading \
                       across the footpath, blocking pedestrians and attracting stray animals."
                    .repeat(3),
                image_urls: vec![],
                category: "sanitation".to_string(),
            },
            translated_title: None,
            translated_body: None,
            image_descriptions: vec![],
            severity: Some(5),
            severity_rationale: Some(
                "5\nPersistent sanitation problem degrading a neighborhood, no acute hazard yet."
                    .to_string(),
            ),
            notes: EnrichmentNotes::default(),
        }
    }

    #[test]
    fn small_subsets_fit_without_truncation() {
        let records: Vec<EnrichedRecord> = (0..3).map(rec).collect();
        let refs: Vec<&EnrichedRecord> = records.iter().collect();
        let ctx = build_context(&refs, 4000).expect("fits");
        assert!(ctx.contains("[c0]"));
        assert!(ctx.contains("[c2]"));
        assert!(ctx.contains("rationale:"));
    }

    #[test]
    fn oversized_subset_fails_with_context_too_large() {
        let records: Vec<EnrichedRecord> = (0..150).map(rec).collect();
        let refs: Vec<&EnrichedRecord> = records.iter().collect();
        match build_context(&refs, 500) {
            Err(QueryError::ContextTooLarge { needed, limit }) => {
                assert_eq!(limit, 500);
                assert!(needed > limit);
            }
            other => panic!("expected ContextTooLarge, got {:?}", other.map(|s| s.len())),
        }
    }

    #[test]
    fn tight_budget_samples_before_failing() {
        let records: Vec<EnrichedRecord> = (0..40).map(rec).collect();
        let refs: Vec<&EnrichedRecord> = records.iter().collect();
        // Big enough for a sampled/truncated rendering, too small for all 40
        // records at full length.
        let ctx = build_context(&refs, 1500).expect("should degrade, not fail");
        assert!(ctx.contains("[c0]"));
        assert!(approx_tokens(&ctx) <= 1500);
    }
}
