use serde::Deserialize;
use tracing::debug;

use crate::errors::StageError;
use crate::llm::{ChatBackend, ChatRequest};
use crate::prompts;
use crate::rubric::SeverityRubric;

/* Free-text model responses are an untrusted boundary: one narrow parser per
stage, with the stage's defined failure mode on any parse miss. */

#[derive(Debug, Deserialize)]
struct TranslationOut {
    title: String,
    body: String,
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop an optional language tag on the fence line
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n').trim_end_matches('`').trim()
}

/// Parse the translation stage's strict-JSON reply. Tolerates code fences and
/// leading/trailing prose, nothing more.
pub fn parse_translation(raw: &str) -> Option<(String, String)> {
    let cleaned = strip_code_fences(raw);
    if let Ok(out) = serde_json::from_str::<TranslationOut>(cleaned) {
        return Some((out.title, out.body));
    }
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<TranslationOut>(&cleaned[start..=end])
        .ok()
        .map(|out| (out.title, out.body))
}

/// Extract a severity level from the classification reply: the first integer
/// in the text, rejected if fractional or outside 0..=10.
pub fn parse_severity(raw: &str) -> Option<u8> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            // a fractional value is not a level
            if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
                return None;
            }
            let value: u64 = raw[start..i].parse().ok()?;
            return if value <= 10 { Some(value as u8) } else { None };
        }
        i += 1;
    }
    None
}

pub async fn translate<B: ChatBackend>(
    backend: &B,
    title: &str,
    body: &str,
    source_language: &str,
    target_language: &str,
) -> Result<(String, String), StageError> {
    let req = ChatRequest {
        system: prompts::SYSTEM_TRANSLATE.to_string(),
        user: prompts::user_translate(title, body, source_language, target_language),
        image_url: None,
    };
    let raw = backend
        .chat(&req)
        .await
        .map_err(|e| StageError::TranslationUnavailable(e.to_string()))?;
    parse_translation(&raw).ok_or_else(|| {
        debug!("Translation reply did not parse as JSON - length={}", raw.len());
        StageError::TranslationUnavailable("reply was not the expected JSON shape".to_string())
    })
}

/// Describe one image, grounded on the best available text. `body` is `None`
/// when no text grounding is usable (translation failed); the stage degrades
/// to image-only context. Failures are per-image, never per-record.
pub async fn describe_image<B: ChatBackend>(
    backend: &B,
    title: &str,
    body: Option<&str>,
    image_url: &str,
    index: usize,
) -> Result<String, StageError> {
    let req = ChatRequest {
        system: prompts::SYSTEM_DESCRIBE.to_string(),
        user: prompts::user_describe_image(title, body),
        image_url: Some(image_url.to_string()),
    };
    let description = backend.chat(&req).await.map_err(|e| StageError::ImageUnavailable {
        index,
        reason: e.to_string(),
    })?;
    Ok(description.trim().to_string())
}

/// Classify severity against the rubric. Returns the level plus the full raw
/// reply as rationale; an out-of-range or non-numeric reply is ambiguous and
/// keeps the raw reply for manual review.
pub async fn classify_severity<B: ChatBackend>(
    backend: &B,
    rubric: &SeverityRubric,
    title: &str,
    body: &str,
    image_descriptions: &[String],
) -> Result<(u8, String), StageError> {
    let req = ChatRequest {
        system: prompts::SYSTEM_CLASSIFY.to_string(),
        user: prompts::user_classify(&rubric.render_as_context(), title, body, image_descriptions),
        image_url: None,
    };
    let raw = backend
        .chat(&req)
        .await
        .map_err(|e| StageError::ClassificationUnavailable(e.to_string()))?;
    match parse_severity(&raw) {
        Some(level) => Ok((level, raw)),
        None => Err(StageError::ClassificationAmbiguous { raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_leading_level_line() {
        assert_eq!(parse_severity("7\nOpen pothole on an arterial road."), Some(7));
        assert_eq!(parse_severity("Level: 10 - building collapse"), Some(10));
        assert_eq!(parse_severity("0"), Some(0));
    }

    #[test]
    fn severity_rejects_out_of_range_and_non_numeric() {
        assert_eq!(parse_severity("11\ntoo dramatic"), None);
        assert_eq!(parse_severity("somewhere between moderate and high"), None);
        assert_eq!(parse_severity(""), None);
    }

    #[test]
    fn severity_rejects_fractional_values() {
        assert_eq!(parse_severity("3.5 feels right"), None);
        assert_eq!(parse_severity("0.5"), None);
    }

    #[test]
    fn translation_parses_plain_and_fenced_json() {
        let plain = r#"{"title": "Broken streetlight", "body": "Dark for a week."}"#;
        assert_eq!(
            parse_translation(plain),
            Some(("Broken streetlight".to_string(), "Dark for a week.".to_string()))
        );

        let fenced = "```json\n{\"title\": \"A\", \"body\": \"B\"}\n```";
        assert_eq!(parse_translation(fenced), Some(("A".to_string(), "B".to_string())));

        let wrapped = "Here you go: {\"title\": \"A\", \"body\": \"B\"} Hope that helps!";
        assert_eq!(parse_translation(wrapped), Some(("A".to_string(), "B".to_string())));
    }

    #[test]
    fn translation_parse_failure_is_none() {
        assert_eq!(parse_translation("I cannot translate this."), None);
        assert_eq!(parse_translation("{\"title\": \"only a title\"}"), None);
    }
}
