use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::errors::CallError;

/// One logical call to the model endpoint. When `image_url` is set the
/// request goes to the vision model with a multimodal content part.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub image_url: Option<String>,
}

/// Seam between the pipeline and the hosted endpoint, so stage logic can be
/// exercised against a scripted backend in tests.
#[allow(async_fn_in_trait)]
pub trait ChatBackend {
    async fn chat(&self, req: &ChatRequest) -> Result<String, CallError>;
}

pub struct ModelClient {
    http: Client,
    api_base: String,
    api_key: String,
    model: String,
    vision_model: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ModelClient {
    pub fn new(cfg: &RunConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(ModelClient {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            vision_model: cfg.vision_model().to_string(),
            max_retries: cfg.max_retries,
            retry_base_delay: Duration::from_millis(cfg.retry_base_delay_ms),
        })
    }

    fn build_body(&self, req: &ChatRequest) -> Value {
        let user_content: Value = match &req.image_url {
            Some(url) => json!([
                { "type": "text", "text": req.user },
                { "type": "image_url", "image_url": { "url": url } },
            ]),
            None => json!(req.user),
        };
        let model = if req.image_url.is_some() { &self.vision_model } else { &self.model };
        json!({
            "model": model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": req.system },
                { "role": "user", "content": user_content },
            ],
        })
    }

    /// Single attempt, with the failure classified for the retry policy.
    async fn attempt(&self, req: &ChatRequest) -> Result<String, CallError> {
        let url = format!("{}/chat/completions", self.api_base);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(req))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallError::Transient(format!("request timed out: {}", e))
                } else {
                    CallError::Transient(format!("request failed: {}", e))
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CallError::Transient(format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            // Content-policy rejections and malformed-input errors land here.
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::Permanent(format!("HTTP {}: {}", status, body)));
        }

        let completion: ChatCompletion = resp
            .json()
            .await
            .map_err(|e| CallError::Permanent(format!("malformed completion envelope: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CallError::Permanent("completion had no content".to_string()))
    }
}

/// Retry driver for one logical call: transient failures back off
/// exponentially up to `max_retries` extra attempts; permanent failures
/// return immediately.
async fn retry_with_backoff<F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut attempt: F,
) -> Result<String, CallError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String, CallError>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match attempt().await {
            Ok(answer) => return Ok(answer),
            Err(CallError::Permanent(e)) => {
                warn!("LLM call failed permanently - attempt={}, error={}", attempts, e);
                return Err(CallError::Permanent(e));
            }
            Err(CallError::Transient(e)) => {
                if attempts > max_retries {
                    warn!("LLM call retries exhausted - attempts={}, error={}", attempts, e);
                    return Err(CallError::Transient(e));
                }
                let delay = base_delay * 2u32.saturating_pow(attempts - 1);
                warn!(
                    "LLM call transient failure - attempt={}, retrying_in={:.1}s, error={}",
                    attempts,
                    delay.as_secs_f32(),
                    e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

impl ChatBackend for ModelClient {
    async fn chat(&self, req: &ChatRequest) -> Result<String, CallError> {
        let start = std::time::Instant::now();
        debug!(
            "LLM call starting - prompt_length={} chars, has_image={}",
            req.user.len(),
            req.image_url.is_some()
        );

        let answer =
            retry_with_backoff(self.max_retries, self.retry_base_delay, || self.attempt(req)).await?;

        let elapsed = start.elapsed();
        info!(
            "LLM API call completed - duration={:.2}s, response_length={} chars",
            elapsed.as_secs_f32(),
            answer.len()
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TINY: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn transient_failure_then_success_retries() {
        let calls = AtomicU32::new(0);
        let out = retry_with_backoff(3, TINY, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CallError::Transient("timed out".to_string()))
                } else {
                    Ok("recovered".to_string())
                }
            }
        })
        .await;
        assert_eq!(out.unwrap(), "recovered");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_the_retry_budget() {
        let calls = AtomicU32::new(0);
        let out = retry_with_backoff(2, TINY, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::Transient("HTTP 503".to_string())) }
        })
        .await;
        assert!(matches!(out, Err(CallError::Transient(_))));
        // initial attempt plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let out = retry_with_backoff(5, TINY, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::Permanent("HTTP 400".to_string())) }
        })
        .await;
        assert!(matches!(out, Err(CallError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
