use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Run configuration, loaded once from YAML at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// OpenAI-compatible endpoint base, e.g. "http://localhost:5001/v1".
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    /// Model used for the image-description stage; defaults to `model`.
    #[serde(default)]
    pub vision_model: Option<String>,

    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// How many records enrich concurrently. Each record's own stages stay
    /// sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Optional YAML override for the built-in severity rubric.
    #[serde(default)]
    pub rubric_path: Option<PathBuf>,
}

fn default_source_language() -> String {
    "auto-detect".to_string()
}
fn default_target_language() -> String {
    "English".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_concurrency() -> usize {
    8
}

impl RunConfig {
    pub fn vision_model(&self) -> &str {
        self.vision_model.as_deref().unwrap_or(&self.model)
    }
}

pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        anyhow::bail!(
            "config not found at {}\n\
             Use --config to specify a config file, or set COMPLAINTS_CONFIG.\n\
             Example config.yaml:\n\
             api_base: \"http://localhost:5001/v1\"\napi_key: \"YOUR_KEY\"\nmodel: \"qwen3_30b_a3\"\n",
            path.display()
        );
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: RunConfig =
        serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}
