use serde::Deserialize;

/// One row of raw scraper output, as dumped by the portal scraper. Field
/// presence is unreliable, so everything optional defaults instead of failing
/// deserialization; the normalizer decides what is actually fatal.
#[derive(Debug, Clone, Deserialize)]
pub struct RawComplaintEntry {
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Possibly partial paths ("/uploads/abc.jpg") or full URLs.
    #[serde(default)]
    pub image_paths: Vec<String>,
    /// URL-like string encoding municipality and identifier,
    /// e.g. "https://portal.example/complaints/karachi/48211".
    pub permalink: String,
    /// Timestamp string in whatever format the portal rendered.
    pub submitted_at: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "other".to_string()
}
