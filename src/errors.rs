use thiserror::Error;

/// Per-record normalization failure. The offending record is dropped from the
/// batch and logged; the rest of the batch continues.
#[derive(Debug, Error)]
#[error("malformed record: missing or unparseable field `{field}`")]
pub struct MalformedRecord {
    pub field: &'static str,
}

/// One failed call to the model endpoint, classified by whether a retry could
/// plausibly succeed.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("transient endpoint failure: {0}")]
    Transient(String),
    #[error("permanent endpoint failure: {0}")]
    Permanent(String),
}

/// Stage-level enrichment failures. None of these abort the batch; each one
/// degrades a single record's enrichment and processing continues.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("translation unavailable: {0}")]
    TranslationUnavailable(String),

    #[error("image {index} unavailable: {reason}")]
    ImageUnavailable { index: usize, reason: String },

    /// The model's reply did not contain an integer in 0..=10. The raw reply
    /// is kept so it can be reviewed by hand.
    #[error("severity classification ambiguous")]
    ClassificationAmbiguous { raw: String },

    /// The classification call itself failed (retries exhausted or rejected),
    /// so there is no raw reply to review.
    #[error("severity classification unavailable: {0}")]
    ClassificationUnavailable(String),
}

/// Query-time failure, surfaced to the caller so they can narrow the filter.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("context too large: {needed} tokens even after truncation, limit is {limit}")]
    ContextTooLarge { needed: usize, limit: usize },

    #[error(transparent)]
    Call(#[from] CallError),
}

/// Rubric table problems are fatal at startup, before any record is processed.
#[derive(Debug, Error)]
pub enum RubricError {
    #[error("rubric must have exactly 11 entries, got {0}")]
    WrongCount(usize),
    #[error("rubric level {0} out of range (levels are 0..=10)")]
    LevelOutOfRange(u8),
    #[error("rubric level {0} defined more than once")]
    DuplicateLevel(u8),
}
