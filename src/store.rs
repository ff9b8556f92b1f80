use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::models::EnrichedRecord;

/// The enriched dataset persists as a flat JSON table between pipeline runs
/// and dashboard sessions: one flattened row per complaint, enrichment fields
/// included. This is the only state the system keeps.
pub fn save_dataset(path: &Path, records: &[EnrichedRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    std::fs::write(path, serde_json::to_vec_pretty(records)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!("Dataset saved - path={}, records={}", path.display(), records.len());
    Ok(())
}

pub fn load_dataset(path: &Path) -> Result<Vec<EnrichedRecord>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading dataset {} (run `enrich` first?)", path.display()))?;
    let records: Vec<EnrichedRecord> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing dataset {}", path.display()))?;
    debug!("Dataset loaded - path={}, records={}", path.display(), records.len());
    Ok(records)
}
