use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::RubricError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricEntry {
    pub level: u8,
    pub label: String,
    pub definition: String,
    pub example: String,
}

/// The fixed 11-level severity scale. Human-authored so the scale stays
/// auditable and stable independent of model drift; the classification stage
/// only ever selects among these levels, never invents new ones. Loaded once
/// at startup and never mutated.
#[derive(Debug, Clone)]
pub struct SeverityRubric {
    // entries[level] == entry with that level, guaranteed by validation
    entries: Vec<RubricEntry>,
}

impl SeverityRubric {
    /// Validate an arbitrary entry list: exactly 11 entries, levels 0..=10
    /// each present exactly once. A malformed table is fatal at startup.
    pub fn from_entries(mut entries: Vec<RubricEntry>) -> Result<Self, RubricError> {
        if entries.len() != 11 {
            return Err(RubricError::WrongCount(entries.len()));
        }
        let mut seen = [false; 11];
        for e in &entries {
            if e.level > 10 {
                return Err(RubricError::LevelOutOfRange(e.level));
            }
            if seen[e.level as usize] {
                return Err(RubricError::DuplicateLevel(e.level));
            }
            seen[e.level as usize] = true;
        }
        entries.sort_by_key(|e| e.level);
        Ok(SeverityRubric { entries })
    }

    pub fn load_yaml(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<RubricEntry> = serde_yaml::from_str(&text)?;
        Ok(Self::from_entries(entries)?)
    }

    pub fn lookup(&self, level: u8) -> Result<&RubricEntry, RubricError> {
        self.entries
            .get(level as usize)
            .ok_or(RubricError::LevelOutOfRange(level))
    }

    /// Full textual rubric for inclusion in classification prompts.
    pub fn render_as_context(&self) -> String {
        let mut out = String::from("SEVERITY RUBRIC (pick exactly one level):\n");
        for e in &self.entries {
            out.push_str(&format!(
                "Level {} ({}): {} Example: {}\n",
                e.level, e.label, e.definition, e.example
            ));
        }
        out
    }
}

fn entry(level: u8, label: &str, definition: &str, example: &str) -> RubricEntry {
    RubricEntry {
        level,
        label: label.to_string(),
        definition: definition.to_string(),
        example: example.to_string(),
    }
}

impl Default for SeverityRubric {
    fn default() -> Self {
        // Built-in scale for urban complaint triage. Reviewed by the city
        // operations team; edit the YAML override, not this table.
        let entries = vec![
            entry(
                0,
                "None",
                "No actionable issue; informational or duplicate report with no impact on residents.",
                "A resident asks where to find the waste collection schedule.",
            ),
            entry(
                1,
                "Trivial",
                "Cosmetic nuisance with no functional or health impact; indefinite deferral is acceptable.",
                "Faded paint on a park bench.",
            ),
            entry(
                2,
                "Minor",
                "Small localized inconvenience affecting a handful of residents; routine maintenance queue.",
                "A single cracked paving slab on a side street.",
            ),
            entry(
                3,
                "Low",
                "Noticeable degradation of a public amenity without safety implications; fix within the normal cycle.",
                "A park water fountain that stopped working.",
            ),
            entry(
                4,
                "Moderate",
                "Ongoing inconvenience for a street or block; service below expected standard but workarounds exist.",
                "Streetlight out on a residential lane for a week.",
            ),
            entry(
                5,
                "Elevated",
                "Persistent problem degrading daily life for a neighborhood; schedule remediation this cycle.",
                "Garbage container overflowing for several days.",
            ),
            entry(
                6,
                "Significant",
                "Sanitation or infrastructure failure with emerging health or safety side effects; prioritize above routine work.",
                "Sewage pooling on a walkway near a school.",
            ),
            entry(
                7,
                "High",
                "Hazard requiring immediate attention; credible risk of injury or property damage if left unaddressed.",
                "A deep open pothole on a busy road, unmarked at night.",
            ),
            entry(
                8,
                "Severe",
                "Active danger to residents or critical service outage affecting a whole area; dispatch crews out of turn.",
                "A collapsed sewer line flooding multiple homes.",
            ),
            entry(
                9,
                "Critical",
                "Imminent threat to life or large-scale essential-service failure; emergency response within hours.",
                "Exposed live power cable hanging at head height in a market.",
            ),
            entry(
                10,
                "Emergency",
                "Disaster-level incident; immediate multi-agency emergency mobilization.",
                "A building facade collapsing onto an occupied street.",
            ),
        ];
        SeverityRubric::from_entries(entries).expect("built-in rubric is valid")
    }
}
