//! Blueprint records: structured per-file plans emitted by the structural
//! stage in the blueprint pipeline variant.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

/// A planned output file: its name and enough outline for the rendering
/// stage to produce full content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintRecord {
    /// Relative filename the rendered content should be written to.
    pub filename: String,
    /// Content outline driving the per-record rendering call.
    pub outline: String,
}

impl BlueprintRecord {
    /// Creates a record.
    #[must_use]
    pub fn new(filename: impl Into<String>, outline: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            outline: outline.into(),
        }
    }
}

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"(?m)^```[a-zA-Z]*\s*$").expect("static regex compiles")
    })
}

/// Strips Markdown code fences the model tends to wrap structured output in.
fn strip_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

/// Parses the structural stage's output as a JSON array of blueprint
/// records.
///
/// A malformed element is logged and dropped without affecting its
/// siblings. Text that is not a JSON array at all yields an empty list
/// (with a logged warning); a malformed plan degrades the run to zero
/// rendered files, it does not abort it.
#[must_use]
pub fn parse_blueprints(text: &str) -> Vec<BlueprintRecord> {
    let cleaned = strip_fences(text);
    let values: Vec<serde_json::Value> = match serde_json::from_str(&cleaned) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "Structural output is not a blueprint list");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping invalid blueprint record");
                None
            }
        })
        .collect()
}
