//! Draft analysis results: normalized shape, side-file cache, and the text
//! report shown to users.
//!
//! The analyzer keys issues by `(text, code)` and lists the affected layer
//! objects. That shape does not serialize cleanly and is awkward to report,
//! so it is flattened into ordered `{text, code, layers}` records per
//! severity before it is cached or shown.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::{RawAnalysis, RawIssue};

/// One analyzer finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub text: String,
    pub code: i64,
    pub layers: Vec<String>,
}

/// Normalized analysis result, as cached in `<base>.issues.json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisReport {
    pub messages: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub errors: Vec<Issue>,
}

impl AnalysisReport {
    pub fn from_raw(raw: RawAnalysis) -> Self {
        AnalysisReport {
            messages: normalize(raw.messages),
            warnings: normalize(raw.warnings),
            errors: normalize(raw.errors),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn sections(&self) -> [(&'static str, &[Issue]); 3] {
        [
            ("MESSAGES", self.messages.as_slice()),
            ("WARNINGS", self.warnings.as_slice()),
            ("ERRORS", self.errors.as_slice()),
        ]
    }

    /// All non-empty severities as an indented text report.
    pub fn describe(&self) -> String {
        let mut text = String::new();
        for (title, issues) in self.sections() {
            if issues.is_empty() {
                continue;
            }
            text.push_str(title);
            text.push_str(":\n");
            for issue in issues {
                text.push_str(&format!("  {} (code {})\n", issue.text, issue.code));
                if !issue.layers.is_empty() {
                    text.push_str(&format!(
                        "    applies to layers: {}\n",
                        issue.layers.join(",")
                    ));
                }
            }
        }
        text
    }

    /// Only the `ERRORS` section, without its heading.
    pub fn describe_errors(&self) -> String {
        AnalysisReport {
            errors: self.errors.clone(),
            ..Default::default()
        }
        .describe()
        .trim_start_matches("ERRORS:\n")
        .to_string()
    }

    /// Load a cached report. A missing or unreadable cache is `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(report) => {
                debug!(path = %path.display(), "[ANALYSIS] Loaded cached analysis results");
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Unable to parse the cached analysis results");
                None
            }
        }
    }

    /// Write the cache. Failure only costs a re-analysis later, so it is
    /// logged and swallowed.
    pub fn store(&self, path: &Path) {
        let json = match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Unable to serialize the analysis results");
                return;
            }
        };
        match fs::write(path, json) {
            Ok(()) => debug!(path = %path.display(), "[ANALYSIS] Cached analysis results"),
            Err(e) => warn!(error = %e, path = %path.display(), "Unable to cache the analysis results"),
        }
    }
}

/// Flatten raw entries in order of first appearance; a repeated key adds its
/// layers to the earlier record.
fn normalize(raw: Vec<RawIssue>) -> Vec<Issue> {
    let mut issues: Vec<Issue> = Vec::with_capacity(raw.len());
    for RawIssue { key: (text, code), layers } in raw {
        let layer_names = layers
            .into_iter()
            .map(|layer| layer.long_name.unwrap_or(layer.name));
        match issues
            .iter_mut()
            .find(|issue| issue.text == text && issue.code == code)
        {
            Some(existing) => {
                for name in layer_names {
                    if !existing.layers.contains(&name) {
                        existing.layers.push(name);
                    }
                }
            }
            None => issues.push(Issue {
                text,
                code,
                layers: layer_names.collect(),
            }),
        }
    }
    issues
}
