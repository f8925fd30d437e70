//! Data model: extracted document, report, and per-run statistics.
//!
//! [`Report`] is the user-facing JSON document and has exactly three keys:
//! `summary`, `sections`, `rule_checks`. Everything else (timings, token
//! counts, task errors) lives in [`AnalysisOutput`] so the report shape
//! never changes with run conditions.

use crate::error::TaskError;
use crate::prompts::{Task, RULES};
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Document ─────────────────────────────────────────────────────────────

/// Where the document text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentSource {
    /// Text extracted from a PDF; `name` is the path, URL or caller label.
    Pdf { name: String },
    /// Text supplied directly by the user.
    Pasted,
}

/// PDF metadata read by pdfium.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// The Document Text entity: produced once, never mutated.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    text: String,
    source: DocumentSource,
    metadata: Option<DocumentMetadata>,
}

impl ExtractedDocument {
    /// Wrap pasted text verbatim.
    pub fn pasted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: DocumentSource::Pasted,
            metadata: None,
        }
    }

    pub(crate) fn from_pdf(text: String, name: String, metadata: DocumentMetadata) -> Self {
        Self {
            text,
            source: DocumentSource::Pdf { name },
            metadata: Some(metadata),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> &DocumentSource {
        &self.source
    }

    /// PDF metadata; `None` for pasted text.
    pub fn metadata(&self) -> Option<&DocumentMetadata> {
        self.metadata.as_ref()
    }

    /// True when there is nothing but whitespace to analyse.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

// ── Sections ─────────────────────────────────────────────────────────────

/// One of the seven fixed legislative categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    Definitions,
    Obligations,
    Responsibilities,
    Eligibility,
    Payments,
    Penalties,
    RecordKeeping,
}

impl SectionKey {
    /// All keys in report order.
    pub const ALL: [SectionKey; 7] = [
        SectionKey::Definitions,
        SectionKey::Obligations,
        SectionKey::Responsibilities,
        SectionKey::Eligibility,
        SectionKey::Payments,
        SectionKey::Penalties,
        SectionKey::RecordKeeping,
    ];

    /// The JSON key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::Definitions => "definitions",
            SectionKey::Obligations => "obligations",
            SectionKey::Responsibilities => "responsibilities",
            SectionKey::Eligibility => "eligibility",
            SectionKey::Payments => "payments",
            SectionKey::Penalties => "penalties",
            SectionKey::RecordKeeping => "record_keeping",
        }
    }

    /// Map a loosely written label ("Record Keeping", "record-keeping",
    /// "Key Definitions", "PENALTIES") to a key.
    pub fn from_label(label: &str) -> Option<SectionKey> {
        let norm: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let norm = norm.trim_matches('_');
        if norm.is_empty() {
            return None;
        }
        let compact: String = norm.chars().filter(|c| *c != '_').collect();

        if compact.contains("recordkeeping") || compact.contains("reporting") {
            return Some(SectionKey::RecordKeeping);
        }
        let words: Vec<&str> = norm.split('_').filter(|w| !w.is_empty()).collect();
        let has = |stem: &str| words.iter().any(|w| w.starts_with(stem));

        if has("definition") || norm == "terms" || norm == "key_terms" {
            Some(SectionKey::Definitions)
        } else if has("obligation") {
            Some(SectionKey::Obligations)
        } else if has("responsibilit") {
            Some(SectionKey::Responsibilities)
        } else if has("eligib") {
            Some(SectionKey::Eligibility)
        } else if has("payment") || has("entitlement") {
            Some(SectionKey::Payments)
        } else if has("penalt") || has("enforcement") || has("sanction") {
            Some(SectionKey::Penalties)
        } else {
            None
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SectionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SectionKey::from_label(s).ok_or_else(|| format!("unknown section '{s}'"))
    }
}

/// The seven-key sections mapping. Fields serialise in report order and are
/// never absent; an empty string means the model found nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sections {
    pub definitions: String,
    pub obligations: String,
    pub responsibilities: String,
    pub eligibility: String,
    pub payments: String,
    pub penalties: String,
    pub record_keeping: String,
}

impl Sections {
    pub fn get(&self, key: SectionKey) -> &str {
        match key {
            SectionKey::Definitions => &self.definitions,
            SectionKey::Obligations => &self.obligations,
            SectionKey::Responsibilities => &self.responsibilities,
            SectionKey::Eligibility => &self.eligibility,
            SectionKey::Payments => &self.payments,
            SectionKey::Penalties => &self.penalties,
            SectionKey::RecordKeeping => &self.record_keeping,
        }
    }

    pub fn get_mut(&mut self, key: SectionKey) -> &mut String {
        match key {
            SectionKey::Definitions => &mut self.definitions,
            SectionKey::Obligations => &mut self.obligations,
            SectionKey::Responsibilities => &mut self.responsibilities,
            SectionKey::Eligibility => &mut self.eligibility,
            SectionKey::Payments => &mut self.payments,
            SectionKey::Penalties => &mut self.penalties,
            SectionKey::RecordKeeping => &mut self.record_keeping,
        }
    }

    /// Append `text` to a section, separated by a blank line.
    pub fn append(&mut self, key: SectionKey, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let slot = self.get_mut(key);
        if !slot.is_empty() {
            slot.push_str("\n\n");
        }
        slot.push_str(text);
    }

    pub fn is_empty(&self) -> bool {
        SectionKey::ALL.iter().all(|k| self.get(*k).is_empty())
    }
}

// ── Rule checks ──────────────────────────────────────────────────────────

/// Outcome of one rule check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Pass,
    Fail,
    Unclear,
}

impl RuleStatus {
    /// Interpret whatever the model wrote; unknown wording is `Unclear`.
    pub fn from_model(s: &str) -> RuleStatus {
        match s.trim().to_lowercase().as_str() {
            "pass" | "passed" | "yes" | "true" | "met" | "satisfied" | "compliant" => {
                RuleStatus::Pass
            }
            "fail" | "failed" | "no" | "false" | "not met" | "not satisfied"
            | "non-compliant" => RuleStatus::Fail,
            _ => RuleStatus::Unclear,
        }
    }
}

/// One entry of `rule_checks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCheck {
    pub rule: String,
    pub status: RuleStatus,
    pub evidence: String,
    /// 0–100.
    pub confidence: u8,
}

impl RuleCheck {
    /// The six fixed rules, all `unclear` with zero confidence.
    pub fn all_unclear(evidence: &str) -> Vec<RuleCheck> {
        RULES
            .iter()
            .map(|rule| RuleCheck {
                rule: (*rule).to_string(),
                status: RuleStatus::Unclear,
                evidence: evidence.to_string(),
                confidence: 0,
            })
            .collect()
    }
}

// ── Report ───────────────────────────────────────────────────────────────

/// The downloadable analysis report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub summary: String,
    pub sections: Sections,
    pub rule_checks: Vec<RuleCheck>,
}

impl Report {
    /// Pretty JSON with two-space indentation.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ── Run output ───────────────────────────────────────────────────────────

/// Result of one model-backed task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: Task,
    pub duration_ms: u64,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Characters in the raw model response.
    pub response_chars: usize,
    /// True when the parser had to fall back (unparseable or partial output).
    pub degraded: bool,
    /// `Some` when the model call itself failed.
    pub error: Option<TaskError>,
}

/// Document facts reported alongside the analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub source: DocumentSource,
    pub char_count: usize,
    /// True when the text sent to the model was cut to `max_input_chars`.
    pub truncated: bool,
    pub page_count: Option<usize>,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Aggregate statistics for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub tasks_run: usize,
    pub tasks_failed: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// Everything a run produced: the report plus run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub report: Report,
    pub document: DocumentInfo,
    pub tasks: Vec<TaskOutcome>,
    pub stats: AnalysisStats,
}

impl AnalysisOutput {
    /// Task errors in pipeline order.
    pub fn errors(&self) -> impl Iterator<Item = &TaskError> {
        self.tasks.iter().filter_map(|t| t.error.as_ref())
    }
}
