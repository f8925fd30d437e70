//! Prompt templates for the model-backed analysis tasks.
//!
//! Every prompt, rule description and JSON schema lives here so a wording
//! change touches exactly one file, and unit tests can inspect prompts
//! without a live model.
//!
//! The act text is spliced into each user template after truncation to
//! [`crate::config::AnalysisConfig::max_input_chars`].

use crate::output::SectionKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// The fixed compliance rules, in report order.
pub const RULES: [&str; 6] = [
    "Act must define key terms",
    "Act must specify eligibility criteria",
    "Act must specify responsibilities of the administering authority",
    "Act must include enforcement or penalties",
    "Act must include payment calculation or entitlement structure",
    "Act must include record-keeping or reporting requirements",
];

/// A model-backed analysis task.
///
/// Text extraction is the first stage of the pipeline but never reaches the
/// model, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// 5–10 bullet point summary of the act.
    Summarize,
    /// The seven legislative sections as a JSON object.
    ExtractSections,
    /// The six compliance rule checks as a JSON array.
    CheckRules,
}

impl Task {
    /// All tasks in pipeline order.
    pub const ALL: [Task; 3] = [Task::Summarize, Task::ExtractSections, Task::CheckRules];

    /// Stable snake_case name used in logs, JSON and `--tasks`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Summarize => "summarize",
            Task::ExtractSections => "extract_sections",
            Task::CheckRules => "check_rules",
        }
    }

    /// Human label for progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Task::Summarize => "Summarising act",
            Task::ExtractSections => "Extracting legislative sections",
            Task::CheckRules => "Checking compliance rules",
        }
    }

    /// Sampling temperature used when the config does not override it.
    pub fn default_temperature(&self) -> f32 {
        match self {
            Task::Summarize => 0.3,
            Task::ExtractSections | Task::CheckRules => 0.2,
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Task::Summarize => SUMMARY_SYSTEM_PROMPT,
            Task::ExtractSections => SECTIONS_SYSTEM_PROMPT,
            Task::CheckRules => RULES_SYSTEM_PROMPT,
        }
    }

    /// Render the user prompt with `act_text` spliced in.
    pub fn user_prompt(&self, act_text: &str) -> String {
        match self {
            Task::Summarize => summary_prompt(act_text),
            Task::ExtractSections => sections_prompt(act_text),
            Task::CheckRules => rules_prompt(act_text),
        }
    }

    /// Structured-output schema as `(name, schema)`, for JSON tasks only.
    pub fn response_schema(&self) -> Option<(&'static str, Value)> {
        match self {
            Task::Summarize => None,
            Task::ExtractSections => Some(("legislative_sections", sections_schema())),
            Task::CheckRules => Some(("rule_checks", rules_schema())),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Task {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "summary" | "summarize" | "summarise" => Ok(Task::Summarize),
            "sections" | "extract_sections" => Ok(Task::ExtractSections),
            "rules" | "check_rules" | "rule_checks" => Ok(Task::CheckRules),
            other => Err(format!(
                "unknown task '{other}' (expected summary, sections or rules)"
            )),
        }
    }
}

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a legal document analyst. Provide clear, concise summaries of legislative documents.";

pub const SECTIONS_SYSTEM_PROMPT: &str = "You are a legal document analyst. Extract structured information and return ONLY valid JSON matching the exact schema.";

pub const RULES_SYSTEM_PROMPT: &str = "You are a legal compliance checker. Analyze documents and return structured rule checks in JSON format matching the exact schema.";

/// What the model is asked to pull out for each section key.
pub fn section_instruction(key: SectionKey) -> &'static str {
    match key {
        SectionKey::Definitions => "Extract all key definitions and terms",
        SectionKey::Obligations => "Extract all obligations mentioned in the Act",
        SectionKey::Responsibilities => {
            "Extract responsibilities of the administering authority"
        }
        SectionKey::Eligibility => "Extract eligibility criteria",
        SectionKey::Payments => {
            "Extract payment calculations, entitlements, and payment structures"
        }
        SectionKey::Penalties => "Extract penalties and enforcement mechanisms",
        SectionKey::RecordKeeping => "Extract record-keeping and reporting requirements",
    }
}

fn summary_prompt(act_text: &str) -> String {
    format!(
        "Summarize the following Act in 5-10 bullet points focusing on:
- Purpose
- Key definitions
- Eligibility
- Obligations
- Enforcement elements

Act text:
{act_text}

Provide a clear, structured summary with bullet points."
    )
}

fn sections_prompt(act_text: &str) -> String {
    let fields: String = SectionKey::ALL
        .iter()
        .map(|k| format!("- {}: {}\n", k.as_str(), section_instruction(*k)))
        .collect();
    format!(
        "Extract the following key sections from the Act and return a valid JSON object:

{fields}
Act text:
{act_text}

Return ONLY the JSON object matching the required schema, no additional text."
    )
}

fn rules_prompt(act_text: &str) -> String {
    format!(
        "For each of the following rules, check if the Act satisfies it. For each rule, provide:
1. status: \"pass\" or \"fail\"
2. evidence: The specific section, clause, or text that supports your answer
3. confidence: A number between 0-100 indicating your confidence level

Rules to check:
{rules}

Act text:
{act_text}

Return a JSON object with a \"rules\" key containing an array with the exact structure specified in the schema.",
        rules = numbered_rules()
    )
}

/// The rule list as `1. …` lines.
pub fn numbered_rules() -> String {
    RULES
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}", i + 1, r))
        .collect::<Vec<_>>()
        .join("\n")
}

fn sections_schema() -> Value {
    let mut properties = serde_json::Map::new();
    for key in SectionKey::ALL {
        properties.insert(
            key.as_str().to_string(),
            json!({ "type": "string", "description": section_instruction(key) }),
        );
    }
    let required: Vec<&str> = SectionKey::ALL.iter().map(|k| k.as_str()).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn rules_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "rules": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "rule": { "type": "string", "description": "The rule being checked" },
                        "status": {
                            "type": "string",
                            "enum": ["pass", "fail"],
                            "description": "Whether the rule passes or fails"
                        },
                        "evidence": {
                            "type": "string",
                            "description": "The specific section, clause, or text that supports the answer"
                        },
                        "confidence": {
                            "type": "integer",
                            "description": "Confidence level between 0-100"
                        }
                    },
                    "required": ["rule", "status", "evidence", "confidence"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["rules"],
        "additionalProperties": false
    })
}
