//! # edgequake-act
//!
//! Analyse legislative acts with a large language model and get a structured
//! JSON report back: a bullet summary, seven extracted sections, and six
//! rule checks.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / URL / pasted text
//!  │
//!  ├─ 1. Extract    page text layer via pdfium (spawn_blocking); pasted text as-is
//!  ├─ 2. Summarize  5–10 bullet points
//!  ├─ 3. Sections   definitions, obligations, … record_keeping
//!  ├─ 4. Rules      six pass / fail / unclear checks with evidence
//!  └─ 5. Report     { summary, sections, rule_checks }
//! ```
//!
//! Steps 2–4 run one after another. A failed model call never aborts the
//! run: its part of the report is left empty (or `unclear`) and the error is
//! recorded in [`AnalysisOutput::tasks`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_act::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::builder()
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let output = analyze("universal_credit_act_2025.pdf", &config).await?;
//!     println!("{}", output.report.to_json_pretty()?);
//!     for error in output.errors() {
//!         eprintln!("warning: {error}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `act2json` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-act = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_document, analyze_sync, analyze_text, analyze_to_file, extract_pdf_bytes,
    extract_text, inspect, resolve_client, run_task, write_output, TaskRun, TaskValue,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use error::{ActError, TaskError};
pub use output::{
    AnalysisOutput, AnalysisStats, DocumentInfo, DocumentMetadata, DocumentSource,
    ExtractedDocument, Report, RuleCheck, RuleStatus, SectionKey, Sections, TaskOutcome,
};
pub use pipeline::assemble::assemble_report;
pub use pipeline::client::{ModelClient, ModelRequest, ModelResponse, OpenAiClient, ProviderClient};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::{Task, RULES};
