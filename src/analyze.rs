//! Analysis entry points: extract the act text, run the model tasks one after
//! another, and assemble the report.
//!
//! ## Failure model
//!
//! Input problems (missing file, corrupt PDF, no provider) are fatal and come
//! back as [`ActError`]. A failed model call is not: it is recorded as a
//! [`TaskError`] in the task's [`TaskOutcome`], the affected report field is
//! degraded, and the remaining tasks still run.

use crate::config::AnalysisConfig;
use crate::error::{ActError, TaskError};
use crate::output::{
    AnalysisOutput, AnalysisStats, DocumentInfo, DocumentMetadata, ExtractedDocument, Report,
    RuleCheck, Sections, TaskOutcome,
};
use crate::pipeline::assemble::assemble_report;
use crate::pipeline::client::{build_request, ModelClient, OpenAiClient, ProviderClient};
use crate::pipeline::{extract, input, parse};
use crate::prompts::Task;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Parsed value produced by one model-backed task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    Summary(String),
    Sections(Sections),
    RuleChecks(Vec<RuleCheck>),
}

/// Everything [`run_task`] learned from one model call.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub outcome: TaskOutcome,
    /// `None` when the call failed.
    pub value: Option<TaskValue>,
    /// True when the act text was cut to `max_input_chars` for this call.
    pub truncated: bool,
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Extract the text of a PDF file or URL.
///
/// Does not require an LLM provider or API key.
pub async fn extract_text(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<ExtractedDocument, ActError> {
    let input_str = input_str.as_ref();
    info!("Extracting text: {}", input_str);
    let pdf = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let doc = extract::extract_pdf(pdf, config.password.clone()).await?;
    info!("Extracted {} chars", doc.char_count());
    Ok(doc)
}

/// Extract the text of PDF bytes already in memory.
///
/// `name` labels the document in errors and in [`DocumentInfo::source`].
pub async fn extract_pdf_bytes(
    bytes: &[u8],
    name: impl Into<String>,
    config: &AnalysisConfig,
) -> Result<ExtractedDocument, ActError> {
    let name = name.into();
    input::check_pdf_magic(&name, bytes)?;
    let pdf = input::PdfInput {
        name,
        bytes: bytes.to_vec(),
    };
    extract::extract_pdf(pdf, config.password.clone()).await
}

/// Read PDF metadata without extracting text or calling a model.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<DocumentMetadata, ActError> {
    let pdf = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    extract::read_metadata(pdf, config.password.clone()).await
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// Analyse a PDF file or URL.
///
/// # Returns
/// `Ok(AnalysisOutput)` whenever text was extracted, even if some model
/// calls failed (see [`AnalysisOutput::errors`]).
///
/// # Errors
/// Returns `Err(ActError)` only for fatal errors:
/// - File not found / permission denied / download failure
/// - Not a valid PDF, encrypted without password, or no text layer
/// - No model client could be configured
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ActError> {
    let doc = extract_text(input_str, config).await?;
    analyze_document(&doc, config).await
}

/// Analyse pasted act text. The text is used verbatim.
pub async fn analyze_text(
    text: impl Into<String>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ActError> {
    let doc = ExtractedDocument::pasted(text);
    analyze_document(&doc, config).await
}

/// Run the selected tasks against an extracted document and assemble the
/// report.
///
/// Blank documents skip every model call (and client resolution), giving
/// a report with an empty summary, empty sections and six `unclear` checks.
pub async fn analyze_document(
    doc: &ExtractedDocument,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ActError> {
    let total_start = Instant::now();
    let char_count = doc.char_count();
    let mut runs: Vec<TaskRun> = Vec::new();

    if doc.is_blank() {
        warn!("Document text is empty, skipping model calls");
        if let Some(ref cb) = config.progress_callback {
            cb.on_analysis_start(0, char_count);
        }
    } else {
        let client = resolve_client(config).await?;
        let selected: Vec<Task> = Task::ALL.into_iter().filter(|t| config.runs(*t)).collect();
        let total = selected.len();
        info!(
            "Analysing {} chars with {} ({} tasks)",
            char_count,
            client.name(),
            total
        );

        if let Some(ref cb) = config.progress_callback {
            cb.on_analysis_start(total, char_count);
        }

        // Strictly sequential, in pipeline order: each task starts after the
        // previous returns.
        for (i, task) in selected.into_iter().enumerate() {
            let index = i + 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_task_start(task, index, total);
            }
            let run = run_task(client.as_ref(), task, doc.text(), config).await;
            if let Some(ref cb) = config.progress_callback {
                match &run.outcome.error {
                    None => cb.on_task_complete(task, index, total, run.outcome.degraded),
                    Some(e) => cb.on_task_error(task, index, total, &e.to_string()),
                }
            }
            runs.push(run);
        }
    }

    let truncated = runs.iter().any(|r| r.truncated);
    let tasks: Vec<TaskOutcome> = runs.iter().map(|r| r.outcome.clone()).collect();
    let report = report_from_runs(runs);

    let failed = tasks.iter().filter(|t| t.error.is_some()).count();
    let stats = AnalysisStats {
        tasks_run: tasks.len(),
        tasks_failed: failed,
        total_input_tokens: tasks.iter().map(|t| t.input_tokens as u64).sum(),
        total_output_tokens: tasks.iter().map(|t| t.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Analysis complete: {}/{} tasks succeeded, {}ms total",
        stats.tasks_run - failed,
        stats.tasks_run,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_analysis_complete(stats.tasks_run, failed);
    }

    let metadata = doc.metadata();
    Ok(AnalysisOutput {
        report,
        document: DocumentInfo {
            source: doc.source().clone(),
            char_count,
            truncated,
            page_count: metadata.map(|m| m.page_count),
            title: metadata.and_then(|m| m.title.clone()),
            author: metadata.and_then(|m| m.author.clone()),
        },
        tasks,
        stats,
    })
}

/// Run one model-backed task: render the prompt, call the model, parse.
///
/// Never fails: a model error is returned inside the outcome.
pub async fn run_task(
    client: &dyn ModelClient,
    task: Task,
    act_text: &str,
    config: &AnalysisConfig,
) -> TaskRun {
    let start = Instant::now();
    let (request, truncated) = build_request(task, act_text, config);
    let result = client.complete(&request).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(response) => {
            debug!(
                "{}: {} in / {} out tokens, {} chars, {}ms",
                task,
                response.input_tokens,
                response.output_tokens,
                response.content.len(),
                duration_ms
            );
            let (value, degraded) = parse_response(task, &response.content, config);
            if degraded {
                warn!("{}: model output only partly parsed", task);
            }
            TaskRun {
                outcome: TaskOutcome {
                    task,
                    duration_ms,
                    input_tokens: response.input_tokens,
                    output_tokens: response.output_tokens,
                    response_chars: response.content.chars().count(),
                    degraded,
                    error: None,
                },
                value: Some(value),
                truncated,
            }
        }
        Err(e) => {
            warn!("{}", e);
            TaskRun {
                outcome: TaskOutcome {
                    task,
                    duration_ms,
                    input_tokens: 0,
                    output_tokens: 0,
                    response_chars: 0,
                    degraded: true,
                    error: Some(e),
                },
                value: None,
                truncated,
            }
        }
    }
}

/// Write `contents` to `path` atomically (temp file + rename), creating
/// parent directories as needed.
pub async fn write_output(path: impl AsRef<Path>, contents: &str) -> Result<(), ActError> {
    let path = path.as_ref();
    let write_err = |e: std::io::Error| ActError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Analyse a PDF and write the report JSON to a file.
pub async fn analyze_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisStats, ActError> {
    let output = analyze(input_str, config).await?;
    let json = output
        .report
        .to_json_pretty()
        .map_err(|e| ActError::Internal(format!("Report serialisation failed: {e}")))?;
    write_output(output_path, &json).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ActError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ActError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(input_str, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn parse_response(task: Task, raw: &str, config: &AnalysisConfig) -> (TaskValue, bool) {
    match task {
        Task::Summarize => {
            let summary = parse::parse_summary(raw);
            let empty = summary.trim().is_empty();
            (TaskValue::Summary(summary), empty)
        }
        Task::ExtractSections => {
            let parsed = parse::parse_sections(raw, config.fallback_section);
            (TaskValue::Sections(parsed.value), parsed.degraded)
        }
        Task::CheckRules => {
            let parsed = parse::parse_rule_checks(raw);
            (TaskValue::RuleChecks(parsed.value), parsed.degraded)
        }
    }
}

/// Fold task runs into the report, degrading whatever is missing.
fn report_from_runs(runs: Vec<TaskRun>) -> Report {
    let mut summary = None;
    let mut sections = None;
    let mut rule_checks = None;

    for run in runs {
        match (run.value, run.outcome.error) {
            (Some(TaskValue::Summary(s)), _) => summary = Some(s),
            (Some(TaskValue::Sections(s)), _) => sections = Some(s),
            (Some(TaskValue::RuleChecks(c)), _) => rule_checks = Some(c),
            (None, Some(e)) if run.outcome.task == Task::CheckRules => {
                rule_checks = Some(RuleCheck::all_unclear(&failed_evidence(&e)));
            }
            (None, _) => {}
        }
    }

    assemble_report(summary, sections, rule_checks)
}

fn failed_evidence(error: &TaskError) -> String {
    format!("Model call failed: {error}")
}

/// Build a provider adapter via edgequake-llm's factory.
fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ActError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ActError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn wrap_provider(
    provider: Arc<dyn LLMProvider>,
    label: String,
    config: &AnalysisConfig,
) -> Arc<dyn ModelClient> {
    Arc::new(ProviderClient::new(provider, label, config.api_timeout_secs))
}

/// Resolve the model client, from most-specific to least-specific.
///
/// 1. **Pre-built client** (`config.client`), used as-is. Tests plug in a
///    scripted client here.
/// 2. **Pre-built provider** (`config.provider`), wrapped in a
///    [`ProviderClient`].
/// 3. **API key** (`config.api_key`): the key goes straight to the
///    OpenAI-compatible endpoint at `config.base_url`.
/// 4. **Named provider** (`config.provider_name`): created by
///    [`ProviderFactory::create_llm_provider`], which reads that provider's
///    key from the environment.
/// 5. **`OPENAI_API_KEY`** in the environment, used like an explicit key.
/// 6. **Auto-detection** via [`ProviderFactory::from_env`].
pub async fn resolve_client(config: &AnalysisConfig) -> Result<Arc<dyn ModelClient>, ActError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref provider) = config.provider {
        return Ok(wrap_provider(
            Arc::clone(provider),
            format!("provider:{}", config.model),
            config,
        ));
    }

    if let Some(key) = config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        return Ok(Arc::new(OpenAiClient::from_config(key, config)?));
    }

    if let Some(ref name) = config.provider_name {
        let provider = create_provider(name, &config.model)?;
        return Ok(wrap_provider(
            provider,
            format!("{}:{}", name, config.model),
            config,
        ));
    }

    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.trim().is_empty() {
            debug!("Using OPENAI_API_KEY from environment");
            return Ok(Arc::new(OpenAiClient::from_config(&key, config)?));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ActError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No API key was supplied and no LLM provider could be auto-detected.\n\
                Pass --api-key, set OPENAI_API_KEY, or choose a provider with --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(wrap_provider(
        llm_provider,
        "auto".to_string(),
        config,
    ))
}
