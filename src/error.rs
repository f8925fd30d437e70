//! Error types for the edgequake-act library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ActError`] — **Fatal**: the analysis cannot proceed at all (bad input
//!   file, empty PDF, no model configured). Returned as `Err(ActError)` from
//!   the top-level `analyze*` and `extract*` functions.
//!
//! * [`TaskError`] — **Non-fatal**: a single model call failed (bad key,
//!   rate limit, network). Stored inside [`crate::output::TaskOutcome`]; the
//!   matching report field is left degraded and the next task still runs.
//!
//! Nothing is retried automatically. Callers decide whether to re-run a task.

use crate::prompts::Task;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-act library.
#[derive(Debug, Error)]
pub enum ActError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input is not a valid PDF: '{source_name}'\nFirst bytes: {magic:?}")]
    NotAPdf { source_name: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{source_name}' is corrupt: {detail}")]
    CorruptPdf { source_name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{source_name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { source_name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{source_name}'")]
    WrongPassword { source_name: String },

    /// The PDF opened fine but no page yielded any text (scanned image, etc.).
    #[error("No extractable text found in '{source_name}' ({pages} pages).\nScanned documents need OCR before analysis.")]
    EmptyDocument { source_name: String, pages: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Text extraction failed for page {page}: {detail}")]
    ExtractionFailed { page: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// No model client could be built (missing API key, unknown provider).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Text extraction from PDF needs the pdfium shared library. You can:\n\
  • Install libpdfium system-wide, or\n\
  • Set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium, or\n\
  • Pass the act as plain text with --text / --stdin.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single model-backed task.
///
/// Provider messages are kept verbatim in `detail` so the user sees exactly
/// what the service said.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskError {
    /// 401/403 from the provider: bad or revoked key.
    #[error("{task}: authentication rejected by provider: {detail}")]
    Auth { task: Task, detail: String },

    /// 429 from the provider.
    #[error("{task}: rate limit exceeded{}", retry_hint(*retry_after_secs))]
    RateLimited {
        task: Task,
        retry_after_secs: Option<u64>,
    },

    /// The call did not finish within `api_timeout_secs`.
    #[error("{task}: model call timed out after {secs}s")]
    Timeout { task: Task, secs: u64 },

    /// Any other error status or provider-reported failure.
    #[error("{task}: model API error: {detail}")]
    Api { task: Task, detail: String },

    /// Connection-level failure before a response was received.
    #[error("{task}: network error: {detail}")]
    Network { task: Task, detail: String },
}

impl TaskError {
    /// The task whose call failed.
    pub fn task(&self) -> Task {
        match self {
            TaskError::Auth { task, .. }
            | TaskError::RateLimited { task, .. }
            | TaskError::Timeout { task, .. }
            | TaskError::Api { task, .. }
            | TaskError::Network { task, .. } => *task,
        }
    }
}

fn retry_hint(retry_after_secs: Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(" (retry after {secs}s)"),
        None => String::new(),
    }
}
