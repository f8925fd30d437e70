//! Progress-callback trait for per-task analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline runs each task. Callers can forward them to a
//! terminal spinner, a log, or a UI without the library knowing how.
//!
//! # Example
//!
//! ```rust
//! use edgequake_act::{AnalysisConfig, AnalysisProgressCallback, Task};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl AnalysisProgressCallback for Printer {
//!     fn on_task_start(&self, task: Task, index: usize, total: usize) {
//!         eprintln!("[{}/{}] {}", index, total, task.label());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(Printer) as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::prompts::Task;
use std::sync::Arc;

/// Called by the analysis pipeline as it runs each task.
///
/// Tasks run one at a time, but the trait is `Send + Sync` so a callback can
/// be shared with other threads (e.g. a spinner ticking in the background).
/// All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once after text extraction, before the first model call.
    ///
    /// # Arguments
    /// * `total_tasks` — number of model-backed tasks that will run
    /// * `text_chars`  — characters of extracted document text
    fn on_analysis_start(&self, total_tasks: usize, text_chars: usize) {
        let _ = (total_tasks, text_chars);
    }

    /// Called just before the request for `task` is sent.
    ///
    /// `index` is 1-based.
    fn on_task_start(&self, task: Task, index: usize, total: usize) {
        let _ = (task, index, total);
    }

    /// Called when the model answered and the response was parsed.
    ///
    /// `degraded` is true when the parser had to fall back.
    fn on_task_complete(&self, task: Task, index: usize, total: usize, degraded: bool) {
        let _ = (task, index, total, degraded);
    }

    /// Called when the model call failed. The report field stays degraded.
    fn on_task_error(&self, task: Task, index: usize, total: usize, error: &str) {
        let _ = (task, index, total, error);
    }

    /// Called once after the report is assembled.
    fn on_analysis_complete(&self, total_tasks: usize, failed_tasks: usize) {
        let _ = (total_tasks, failed_tasks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
