//! Configuration types for act analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. One struct for every knob makes runs easy
//! to log and compare.

use crate::error::ActError;
use crate::output::SectionKey;
use crate::pipeline::client::ModelClient;
use crate::progress::ProgressCallback;
use crate::prompts::Task;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default model for the direct OpenAI-compatible client.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for analysing an act.
///
/// # Example
/// ```rust
/// use edgequake_act::{AnalysisConfig, Task};
///
/// let config = AnalysisConfig::builder()
///     .api_key("sk-test")
///     .model("gpt-4o-mini")
///     .tasks(vec![Task::Summarize, Task::CheckRules])
///     .build()
///     .unwrap();
/// assert_eq!(config.max_input_chars, 15_000);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Model identifier. Default: `gpt-4o-mini`.
    pub model: String,

    /// API key passed straight through to the OpenAI-compatible endpoint.
    /// If `None`, the provider is resolved by name or from the environment.
    pub api_key: Option<String>,

    /// Root of the OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub base_url: String,

    /// edgequake-llm provider name (e.g. "anthropic", "gemini", "ollama").
    /// Only consulted when `api_key` is `None`.
    pub provider_name: Option<String>,

    /// Pre-constructed edgequake-llm provider. Takes precedence over
    /// `api_key` and `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model client. Takes precedence over everything else.
    pub client: Option<Arc<dyn ModelClient>>,

    /// Sampling temperature for every task. `None` uses each task's default
    /// (0.3 for the summary, 0.2 for the JSON tasks).
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Characters of act text sent to the model. Default: 15 000.
    ///
    /// Roughly 4 000 tokens of English legislation, which keeps every prompt
    /// well inside small-context models at the cost of ignoring the tail of
    /// long acts.
    pub max_input_chars: usize,

    /// Tasks to run, in pipeline order. Default: all three.
    pub tasks: Vec<Task>,

    /// Where section text that matches no marker goes. `None` discards it.
    /// Default: `Some(SectionKey::Definitions)`.
    pub fallback_section: Option<SectionKey>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Optional progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            provider_name: None,
            provider: None,
            client: None,
            temperature: None,
            max_tokens: 4096,
            max_input_chars: 15_000,
            tasks: Task::ALL.to_vec(),
            fallback_section: Some(SectionKey::Definitions),
            password: None,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("client", &self.client.as_ref().map(|_| "<dyn ModelClient>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_input_chars", &self.max_input_chars)
            .field("tasks", &self.tasks)
            .field("fallback_section", &self.fallback_section)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Temperature to use for `task`.
    pub fn temperature_for(&self, task: Task) -> f32 {
        self.temperature
            .unwrap_or_else(|| task.default_temperature())
    }

    pub fn runs(&self, task: Task) -> bool {
        self.tasks.contains(&task)
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_input_chars(mut self, n: usize) -> Self {
        self.config.max_input_chars = n;
        self
    }

    /// Select tasks. Order and duplicates are normalised to pipeline order.
    pub fn tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        let wanted: Vec<Task> = tasks.into_iter().collect();
        self.config.tasks = Task::ALL
            .into_iter()
            .filter(|t| wanted.contains(t))
            .collect();
        self
    }

    pub fn fallback_section(mut self, key: Option<SectionKey>) -> Self {
        self.config.fallback_section = key;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ActError> {
        let c = &self.config;
        if c.max_input_chars == 0 {
            return Err(ActError::InvalidConfig(
                "max_input_chars must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ActError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(ActError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.download_timeout_secs == 0 {
            return Err(ActError::InvalidConfig(
                "download_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.base_url.trim().is_empty() {
            return Err(ActError::InvalidConfig("base_url must not be empty".into()));
        }
        if c.tasks.is_empty() {
            return Err(ActError::InvalidConfig(
                "at least one task must be selected".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ActError::InvalidConfig("model must not be empty".into()));
        }
        Ok(self.config)
    }
}
