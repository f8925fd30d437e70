//! Model interaction: build one request per task and send it.
//!
//! [`ModelClient`] is the seam between the pipeline and whatever answers the
//! prompts. Two implementations ship with the crate:
//!
//! * [`OpenAiClient`] — calls an OpenAI-compatible `/chat/completions`
//!   endpoint directly with the user's key, and asks for strict JSON-schema
//!   output on the JSON tasks.
//! * [`ProviderClient`] — wraps any `edgequake_llm::LLMProvider` (Anthropic,
//!   Gemini, Ollama, …) for users who configure a provider instead of a key.
//!
//! Errors are mapped to [`TaskError`] and returned as-is. There is no retry.

use crate::config::AnalysisConfig;
use crate::error::{ActError, TaskError};
use crate::prompts::Task;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A fully rendered prompt for one task.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub task: Task,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
    /// `(name, schema)` for providers that support structured output.
    pub response_schema: Option<(&'static str, Value)>,
}

/// Raw model answer plus token usage (0 when the provider does not report it).
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Anything that can answer a [`ModelRequest`].
pub trait ModelClient: Send + Sync {
    /// Short name for logs, e.g. `openai:gpt-4o-mini`.
    fn name(&self) -> String;

    fn complete<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TaskError>>;
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
///
/// Returns the kept slice and whether anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

/// Render the request for `task` from the act text and config.
///
/// Returns the request and whether the text was truncated.
pub fn build_request(task: Task, act_text: &str, config: &AnalysisConfig) -> (ModelRequest, bool) {
    let (text, truncated) = truncate_chars(act_text, config.max_input_chars);
    if truncated {
        debug!(
            "{}: act text truncated to {} chars",
            task, config.max_input_chars
        );
    }
    let request = ModelRequest {
        task,
        system: task.system_prompt().to_string(),
        user: task.user_prompt(text),
        temperature: config.temperature_for(task),
        max_tokens: config.max_tokens,
        response_schema: task.response_schema(),
    };
    (request, truncated)
}

// ── OpenAI-compatible client ─────────────────────────────────────────────

/// Direct client for OpenAI-compatible chat completion APIs.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ActError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ActError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout_secs,
        })
    }

    /// Build from the relevant config fields.
    pub fn from_config(api_key: &str, config: &AnalysisConfig) -> Result<Self, ActError> {
        Self::new(
            api_key,
            config.base_url.as_str(),
            config.model.as_str(),
            config.api_timeout_secs,
        )
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some((name, schema)) = &request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": name, "strict": true, "schema": schema }
            });
        }
        body
    }

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, TaskError> {
        let task = request.task;
        let url = format!("{}/chat/completions", self.base_url);
        debug!("{}: POST {} model={}", task, url, self.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TaskError::Timeout {
                        task,
                        secs: self.timeout_secs,
                    }
                } else {
                    TaskError::Network {
                        task,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = response.text().await.map_err(|e| TaskError::Network {
            task,
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(classify_status(task, status, &body, retry_after_secs));
        }

        parse_completion(task, &body)
    }
}

/// Map a non-success HTTP response to the task error it stands for.
fn classify_status(
    task: Task,
    status: reqwest::StatusCode,
    body: &str,
    retry_after_secs: Option<u64>,
) -> TaskError {
    let detail = api_error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
    match status.as_u16() {
        401 | 403 => TaskError::Auth { task, detail },
        429 => TaskError::RateLimited {
            task,
            retry_after_secs,
        },
        _ => TaskError::Api {
            task,
            detail: format!("HTTP {status}: {detail}"),
        },
    }
}

impl ModelClient for OpenAiClient {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    fn complete<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TaskError>> {
        Box::pin(self.send(request))
    }
}

/// Pull `error.message` out of an OpenAI-style error body.
fn api_error_message(body: &str) -> Option<String> {
    let v: Value = serde_json::from_str(body).ok()?;
    v["error"]["message"]
        .as_str()
        .map(str::to_string)
        .or_else(|| v["error"].as_str().map(str::to_string))
}

/// Read `choices[0].message.content` and usage from a completion body.
fn parse_completion(task: Task, body: &str) -> Result<ModelResponse, TaskError> {
    let v: Value = serde_json::from_str(body).map_err(|e| TaskError::Api {
        task,
        detail: format!("invalid completion body: {e}"),
    })?;

    let message = &v["choices"][0]["message"];
    let content = match message["content"].as_str() {
        Some(c) => c.to_string(),
        None => {
            let detail = message["refusal"]
                .as_str()
                .map(|r| format!("model refused: {r}"))
                .unwrap_or_else(|| "completion has no message content".to_string());
            return Err(TaskError::Api { task, detail });
        }
    };

    Ok(ModelResponse {
        content,
        input_tokens: v["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as usize,
        output_tokens: v["usage"]["completion_tokens"].as_u64().unwrap_or(0) as usize,
    })
}

// ── edgequake-llm provider adapter ───────────────────────────────────────

/// Adapter from an edgequake-llm provider to [`ModelClient`].
///
/// The JSON schema is not forwarded; the prompt alone asks for JSON and the
/// parser copes with whatever comes back.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout_secs: u64,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout_secs,
        }
    }

    async fn send(&self, request: &ModelRequest) -> Result<ModelResponse, TaskError> {
        let task = request.task;
        let messages = vec![
            ChatMessage::system(request.system.clone()),
            ChatMessage::user(request.user.clone()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| TaskError::Timeout {
                task,
                secs: self.timeout_secs,
            })?
            .map_err(|e| classify_provider_error(task, &e.to_string()))?;

        Ok(ModelResponse {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

impl ModelClient for ProviderClient {
    fn name(&self) -> String {
        self.label.clone()
    }

    fn complete<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TaskError>> {
        Box::pin(self.send(request))
    }
}

/// Providers report errors as text; sort out the ones callers act on.
fn classify_provider_error(task: Task, message: &str) -> TaskError {
    let lower = message.to_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
        || lower.contains("api key")
    {
        TaskError::Auth {
            task,
            detail: message.to_string(),
        }
    } else if lower.contains("429") || lower.contains("rate limit") {
        TaskError::RateLimited {
            task,
            retry_after_secs: None,
        }
    } else {
        TaskError::Api {
            task,
            detail: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("abc", 3), ("abc", false));
        assert_eq!(truncate_chars("", 10), ("", false));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "§1 Société — “Act”";
        let (kept, truncated) = truncate_chars(text, 4);
        assert!(truncated);
        assert_eq!(kept, "§1 S");
        assert_eq!(kept.chars().count(), 4);
    }

    #[test]
    fn build_request_uses_task_template_and_truncates() {
        let config = AnalysisConfig::builder().max_input_chars(10).build().unwrap();
        let text = "0123456789ABCDEF";
        let (req, truncated) = build_request(Task::CheckRules, text, &config);
        assert!(truncated);
        assert!(req.user.contains("0123456789"));
        assert!(!req.user.contains("ABCDEF"));
        assert_eq!(req.temperature, 0.2);
        assert_eq!(req.max_tokens, 4096);
        assert!(req.response_schema.is_some());
        assert_eq!(req.system, Task::CheckRules.system_prompt());
    }

    #[test]
    fn request_body_includes_schema_only_for_json_tasks() {
        let client = OpenAiClient::new("sk-test", "http://localhost/v1/", "gpt-4o-mini", 5).unwrap();
        assert_eq!(client.base_url, "http://localhost/v1");
        let config = AnalysisConfig::default();

        let (summary, _) = build_request(Task::Summarize, "text", &config);
        let body = client.request_body(&summary);
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["model"], "gpt-4o-mini");

        let (sections, _) = build_request(Task::ExtractSections, "text", &config);
        let body = client.request_body(&sections);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(
            body["response_format"]["json_schema"]["name"],
            "legislative_sections"
        );
    }

    #[test]
    fn parse_completion_reads_content_and_usage() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"- point"}}],
                       "usage":{"prompt_tokens":120,"completion_tokens":30}}"#;
        let r = parse_completion(Task::Summarize, body).unwrap();
        assert_eq!(r.content, "- point");
        assert_eq!(r.input_tokens, 120);
        assert_eq!(r.output_tokens, 30);
    }

    #[test]
    fn parse_completion_reports_refusal() {
        let body = r#"{"choices":[{"message":{"content":null,"refusal":"cannot help"}}]}"#;
        let err = parse_completion(Task::CheckRules, body).unwrap_err();
        assert!(err.to_string().contains("cannot help"), "{err}");
    }

    #[test]
    fn api_error_message_extracts_openai_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            api_error_message(body).as_deref(),
            Some("Incorrect API key provided")
        );
        assert_eq!(api_error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn http_status_is_classified() {
        use reqwest::StatusCode;
        let body = r#"{"error":{"message":"Incorrect API key provided"}}"#;

        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            assert_eq!(
                classify_status(Task::Summarize, status, body, None),
                TaskError::Auth {
                    task: Task::Summarize,
                    detail: "Incorrect API key provided".into(),
                }
            );
        }

        assert_eq!(
            classify_status(Task::CheckRules, StatusCode::TOO_MANY_REQUESTS, "", Some(30)),
            TaskError::RateLimited {
                task: Task::CheckRules,
                retry_after_secs: Some(30),
            }
        );

        let err = classify_status(
            Task::ExtractSections,
            StatusCode::INTERNAL_SERVER_ERROR,
            "<html>oops</html>",
            None,
        );
        match err {
            TaskError::Api { task, detail } => {
                assert_eq!(task, Task::ExtractSections);
                assert!(detail.starts_with("HTTP 500"), "{detail}");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn provider_errors_are_classified() {
        assert!(matches!(
            classify_provider_error(Task::Summarize, "HTTP 401 Unauthorized"),
            TaskError::Auth { .. }
        ));
        assert!(matches!(
            classify_provider_error(Task::Summarize, "Rate limit reached"),
            TaskError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_provider_error(Task::Summarize, "model overloaded"),
            TaskError::Api { .. }
        ));
    }
}
