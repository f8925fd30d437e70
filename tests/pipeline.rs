//! Offline integration tests for the analysis pipeline.
//!
//! A scripted [`ModelClient`] stands in for the model, so these run without
//! network access, API keys or pdfium.

use edgequake_act::{
    analyze_document, analyze_text, write_output, AnalysisConfig, AnalysisProgressCallback,
    ExtractedDocument, ModelClient, ModelRequest, ModelResponse, RuleStatus, SectionKey, Task,
    TaskError, RULES,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const ACT: &str = "Universal Credit Act 2025\n\
1. Interpretation. In this Act \"claimant\" means a person who claims universal credit.\n\
2. Entitlement. A claimant is entitled if aged 18 or over and resident in Great Britain.\n\
3. The Secretary of State shall administer universal credit.\n\
4. Amount. The standard allowance is paid monthly in arrears.\n\
5. Penalties. A person who fails to report a change of circumstances is liable to a civil penalty.\n\
6. Records. Claimants must keep records of earnings for 12 months.";

const SUMMARY: &str = "- Establishes universal credit\n- Sets eligibility at 18+\n- Monthly payments";

const SECTIONS_JSON: &str = r#"{
  "definitions": "\"claimant\" means a person who claims universal credit",
  "obligations": "Report changes of circumstances",
  "responsibilities": "The Secretary of State administers universal credit",
  "eligibility": "Aged 18 or over and resident in Great Britain",
  "payments": "Standard allowance paid monthly in arrears",
  "penalties": "Civil penalty for failing to report changes",
  "record_keeping": "Keep records of earnings for 12 months"
}"#;

fn rules_json() -> String {
    let entries: Vec<serde_json::Value> = RULES
        .iter()
        .map(|rule| {
            serde_json::json!({
                "rule": rule,
                "status": "pass",
                "evidence": "Stated in the act",
                "confidence": 90
            })
        })
        .collect();
    serde_json::json!({ "rules": entries }).to_string()
}

/// Answers each task from a script and records every request it receives.
#[derive(Default)]
struct ScriptedClient {
    answers: HashMap<Task, Result<String, TaskError>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedClient {
    fn happy() -> Self {
        Self::default()
            .answer(Task::Summarize, SUMMARY)
            .answer(Task::ExtractSections, SECTIONS_JSON)
            .answer(Task::CheckRules, &rules_json())
    }

    fn answer(mut self, task: Task, content: &str) -> Self {
        self.answers.insert(task, Ok(content.to_string()));
        self
    }

    fn fail(mut self, task: Task, error: TaskError) -> Self {
        self.answers.insert(task, Err(error));
        self
    }

    fn tasks_seen(&self) -> Vec<Task> {
        self.requests.lock().unwrap().iter().map(|r| r.task).collect()
    }
}

impl ModelClient for ScriptedClient {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn complete<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TaskError>> {
        self.requests.lock().unwrap().push(request.clone());
        let result = match self.answers.get(&request.task) {
            Some(Ok(content)) => Ok(ModelResponse {
                content: content.clone(),
                input_tokens: 100,
                output_tokens: 20,
            }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(TaskError::Api {
                task: request.task,
                detail: "no scripted answer".into(),
            }),
        };
        Box::pin(async move { result })
    }
}

/// Route library logs to the test harness; `RUST_LOG=edgequake_act=debug`
/// shows them with `--nocapture`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_with(client: Arc<ScriptedClient>) -> AnalysisConfig {
    AnalysisConfig::builder()
        .client(client as Arc<dyn ModelClient>)
        .build()
        .unwrap()
}

fn assert_report_shape(json: &str) {
    let v: serde_json::Value = serde_json::from_str(json).unwrap();
    let top = v.as_object().unwrap();
    assert_eq!(top.len(), 3, "top-level keys: {:?}", top.keys());
    assert!(v["summary"].is_string());

    let sections = v["sections"].as_object().unwrap();
    assert_eq!(sections.len(), 7);
    for key in SectionKey::ALL {
        assert!(sections[key.as_str()].is_string(), "missing {key}");
    }

    let checks = v["rule_checks"].as_array().unwrap();
    assert_eq!(checks.len(), 6);
    for (check, rule) in checks.iter().zip(RULES) {
        assert_eq!(check["rule"], rule);
        assert!(["pass", "fail", "unclear"].contains(&check["status"].as_str().unwrap()));
        assert!(check["evidence"].is_string());
        let confidence = check["confidence"].as_u64().unwrap();
        assert!(confidence <= 100);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_produces_complete_report() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    let output = analyze_text(ACT, &config_with(Arc::clone(&client)))
        .await
        .unwrap();

    assert_eq!(
        client.tasks_seen(),
        vec![Task::Summarize, Task::ExtractSections, Task::CheckRules]
    );
    assert_eq!(output.report.summary, SUMMARY);
    assert_eq!(
        output.report.sections.eligibility,
        "Aged 18 or over and resident in Great Britain"
    );
    assert!(output
        .report
        .rule_checks
        .iter()
        .all(|c| c.status == RuleStatus::Pass && c.confidence == 90));
    assert!(output.tasks.iter().all(|t| !t.degraded && t.error.is_none()));
    assert_eq!(output.stats.tasks_run, 3);
    assert_eq!(output.stats.tasks_failed, 0);
    assert_eq!(output.stats.total_input_tokens, 300);
    assert_eq!(output.stats.total_output_tokens, 60);
    assert!(!output.document.truncated);

    assert_report_shape(&output.report.to_json_pretty().unwrap());
}

#[tokio::test]
async fn prompts_carry_the_act_text_and_task_settings() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    analyze_text(ACT, &config_with(Arc::clone(&client)))
        .await
        .unwrap();

    let requests = client.requests.lock().unwrap();
    for req in requests.iter() {
        assert!(req.user.contains("Universal Credit Act 2025"), "{}", req.task);
        assert_eq!(req.system, req.task.system_prompt());
    }
    assert_eq!(requests[0].temperature, 0.3);
    assert!(requests[0].response_schema.is_none());
    assert_eq!(requests[2].temperature, 0.2);
    assert!(requests[2].response_schema.is_some());
}

#[tokio::test]
async fn blank_text_skips_model_calls_and_degrades_report() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    let output = analyze_text("  \n\t", &config_with(Arc::clone(&client)))
        .await
        .unwrap();

    assert!(client.tasks_seen().is_empty());
    assert_eq!(output.report.summary, "");
    assert!(output.report.sections.is_empty());
    assert!(output
        .report
        .rule_checks
        .iter()
        .all(|c| c.status == RuleStatus::Unclear && c.confidence == 0));
    assert_eq!(output.stats.tasks_run, 0);
    assert_report_shape(&output.report.to_json_pretty().unwrap());
}

#[tokio::test]
async fn blank_text_needs_no_provider() {
    init_tracing();
    // No client, key or provider configured: resolution must not be attempted.
    let config = AnalysisConfig::builder()
        .provider_name("definitely-not-a-provider")
        .build()
        .unwrap();
    let output = analyze_text("", &config).await.unwrap();
    assert_eq!(output.report.rule_checks.len(), 6);
}

#[tokio::test]
async fn failed_task_does_not_stop_later_tasks() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy().fail(
        Task::Summarize,
        TaskError::Auth {
            task: Task::Summarize,
            detail: "Incorrect API key provided".into(),
        },
    ));
    let output = analyze_text(ACT, &config_with(Arc::clone(&client)))
        .await
        .unwrap();

    assert_eq!(client.tasks_seen().len(), 3);
    assert_eq!(output.report.summary, "");
    assert!(!output.report.sections.is_empty());
    assert_eq!(output.report.rule_checks[0].status, RuleStatus::Pass);

    let errors: Vec<&TaskError> = output.errors().collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], TaskError::Auth { .. }));
    assert_eq!(output.stats.tasks_failed, 1);
}

#[tokio::test]
async fn failed_rule_call_yields_six_unclear_checks() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy().fail(
        Task::CheckRules,
        TaskError::RateLimited {
            task: Task::CheckRules,
            retry_after_secs: Some(20),
        },
    ));
    let output = analyze_text(ACT, &config_with(client)).await.unwrap();

    let checks = &output.report.rule_checks;
    assert_eq!(checks.len(), 6);
    assert!(checks.iter().all(|c| c.status == RuleStatus::Unclear));
    assert!(checks[0].evidence.contains("rate limit"), "{}", checks[0].evidence);
    assert_report_shape(&output.report.to_json_pretty().unwrap());
}

#[tokio::test]
async fn malformed_responses_still_give_documented_shape() {
    init_tracing();
    let client = Arc::new(
        ScriptedClient::default()
            .answer(Task::Summarize, "")
            .answer(Task::ExtractSections, "I could not find any sections.")
            .answer(Task::CheckRules, "{\"rules\": [{\"rule\": \"Act must define"),
    );
    let output = analyze_text(ACT, &config_with(client)).await.unwrap();

    assert!(output.tasks.iter().all(|t| t.degraded));
    assert_eq!(output.stats.tasks_failed, 0);
    // Unlabelled section text lands in the default fallback.
    assert_eq!(
        output.report.sections.definitions,
        "I could not find any sections."
    );
    assert!(output
        .report
        .rule_checks
        .iter()
        .all(|c| c.status == RuleStatus::Unclear));
    assert_report_shape(&output.report.to_json_pretty().unwrap());
}

#[tokio::test]
async fn task_selection_runs_only_chosen_tasks() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    let config = AnalysisConfig::builder()
        .client(Arc::clone(&client) as Arc<dyn ModelClient>)
        .tasks([Task::CheckRules])
        .build()
        .unwrap();
    let output = analyze_text(ACT, &config).await.unwrap();

    assert_eq!(client.tasks_seen(), vec![Task::CheckRules]);
    assert_eq!(output.report.summary, "");
    assert!(output.report.sections.is_empty());
    assert_eq!(output.report.rule_checks[5].status, RuleStatus::Pass);
}

#[tokio::test]
async fn tasks_run_once_each_in_pipeline_order() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    let mut config = config_with(Arc::clone(&client));
    config.tasks = vec![Task::CheckRules, Task::Summarize, Task::CheckRules];
    let output = analyze_text(ACT, &config).await.unwrap();

    assert_eq!(client.tasks_seen(), vec![Task::Summarize, Task::CheckRules]);
    assert_eq!(output.stats.tasks_run, 2);
    assert_eq!(output.report.summary, SUMMARY);
    assert!(output.report.sections.is_empty());
}

#[tokio::test]
async fn long_text_is_truncated_before_sending() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    let config = AnalysisConfig::builder()
        .client(Arc::clone(&client) as Arc<dyn ModelClient>)
        .max_input_chars(40)
        .build()
        .unwrap();
    let output = analyze_text(ACT, &config).await.unwrap();

    assert!(output.document.truncated);
    assert_eq!(output.document.char_count, ACT.chars().count());
    let requests = client.requests.lock().unwrap();
    assert!(!requests[0].user.contains("Records."));
}

#[tokio::test]
async fn pasted_text_is_analysed_verbatim() {
    init_tracing();
    let doc = ExtractedDocument::pasted(ACT);
    assert_eq!(doc.text(), ACT);

    let client = Arc::new(ScriptedClient::happy());
    let output = analyze_document(&doc, &config_with(client)).await.unwrap();
    assert_eq!(output.document.char_count, ACT.chars().count());
    assert!(output.document.page_count.is_none());
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl AnalysisProgressCallback for EventLog {
    fn on_analysis_start(&self, total_tasks: usize, _text_chars: usize) {
        self.0.lock().unwrap().push(format!("start {total_tasks}"));
    }
    fn on_task_complete(&self, task: Task, index: usize, total: usize, _degraded: bool) {
        self.0.lock().unwrap().push(format!("ok {index}/{total} {task}"));
    }
    fn on_task_error(&self, task: Task, index: usize, total: usize, _error: &str) {
        self.0.lock().unwrap().push(format!("err {index}/{total} {task}"));
    }
    fn on_analysis_complete(&self, total_tasks: usize, failed_tasks: usize) {
        self.0
            .lock()
            .unwrap()
            .push(format!("done {total_tasks} {failed_tasks}"));
    }
}

#[tokio::test]
async fn progress_events_follow_task_order() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy().fail(
        Task::ExtractSections,
        TaskError::Timeout {
            task: Task::ExtractSections,
            secs: 60,
        },
    ));
    let log = Arc::new(EventLog::default());
    let config = AnalysisConfig::builder()
        .client(client as Arc<dyn ModelClient>)
        .progress_callback(Arc::clone(&log) as Arc<dyn AnalysisProgressCallback>)
        .build()
        .unwrap();
    analyze_text(ACT, &config).await.unwrap();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            "start 3",
            "ok 1/3 summarize",
            "err 2/3 extract_sections",
            "ok 3/3 check_rules",
            "done 3 1",
        ]
    );
}

#[tokio::test]
async fn report_written_to_file_has_documented_shape() {
    init_tracing();
    let client = Arc::new(ScriptedClient::happy());
    let output = analyze_text(ACT, &config_with(client)).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports/uc_act.json");
    write_output(&path, &output.report.to_json_pretty().unwrap())
        .await
        .unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_report_shape(&written);
    assert!(written.starts_with("{\n  \"summary\""));
}
