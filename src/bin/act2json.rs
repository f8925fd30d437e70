//! CLI binary for edgequake-act.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` and prints the report.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use edgequake_act::{
    analyze, analyze_text, extract_text, inspect, write_output, AnalysisConfig,
    AnalysisOutput, AnalysisProgressCallback, ProgressCallback, SectionKey, Task, DEFAULT_BASE_URL,
    DEFAULT_MODEL,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner line while a task runs, one log line per
/// finished task.
struct CliProgressCallback {
    bar: ProgressBar,
    task_start: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading act…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            task_start: Mutex::new(None),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.task_start
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_tasks: usize, text_chars: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:30.green/238}] {pos}/{len}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_tasks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analysing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {text_chars} chars of act text…"))
        ));
    }

    fn on_task_start(&self, task: Task, _index: usize, _total: usize) {
        if let Ok(mut t) = self.task_start.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(task.label());
    }

    fn on_task_complete(&self, task: Task, _index: usize, _total: usize, degraded: bool) {
        let mark = if degraded { cyan("⚠") } else { green("✓") };
        let note = if degraded { "  partly parsed" } else { "" };
        self.bar.println(format!(
            "  {} {:<32} {}{}",
            mark,
            task.label(),
            dim(&format!("{:.1}s", self.elapsed_secs())),
            dim(note),
        ));
        self.bar.inc(1);
    }

    fn on_task_error(&self, task: Task, _index: usize, _total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:<32} {}  {}",
            red("✗"),
            task.label(),
            red(&msg),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
        self.bar.inc(1);
    }

    fn on_analysis_complete(&self, total_tasks: usize, failed_tasks: usize) {
        self.bar.finish_and_clear();
        if failed_tasks == 0 {
            eprintln!(
                "{} {} tasks completed",
                green("✔"),
                bold(&total_tasks.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} tasks completed  ({} failed)",
                if failed_tasks == total_tasks {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&(total_tasks - failed_tasks).to_string()),
                total_tasks,
                red(&failed_tasks.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a PDF, report to stdout
  act2json universal_credit_act_2025.pdf

  # Write the report to a file
  act2json act.pdf -o report.json

  # Analyse pasted text
  act2json --text "1. Interpretation. In this Act ..."
  pbpaste | act2json --stdin

  # Only the rule checks
  act2json act.pdf --tasks rules

  # Print the extracted text and stop (no API key needed)
  act2json --extract-only act.pdf

  # PDF metadata only (no API key needed)
  act2json --inspect-only act.pdf

  # Report plus timings, token counts and task errors
  act2json --full act.pdf

  # Another provider through edgequake-llm
  act2json --provider anthropic --model claude-sonnet-4-20250514 act.pdf

  # A local OpenAI-compatible server
  act2json --base-url http://localhost:11434/v1 --api-key ollama --model llama3.1 act.pdf

REPORT SHAPE:
  {
    "summary":     "- bullet\n- bullet ...",
    "sections":    { "definitions", "obligations", "responsibilities",
                     "eligibility", "payments", "penalties", "record_keeping" },
    "rule_checks": [ { "rule", "status": pass|fail|unclear, "evidence",
                       "confidence": 0-100 } x 6 ]
  }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          API key sent to --base-url (same as --api-key)
  ANTHROPIC_API_KEY       Used with --provider anthropic or auto-detection
  GEMINI_API_KEY          Used with --provider gemini or auto-detection
  ACT2JSON_*              Every flag, e.g. ACT2JSON_MODEL, ACT2JSON_TASKS
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Overrides the log filter

Model calls that fail are reported on stderr; the report is still produced
with the affected fields left empty or "unclear", and the exit code is 0.
"#;

/// Analyse legislative acts into a JSON report using an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "act2json",
    version,
    about = "Analyse legislative acts (PDF or text) into a JSON report using an LLM",
    long_about = "Extract the text of a legislative act from a PDF file, URL or pasted text, \
then ask a language model for a bullet summary, seven legislative sections and six compliance \
rule checks. Prints one JSON report.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP,
    group(ArgGroup::new("source").required(true).args(["input", "text", "stdin"]))
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: Option<String>,

    /// Analyse this text instead of a PDF.
    #[arg(long, env = "ACT2JSON_TEXT", hide_env_values = true)]
    text: Option<String>,

    /// Read the act text from stdin.
    #[arg(long)]
    stdin: bool,

    /// Write the JSON to this file instead of stdout.
    #[arg(short, long, env = "ACT2JSON_OUTPUT")]
    output: Option<PathBuf>,

    /// Tasks to run: summary, sections, rules (comma-separated).
    #[arg(
        long,
        env = "ACT2JSON_TASKS",
        value_delimiter = ',',
        default_value = "summary,sections,rules"
    )]
    tasks: Vec<Task>,

    /// Print the extracted text and exit.
    #[arg(long, conflicts_with = "inspect_only")]
    extract_only: bool,

    /// Print PDF metadata only, no analysis.
    #[arg(long)]
    inspect_only: bool,

    /// Print the full analysis output (report, document info, per-task stats).
    #[arg(long, env = "ACT2JSON_FULL")]
    full: bool,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "ACT2JSON_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, …).
    /// Takes precedence over --api-key.
    #[arg(long, env = "ACT2JSON_PROVIDER")]
    provider: Option<String>,

    /// Root of the OpenAI-compatible API.
    #[arg(long, env = "ACT2JSON_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Max output tokens per model call.
    #[arg(long, env = "ACT2JSON_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Temperature for every task (0.0–2.0). Default: 0.3 summary, 0.2 JSON tasks.
    #[arg(long, env = "ACT2JSON_TEMPERATURE")]
    temperature: Option<f32>,

    /// Characters of act text sent to the model.
    #[arg(long, env = "ACT2JSON_MAX_INPUT_CHARS", default_value_t = 15_000)]
    max_input_chars: usize,

    /// Section that receives unlabelled text, or "none" to drop it.
    #[arg(long, env = "ACT2JSON_FALLBACK_SECTION", default_value = "definitions")]
    fallback_section: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "ACT2JSON_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "ACT2JSON_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "ACT2JSON_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Disable the progress display.
    #[arg(long, env = "ACT2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ACT2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the report.
    #[arg(short, long, env = "ACT2JSON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display replaces INFO logs; -v brings them all back.
    let show_progress =
        !cli.quiet && !cli.no_progress && !cli.extract_only && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let Some(ref input) = cli.input else {
            anyhow::bail!("--inspect-only needs a PDF path or URL");
        };
        let meta = inspect(input, &config)
            .await
            .context("Failed to inspect PDF")?;
        println!("File:         {}", input);
        if let Some(ref t) = meta.title {
            println!("Title:        {}", t);
        }
        if let Some(ref a) = meta.author {
            println!("Author:       {}", a);
        }
        if let Some(ref s) = meta.subject {
            println!("Subject:      {}", s);
        }
        println!("Pages:        {}", meta.page_count);
        println!("PDF Version:  {}", meta.pdf_version);
        if let Some(ref p) = meta.producer {
            println!("Producer:     {}", p);
        }
        if let Some(ref c) = meta.creator {
            println!("Creator:      {}", c);
        }
        return Ok(());
    }

    let pasted = read_pasted_text(&cli)?;

    // ── Extract-only mode ────────────────────────────────────────────────
    if cli.extract_only {
        let text = match (&pasted, &cli.input) {
            (Some(text), _) => text.clone(),
            (None, Some(input)) => extract_text(input, &config)
                .await
                .context("Text extraction failed")?
                .text()
                .to_string(),
            (None, None) => String::new(),
        };
        emit(&cli, &text).await?;
        return Ok(());
    }

    // ── Run analysis ─────────────────────────────────────────────────────
    let output = match (pasted, &cli.input) {
        (Some(text), _) => analyze_text(text, &config).await,
        (None, Some(input)) => analyze(input, &config).await,
        (None, None) => anyhow::bail!("Provide a PDF path or URL, --text, or --stdin"),
    }
    .context("Analysis failed")?;

    let json = if cli.full {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output
            .report
            .to_json_pretty()
            .context("Failed to serialise report")?
    };
    emit(&cli, &json).await?;

    report_task_errors(&cli, &output, show_progress);
    Ok(())
}

/// Write `contents` to `--output` or stdout.
async fn emit(cli: &Cli, contents: &str) -> Result<()> {
    if let Some(ref path) = cli.output {
        write_output(path, contents)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(contents.as_bytes())
            .context("Failed to write to stdout")?;
        if !contents.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }
    Ok(())
}

/// Task errors go to stderr; the report was still produced.
fn report_task_errors(cli: &Cli, output: &AnalysisOutput, show_progress: bool) {
    // The progress display already printed each failure.
    if !show_progress {
        for error in output.errors() {
            eprintln!("{} {}", red("✗"), error);
        }
    }
    if !cli.quiet {
        if output.document.truncated {
            eprintln!(
                "   {}",
                dim(&format!(
                    "act text truncated to {} of {} chars",
                    cli.max_input_chars, output.document.char_count
                ))
            );
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total",
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
            output.stats.total_duration_ms,
        );
    }
}

/// `--text` as given, or all of stdin for `--stdin`.
fn read_pasted_text(cli: &Cli) -> Result<Option<String>> {
    if let Some(ref text) = cli.text {
        return Ok(Some(text.clone()));
    }
    if cli.stdin {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read act text from stdin")?;
        return Ok(Some(text));
    }
    Ok(None)
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .model(cli.model.clone())
        .base_url(cli.base_url.clone())
        .tasks(cli.tasks.clone())
        .max_tokens(cli.max_tokens)
        .max_input_chars(cli.max_input_chars)
        .fallback_section(parse_fallback_section(&cli.fallback_section)?)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    // An explicit --provider wins over a key picked up from OPENAI_API_KEY.
    if let Some(ref name) = cli.provider {
        builder = builder.provider_name(name.clone());
    } else if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--fallback-section`: a section key, or `none`.
fn parse_fallback_section(s: &str) -> Result<Option<SectionKey>> {
    match s.trim().to_lowercase().as_str() {
        "none" | "discard" | "" => Ok(None),
        other => other
            .parse::<SectionKey>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid --fallback-section: {e}")),
    }
}
