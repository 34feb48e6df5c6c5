//! CLI binary for formease.
//!
//! A thin shim over the library crate: maps flags to `AssistConfig`, drives
//! the session through analysis and clarification, then writes the guide,
//! preview and export.

use anyhow::{Context, Result};
use clap::Parser;
use formease::export::export_file_name;
use formease::output::write_atomic;
use formease::{
    export_pdf, render_svg_preview, AnalysisProgressCallback, AssistConfig, ChatSession, FlowState,
    FormAnalysis, FormAssistant, PdfInputMode, ProgressCallback, RequestKind, Session,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while a request is in flight and one
/// summary line when it ends.
struct CliProgressCallback {
    /// Spinner of the request in flight, if any.
    bar: Mutex<Option<(ProgressBar, Instant)>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
        })
    }

    fn spinner(kind: RequestKind, images: usize) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix(match kind {
            RequestKind::Analysis => "Analyzing",
            RequestKind::FollowUp => "Completing",
            RequestKind::Chat => "Thinking",
        });
        bar.set_message(format!(
            "{} image{} sent to the model…",
            images,
            if images == 1 { "" } else { "s" }
        ));
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    /// Stop the spinner and return how long the request took.
    fn finish(&self) -> Option<Duration> {
        let mut slot = self.bar.lock().ok()?;
        let (bar, started) = slot.take()?;
        bar.finish_and_clear();
        Some(started.elapsed())
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_request_start(&self, kind: RequestKind, images: usize) {
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some((Self::spinner(kind, images), Instant::now()));
        }
    }

    fn on_retry(&self, kind: RequestKind, attempt: u32, max: u32, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        if let Ok(slot) = self.bar.lock() {
            if let Some((ref bar, _)) = *slot {
                bar.println(format!(
                    "  {} {} retry {}/{}  {}",
                    cyan("↻"),
                    kind,
                    attempt,
                    max,
                    dim(&msg)
                ));
            }
        }
    }

    fn on_request_complete(&self, kind: RequestKind, input_tokens: usize, output_tokens: usize) {
        let elapsed = self.finish().unwrap_or_default();
        if kind != RequestKind::Chat {
            eprintln!(
                "{} {} done  {}",
                green("✔"),
                kind,
                dim(&format!(
                    "{:.1}s  {} tokens in / {} out",
                    elapsed.as_secs_f64(),
                    input_tokens,
                    output_tokens
                )),
            );
        }
    }

    fn on_request_error(&self, kind: RequestKind, error: &str) {
        self.finish();
        eprintln!("{} {} failed: {}", red("✘"), kind, red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a scanned form, answer the model's questions, print the guide
  formease w4.png

  # Give context up front and save the guide
  formease lease.pdf --context "Student, renting alone, no pets" -o guide.md

  # Non-interactive: answers from a JSON file ({"question": "answer", ...})
  formease ds160.pdf --answers-file answers.json --no-interactive

  # Overlay preview and printable PDF for a photographed form
  formease claim.jpg --preview claim.svg --export

  # Ask about the document without filling it
  formease i9.pdf --context "Just explain the form" --ask "Where do I sign?"

  # Interactive chat after the analysis
  formease w4.png --chat

  # Send the PDF itself instead of rendered pages (Gemini)
  formease w4.pdf --provider gemini --pdf-mode inline

SUPPORTED PROVIDERS & MODELS:
  Provider     Model                          PDF input
  ─────────    ─────────────────────────────  ────────────────────
  gemini       gemini-2.5-flash (default)     rasterize or inline
  openai       gpt-4.1-mini (default)         rasterize
  anthropic    claude-sonnet-4-20250514       rasterize
  ollama       llava (default)                rasterize

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium, used to rasterise PDF forms
  RUST_LOG                Override log filter (e.g. formease=debug)

EXIT STATUS:
  0  guide produced
  1  analysis, follow-up or export failed
"#;

/// Understand and fill in forms with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "formease",
    version,
    about = "Understand and fill in forms (images or PDFs) with Vision LLMs",
    long_about = "Analyze a scanned form with a Vision Language Model. The model explains the \
form, asks for the personal details it needs, and produces a field-by-field guide, an \
auto-fill overlay and a printable PDF. Supports Google Gemini, OpenAI, Anthropic and any \
OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image/PDF path or HTTP/HTTPS URL.
    input: String,

    /// Free-text context about you and your situation.
    #[arg(short = 'c', long, env = "FORMEASE_CONTEXT")]
    context: Option<String>,

    /// JSON object mapping the model's questions to your answers.
    #[arg(long, env = "FORMEASE_ANSWERS_FILE")]
    answers_file: Option<PathBuf>,

    /// Write the markdown guide to this file instead of stdout.
    #[arg(short, long, env = "FORMEASE_OUTPUT")]
    output: Option<PathBuf>,

    /// Export a filled PDF. Without a path: filled_<name>.pdf.
    #[arg(long, env = "FORMEASE_EXPORT", num_args = 0..=1, value_name = "PATH")]
    export: Option<Option<PathBuf>>,

    /// Write an SVG preview with the values over the form (image uploads).
    #[arg(long, env = "FORMEASE_PREVIEW", value_name = "PATH")]
    preview: Option<PathBuf>,

    /// Print the analysis result as JSON instead of the guide.
    #[arg(long, env = "FORMEASE_JSON")]
    json: bool,

    /// Never prompt on stdin; unanswered questions become "Not provided".
    #[arg(long, env = "FORMEASE_NO_INTERACTIVE")]
    no_interactive: bool,

    /// Ask a question about the document after the analysis (repeatable).
    #[arg(long, value_name = "QUESTION")]
    ask: Vec<String>,

    /// Open an interactive chat about the document after the analysis.
    #[arg(long)]
    chat: bool,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(
        long,
        env = "EDGEQUAKE_MODEL",
        long_help = "Vision LLM model to use. Default depends on the provider: \
          gemini-2.5-flash for gemini, gpt-4.1-mini for openai, claude-sonnet-4-20250514 for anthropic."
    )]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini, openai, anthropic, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature for analysis (0.0–2.0).
    #[arg(long, env = "FORMEASE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per request.
    #[arg(long, env = "FORMEASE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries per request on LLM failure.
    #[arg(long, env = "FORMEASE_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Pages of a PDF form sent to the model.
    #[arg(long, env = "FORMEASE_MAX_PDF_PAGES", default_value_t = 5,
          value_parser = clap::value_parser!(u16).range(1..))]
    max_pdf_pages: u16,

    /// How PDF forms are sent: rasterize (pages as PNG) or inline (PDF bytes).
    #[arg(long, env = "FORMEASE_PDF_MODE", value_enum, default_value = "rasterize")]
    pdf_mode: PdfModeArg,

    /// PDF user password for encrypted forms.
    #[arg(long, env = "FORMEASE_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom analysis system prompt.
    #[arg(long, env = "FORMEASE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FORMEASE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "FORMEASE_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "FORMEASE_NO_PROGRESS")]
    no_progress: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FORMEASE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-request LLM call timeout in seconds.
    #[arg(long, env = "FORMEASE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PdfModeArg {
    Rasterize,
    Inline,
}

impl From<PdfModeArg> for PdfInputMode {
    fn from(v: PdfModeArg) -> Self {
        match v {
            PdfModeArg::Rasterize => PdfInputMode::Rasterize,
            PdfModeArg::Inline => PdfInputMode::Inline,
        }
    }
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; INFO logs would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && io::stderr().is_terminal();
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

    // ── Build assistant ──────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let assistant = FormAssistant::new(config).context("Failed to set up the model provider")?;

    // ── Load document ────────────────────────────────────────────────────
    let document = assistant
        .load(&cli.input)
        .await
        .with_context(|| format!("Failed to load '{}'", cli.input))?;
    if !cli.quiet {
        eprintln!(
            "{} {}  {}",
            cyan("◆"),
            bold(document.display_name(&cli.input)),
            dim(&format!("{} via {}", document.mime_type(), assistant.model_name())),
        );
    }

    let mut session = Session::new();
    session.select_document(document.clone())?;
    if let Some(ref ctx) = cli.context {
        session.set_description(ctx.as_str())?;
    }

    let interactive = !cli.no_interactive && io::stdin().is_terminal();
    let mut stdin: StdinLines = BufReader::new(tokio::io::stdin()).lines();

    // ── Analyze ──────────────────────────────────────────────────────────
    let mut state = session.analyze(&assistant).await?;

    // ── Clarify ──────────────────────────────────────────────────────────
    if state == FlowState::NeedsInfo {
        let file_answers = match cli.answers_file {
            Some(ref path) => read_answers(path).await?,
            None => HashMap::new(),
        };
        let questions = session.questions().to_vec();
        if !cli.quiet && !questions.is_empty() {
            eprintln!(
                "\n{} The model needs a few details to fill in the form:",
                cyan("?")
            );
        }

        for (i, question) in questions.iter().enumerate() {
            let answer = match file_answers.get(question) {
                Some(a) => a.clone(),
                None if interactive => {
                    eprint!("  {} {}\n    > ", bold(&format!("{}.", i + 1)), question);
                    io::stderr().flush().ok();
                    stdin.next_line().await?.unwrap_or_default()
                }
                None => String::new(),
            };
            session.set_answer(question, answer)?;
        }
        state = session.submit_answers(&assistant).await?;
    }

    if state == FlowState::Error {
        anyhow::bail!(session.error().unwrap_or("Analysis failed").to_string());
    }
    let analysis = session
        .analysis()
        .cloned()
        .context("Session finished without a result")?;

    // ── Present ──────────────────────────────────────────────────────────
    emit_result(&cli, &analysis).await?;

    if let Some(ref path) = cli.preview {
        if document.is_image() {
            let svg = render_svg_preview(&document, &analysis.filled_fields)
                .context("Failed to render preview")?;
            write_atomic(path, svg.as_bytes()).await?;
            report_written(&cli, "Preview", path);
        } else if !cli.quiet {
            eprintln!(
                "{} Preview skipped: PDF forms get a data sheet (--export) instead",
                cyan("⚠")
            );
        }
    }

    if let Some(ref export) = cli.export {
        let file_name = document.file_name();
        let path = export
            .clone()
            .unwrap_or_else(|| PathBuf::from(export_file_name(file_name)));
        let pdf = export_pdf(&document, &analysis.filled_fields, file_name)?;
        write_atomic(&path, &pdf).await?;
        report_written(&cli, "Export", &path);
    }

    // ── Chat ─────────────────────────────────────────────────────────────
    if !cli.ask.is_empty() || cli.chat {
        let mut chat = ChatSession::new(document);
        for question in &cli.ask {
            if let Some(answer) = chat.ask(&assistant, question).await {
                println!("\n{} {}\n{}", bold("Q:"), question, answer);
            }
        }

        if cli.chat && interactive {
            eprintln!("\n{} {}", cyan("◆"), formease::chat::CHAT_GREETING);
            loop {
                eprint!("{} ", bold("you>"));
                io::stderr().flush().ok();
                let Some(line) = stdin.next_line().await? else {
                    break;
                };
                let line = line.trim();
                if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
                    break;
                }
                if let Some(answer) = chat.ask(&assistant, line).await {
                    println!("{}\n", answer);
                }
            }
        }
    }

    Ok(())
}

/// Print or write the guide (or the JSON result).
async fn emit_result(cli: &Cli, analysis: &FormAnalysis) -> Result<()> {
    let body = if cli.json {
        let mut json =
            serde_json::to_string_pretty(analysis).context("Failed to serialise result")?;
        json.push('\n');
        json
    } else {
        match analysis.markdown_guide {
            Some(ref guide) => guide.clone(),
            None => format!("# {}\n\n{}\n", analysis.display_title(), analysis.summary),
        }
    };

    if let Some(ref path) = cli.output {
        write_atomic(path, body.as_bytes()).await?;
        report_written(cli, "Guide", path);
    } else {
        if !cli.quiet && !cli.json {
            eprintln!(
                "\n{} {}  {}\n",
                green("✔"),
                bold(analysis.display_title()),
                dim(&format!("{} fields", analysis.filled_fields.len())),
            );
        }
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(body.as_bytes())
            .context("Failed to write to stdout")?;
    }
    Ok(())
}

fn report_written(cli: &Cli, what: &str, path: &Path) {
    if !cli.quiet {
        eprintln!("{} {}  →  {}", green("✔"), what, bold(&path.display().to_string()));
    }
}

/// Read `--answers-file`: a JSON object of question → answer.
async fn read_answers(path: &Path) -> Result<HashMap<String, String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read answers from {:?}", path))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{:?} must be a JSON object of question → answer", path))
}

/// Map CLI args to `AssistConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssistConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = AssistConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .max_pdf_pages(usize::from(cli.max_pdf_pages))
        .pdf_mode(cli.pdf_mode.clone().into())
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.as_str());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
