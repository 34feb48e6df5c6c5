//! # formease
//!
//! Help people fill in bureaucratic forms with a Vision Language Model (VLM).
//!
//! ## Why this crate?
//!
//! Tax returns, visa applications and insurance claims are written in a
//! jargon nobody speaks. A vision model can read a scan of the form, explain
//! it, ask for the personal details it needs, and say exactly what goes in
//! each box. This crate wraps that exchange in a small state machine and
//! turns the model's answer into things a person can use: a markdown guide,
//! an overlay preview, and a printable PDF.
//!
//! ## Flow Overview
//!
//! ```text
//! form (image / PDF)
//!  │
//!  ├─ 1. Input     local file or URL → data URI (MIME sniffed)
//!  ├─ 2. Prepare   images as-is; PDFs rasterised via pdfium
//!  ├─ 3. Analyze   VLM → JSON: title, summary, status, questions, guide, fields
//!  ├─ 4. Clarify   NEEDS_DETAILS → user answers → follow-up request
//!  ├─ 5. Present   markdown guide + overlay preview (SVG)
//!  ├─ 6. Export    data-sheet PDF (PDF source) or overlay PDF (image source)
//!  └─ 7. Chat      free-form questions about the document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formease::{AssistConfig, FlowState, FormAssistant, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / ANTHROPIC_API_KEY
//!     let assistant = FormAssistant::new(AssistConfig::default())?;
//!     let document = assistant.load("w4.png").await?;
//!
//!     let mut session = Session::new();
//!     session.select_document(document)?;
//!     session.set_description("Single, one job, no dependents")?;
//!
//!     if session.analyze(&assistant).await? == FlowState::NeedsInfo {
//!         for q in session.questions().to_vec() {
//!             session.set_answer(&q, "Not sure")?;
//!         }
//!         session.submit_answers(&assistant).await?;
//!     }
//!
//!     if let Some(guide) = session.analysis().and_then(|a| a.markdown_guide.as_deref()) {
//!         println!("{guide}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `formease` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! formease = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Model
//!
//! | Model | Default for | PDF input |
//! |-------|-------------|-----------|
//! | `gemini-2.5-flash` | `gemini` | rasterised or inline |
//! | `gpt-4.1-mini` | `openai` and unknown providers | rasterised |
//! | `claude-sonnet-4-20250514` | `anthropic` | rasterised |
//! | `llava` | `ollama`, `lmstudio` | rasterised |
//!
//! Bounding boxes are accepted on either the 0–1 or the 0–1000 scale.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod assistant;
pub mod chat;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{AnalysisStatus, BoundingBox, FilledField, FormAnalysis, QaPair};
pub use assistant::FormAssistant;
pub use chat::{ChatMessage, ChatRole, ChatSession};
pub use config::{AssistConfig, AssistConfigBuilder, PdfInputMode};
pub use document::SourceDocument;
pub use error::{FormEaseError, SessionError};
pub use export::{export_file_name, export_pdf, write_export};
pub use overlay::{normalize_coordinate, placements, render_svg_preview, Placement};
pub use pipeline::llm::{InlineImage, ModelReply, ModelRequest, VisionModel};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, RequestKind};
pub use session::{FlowState, Session};
