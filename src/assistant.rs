//! The form assistant: analysis and chat requests against a vision model.
//!
//! [`FormAssistant`] is stateless apart from its configuration. Each call
//! sends the whole document again, so the flow controller in
//! [`crate::session`] and the chat log in [`crate::chat`] can be dropped and
//! rebuilt freely.

use crate::analysis::{FormAnalysis, QaPair};
use crate::chat::{ChatMessage, EMPTY_ANSWER_MESSAGE};
use crate::config::{default_model_for, AssistConfig, PdfInputMode};
use crate::document::SourceDocument;
use crate::error::FormEaseError;
use crate::pipeline::llm::{self, InlineImage, ModelRequest, ProviderModel, VisionModel};
use crate::pipeline::{encode, input, parse, render};
use crate::progress::RequestKind;
use crate::prompts;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Analyzes forms and answers questions about them.
pub struct FormAssistant {
    model: Arc<dyn VisionModel>,
    config: AssistConfig,
}

impl std::fmt::Debug for FormAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormAssistant")
            .field("model", &self.model.describe())
            .field("config", &self.config)
            .finish()
    }
}

impl FormAssistant {
    /// Create an assistant backed by the provider `config` resolves to.
    ///
    /// # Errors
    /// [`FormEaseError::ProviderNotConfigured`] when no provider can be built.
    pub fn new(config: AssistConfig) -> Result<Self, FormEaseError> {
        let (provider, label) = resolve_provider(&config)?;
        info!("Using model {}", label);
        let model = ProviderModel::new(provider, label, config.api_timeout_secs);
        Ok(Self {
            model: Arc::new(model),
            config,
        })
    }

    /// Create an assistant over any [`VisionModel`].
    pub fn with_model(model: Arc<dyn VisionModel>, config: AssistConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    /// Label of the underlying model, for display.
    pub fn model_name(&self) -> String {
        self.model.describe()
    }

    /// Read a local path or download a URL.
    pub async fn load(&self, input: &str) -> Result<SourceDocument, FormEaseError> {
        input::resolve_input(input, self.config.download_timeout_secs).await
    }

    /// Attachments for a document.
    ///
    /// Images are forwarded as uploaded. PDFs are rasterised page by page,
    /// or forwarded as-is under [`PdfInputMode::Inline`].
    pub async fn prepare_images(
        &self,
        document: &SourceDocument,
    ) -> Result<Vec<InlineImage>, FormEaseError> {
        if !document.is_pdf() || self.config.pdf_mode == PdfInputMode::Inline {
            return Ok(vec![encode::inline_document(document)]);
        }

        let name = document.display_name("document.pdf");
        let pages = render::render_pages(document.decoded_bytes()?, name, &self.config).await?;
        if pages.is_empty() {
            return Err(FormEaseError::EmptyDocument {
                name: name.to_string(),
            });
        }

        pages
            .iter()
            .map(|(idx, img)| {
                encode::encode_page(img).map_err(|e| FormEaseError::RasterisationFailed {
                    page: idx + 1,
                    detail: e.to_string(),
                })
            })
            .collect()
    }

    /// Analyze a form.
    ///
    /// With an empty `qa_history` this is the initial analysis: the model may
    /// answer `NEEDS_DETAILS` with questions. With answers it is the follow-up
    /// that should produce the complete guide.
    ///
    /// # Errors
    /// Rendering failures, [`FormEaseError::LlmApiError`] once retries are
    /// exhausted, [`FormEaseError::EmptyResponse`] and
    /// [`FormEaseError::MalformedResponse`].
    pub async fn analyze_form(
        &self,
        document: &SourceDocument,
        user_context: Option<&str>,
        qa_history: &[QaPair],
    ) -> Result<FormAnalysis, FormEaseError> {
        let kind = if qa_history.is_empty() {
            RequestKind::Analysis
        } else {
            RequestKind::FollowUp
        };
        self.run_analysis(kind, document, user_context, qa_history)
            .await
    }

    /// Re-analyze a form after the user answered the model's questions.
    ///
    /// Same request as [`Self::analyze_form`], but always reported as
    /// [`RequestKind::FollowUp`], also when the model asked nothing and
    /// `qa_history` is empty.
    pub async fn follow_up(
        &self,
        document: &SourceDocument,
        user_context: Option<&str>,
        qa_history: &[QaPair],
    ) -> Result<FormAnalysis, FormEaseError> {
        self.run_analysis(RequestKind::FollowUp, document, user_context, qa_history)
            .await
    }

    async fn run_analysis(
        &self,
        kind: RequestKind,
        document: &SourceDocument,
        user_context: Option<&str>,
        qa_history: &[QaPair],
    ) -> Result<FormAnalysis, FormEaseError> {
        let start = Instant::now();
        info!(
            "Starting {} of {}",
            kind,
            document.display_name("uploaded form")
        );

        // ── Step 1: Attachments ──────────────────────────────────────────────
        let images = self.prepare_images(document).await?;

        // ── Step 2: Request ──────────────────────────────────────────────────
        let system = self
            .config
            .system_prompt
            .clone()
            .unwrap_or_else(prompts::system_instruction);
        let request = ModelRequest {
            kind,
            system: Some(system),
            text: prompts::analysis_prompt(user_context, qa_history),
            images,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };

        // ── Step 3: Call and parse ───────────────────────────────────────────
        let reply = llm::call_with_retry(self.model.as_ref(), &request, &self.config).await?;
        let analysis = parse::parse_analysis(&reply.content)?;

        info!(
            "{} finished in {:.1}s: {} ({}, {} questions, {} fields)",
            kind,
            start.elapsed().as_secs_f64(),
            analysis.display_title(),
            analysis.status,
            analysis.questions.len(),
            analysis.filled_fields.len()
        );
        Ok(analysis)
    }

    /// Answer a free-form question about the document.
    ///
    /// `history` is the conversation so far, excluding `question`. An empty
    /// reply becomes [`EMPTY_ANSWER_MESSAGE`].
    pub async fn ask_form_question(
        &self,
        document: &SourceDocument,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<String, FormEaseError> {
        let images = self.prepare_images(document).await?;
        let request = ModelRequest {
            kind: RequestKind::Chat,
            system: None,
            text: prompts::chat_prompt(question, history),
            images,
            temperature: self.config.chat_temperature,
            max_tokens: Some(self.config.max_tokens),
        };

        let reply = llm::call_with_retry(self.model.as_ref(), &request, &self.config).await?;
        let answer = reply.content.trim();
        debug!("Chat answer: {} chars", answer.len());

        if answer.is_empty() {
            Ok(EMPTY_ANSWER_MESSAGE.to_string())
        } else {
            Ok(answer.to_string())
        }
    }
}

// ── Provider resolution ──────────────────────────────────────────────────────

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, FormEaseError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FormEaseError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`** when both are set.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set.
/// 5. **Gemini** when `GEMINI_API_KEY` is set.
/// 6. **Full auto-detection** (`ProviderFactory::from_env`).
///
/// Returns the provider and a `provider/model` label for logs.
fn resolve_provider(
    config: &AssistConfig,
) -> Result<(Arc<dyn LLMProvider>, String), FormEaseError> {
    if let Some(ref provider) = config.provider {
        let label = config
            .model
            .clone()
            .unwrap_or_else(|| "custom provider".to_string());
        return Ok((Arc::clone(provider), label));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.effective_model();
        return Ok((create_vision_provider(name, &model)?, format!("{name}/{model}")));
    }

    if let (Some(prov), Some(model)) = (
        env_nonempty("EDGEQUAKE_LLM_PROVIDER"),
        env_nonempty("EDGEQUAKE_MODEL"),
    ) {
        let label = format!("{prov}/{model}");
        return Ok((create_vision_provider(&prov, &model)?, label));
    }

    for (key, name) in [("OPENAI_API_KEY", "openai"), ("GEMINI_API_KEY", "gemini")] {
        if env_nonempty(key).is_some() {
            let model = config
                .model
                .clone()
                .unwrap_or_else(|| default_model_for(name).to_string());
            let label = format!("{name}/{model}");
            return Ok((create_vision_provider(name, &model)?, label));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FormEaseError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok((llm_provider, "auto-detected provider".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisStatus;
    use crate::pipeline::llm::ModelReply;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed reply.
    struct Recorder {
        reply: String,
        seen: Mutex<Vec<ModelRequest>>,
    }

    impl Recorder {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VisionModel for Recorder {
        async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, FormEaseError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(ModelReply::text(self.reply.clone()))
        }
    }

    fn png_doc() -> SourceDocument {
        SourceDocument::from_data_uri("data:image/png;base64,iVBORw0KGgo=", Some("w4.png")).unwrap()
    }

    fn assistant(model: Arc<Recorder>) -> FormAssistant {
        let config = AssistConfig::builder().retry_backoff_ms(1).build().unwrap();
        FormAssistant::with_model(model, config)
    }

    #[tokio::test]
    async fn analysis_request_shape() {
        let model = Recorder::new(
            r#"{"documentTitle":"W-4","summary":"s","status":"NEEDS_DETAILS","questions":["Name?"]}"#,
        );
        let a = assistant(model.clone());
        let result = a.analyze_form(&png_doc(), Some("new job"), &[]).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::NeedsDetails);

        let seen = model.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.kind, RequestKind::Analysis);
        assert_eq!(req.temperature, Some(0.2));
        assert_eq!(req.images.len(), 1);
        assert_eq!(req.images[0].mime_type, "image/png");
        assert!(req.system.as_deref().unwrap().contains("Legal and Administrative Assistant"));
        assert!(req.text.contains("INITIAL USER CONTEXT:\nnew job"));
    }

    #[tokio::test]
    async fn follow_up_uses_follow_up_kind() {
        let model = Recorder::new(r#"{"documentTitle":"W-4","summary":"s","status":"COMPLETE"}"#);
        let a = assistant(model.clone());
        a.analyze_form(&png_doc(), None, &[QaPair::new("Name?", "Jane")])
            .await
            .unwrap();
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].kind, RequestKind::FollowUp);
        assert!(seen[0].text.contains("Q1: Name?\nA: Jane\n"));
    }

    #[tokio::test]
    async fn follow_up_without_answers_keeps_initial_instruction() {
        let model = Recorder::new(r#"{"documentTitle":"W-4","summary":"s","status":"COMPLETE"}"#);
        let a = assistant(model.clone());
        a.follow_up(&png_doc(), None, &[]).await.unwrap();
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].kind, RequestKind::FollowUp);
        assert!(seen[0].text.contains("INSTRUCTION: Check if you have enough info"));
        assert!(!seen[0].text.contains("FOLLOW-UP"));
    }

    #[tokio::test]
    async fn custom_system_prompt_replaces_default() {
        let model = Recorder::new(r#"{"documentTitle":"T","summary":"s","status":"COMPLETE"}"#);
        let config = AssistConfig::builder()
            .system_prompt("Answer in JSON.")
            .build()
            .unwrap();
        let a = FormAssistant::with_model(model.clone(), config);
        a.analyze_form(&png_doc(), None, &[]).await.unwrap();
        assert_eq!(
            model.seen.lock().unwrap()[0].system.as_deref(),
            Some("Answer in JSON.")
        );
    }

    #[tokio::test]
    async fn inline_pdf_is_forwarded_without_rendering() {
        let model = Recorder::new(r#"{"documentTitle":"T","summary":"s","status":"COMPLETE"}"#);
        let config = AssistConfig::builder()
            .pdf_mode(PdfInputMode::Inline)
            .build()
            .unwrap();
        let a = FormAssistant::with_model(model.clone(), config);
        let pdf = SourceDocument::from_bytes(b"%PDF-1.4 x", Some("f.pdf")).unwrap();
        a.analyze_form(&pdf, None, &[]).await.unwrap();
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].images[0].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn chat_request_has_no_system_prompt() {
        let model = Recorder::new("  Sign on line 5.  ");
        let a = assistant(model.clone());
        let history = vec![ChatMessage::model("Hi!")];
        let answer = a
            .ask_form_question(&png_doc(), "Where do I sign?", &history)
            .await
            .unwrap();
        assert_eq!(answer, "Sign on line 5.");

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].kind, RequestKind::Chat);
        assert!(seen[0].system.is_none());
        assert!(seen[0].text.ends_with("Assistant: Hi!\n\nUser Question: Where do I sign?"));
    }

    #[tokio::test]
    async fn empty_chat_reply_uses_fallback() {
        let a = assistant(Recorder::new(""));
        let answer = a.ask_form_question(&png_doc(), "?", &[]).await.unwrap();
        assert_eq!(answer, EMPTY_ANSWER_MESSAGE);
    }

    #[tokio::test]
    async fn empty_analysis_reply_is_an_error() {
        let a = assistant(Recorder::new(""));
        let err = a.analyze_form(&png_doc(), None, &[]).await.unwrap_err();
        assert!(matches!(err, FormEaseError::EmptyResponse));
    }
}
