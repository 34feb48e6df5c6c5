//! Configuration types for form analysis.
//!
//! Every knob lives in [`AssistConfig`], built via [`AssistConfigBuilder`].
//! One struct is easy to share between the analysis client, the chat client
//! and the CLI, and easy to log when comparing two runs.

use crate::error::FormEaseError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for the analysis and chat clients.
///
/// Built via [`AssistConfig::builder()`] or [`AssistConfig::default()`].
///
/// # Example
/// ```rust
/// use formease::{AssistConfig, PdfInputMode};
///
/// let config = AssistConfig::builder()
///     .model("gemini-2.5-flash")
///     .provider_name("gemini")
///     .pdf_mode(PdfInputMode::Inline)
///     .build()
///     .unwrap();
/// assert_eq!(config.temperature, 0.2);
/// ```
#[derive(Clone)]
pub struct AssistConfig {
    /// LLM model identifier, e.g. "gemini-2.5-flash", "gpt-4.1-mini".
    /// If None, a vision-capable default for the provider is used
    /// (see [`default_model_for`]).
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for form analysis. Default: 0.2.
    ///
    /// Low enough that field values and boxes are stable between runs, high
    /// enough that the clarifying questions read naturally.
    pub temperature: f32,

    /// Sampling temperature for chat answers. Default: None (provider default).
    pub chat_temperature: Option<f32>,

    /// Maximum tokens the model may generate per request. Default: 8192.
    ///
    /// The markdown guide plus a `filledFields` array for a two-page form
    /// regularly exceeds 4 000 tokens; a truncated reply is unparseable JSON.
    pub max_tokens: usize,

    /// Maximum retry attempts on a failed model call. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Longest edge, in pixels, of a rasterised PDF page. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Maximum number of PDF pages sent to the model. Default: 5.
    pub max_pdf_pages: usize,

    /// How PDF documents are handed to the model. Default: [`PdfInputMode::Rasterize`].
    pub pdf_mode: PdfInputMode,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system instruction for analysis. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            chat_temperature: None,
            max_tokens: 8192,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            max_rendered_pixels: 2000,
            max_pdf_pages: 5,
            pdf_mode: PdfInputMode::default(),
            password: None,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssistConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("chat_temperature", &self.chat_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pdf_pages", &self.max_pdf_pages)
            .field("pdf_mode", &self.pdf_mode)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AssistConfig {
    /// Create a new builder for `AssistConfig`.
    pub fn builder() -> AssistConfigBuilder {
        AssistConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model that will be requested: the configured one, or the
    /// provider's vision default.
    pub fn effective_model(&self) -> String {
        match self.model {
            Some(ref m) => m.clone(),
            None => default_model_for(self.provider_name.as_deref().unwrap_or("openai")).to_string(),
        }
    }
}

/// Vision-capable default model for a provider name.
pub fn default_model_for(provider: &str) -> &'static str {
    match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" | "vertexai" => "gemini-2.5-flash",
        "anthropic" | "claude" => "claude-sonnet-4-20250514",
        "ollama" | "lmstudio" => "llava",
        _ => "gpt-4.1-mini",
    }
}

/// Builder for [`AssistConfig`].
#[derive(Debug)]
pub struct AssistConfigBuilder {
    config: AssistConfig,
}

impl AssistConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
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

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn chat_temperature(mut self, t: f32) -> Self {
        self.config.chat_temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_pdf_pages(mut self, n: usize) -> Self {
        self.config.max_pdf_pages = n;
        self
    }

    pub fn pdf_mode(mut self, mode: PdfInputMode) -> Self {
        self.config.pdf_mode = mode;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssistConfig, FormEaseError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(FormEaseError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_pdf_pages == 0 {
            return Err(FormEaseError::InvalidConfig(
                "max_pdf_pages must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(FormEaseError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// How a PDF document is handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PdfInputMode {
    /// Rasterise pages with pdfium and send PNGs. Works with every vision
    /// provider. (default)
    #[default]
    Rasterize,
    /// Send the raw PDF bytes as an inline `application/pdf` attachment.
    /// Only providers with native PDF input (Gemini) accept this.
    Inline,
}
