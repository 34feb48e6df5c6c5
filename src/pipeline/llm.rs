//! VLM interaction: the model seam and the retrying call driver.
//!
//! Every request the assistant makes (analysis, follow-up, chat) is a
//! [`ModelRequest`]: a system instruction, one user turn of text, and the
//! document images. [`VisionModel`] is the seam between that request and a
//! concrete provider; [`ProviderModel`] implements it over any
//! `edgequake_llm` provider, and tests implement it with scripted replies.
//!
//! Prompt wording lives in [`crate::prompts`]; this module only moves bytes
//! and handles retries.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with the default 500 ms base and 2 retries
//! waits 500 ms → 1 s, which keeps a failed analysis under a few seconds of
//! extra latency before the user sees the error message.

use crate::config::AssistConfig;
use crate::error::FormEaseError;
use crate::progress::RequestKind;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// A base64 image (or PDF) attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
    /// Provider hint for image resolution ("low" / "high").
    pub detail: Option<String>,
}

impl InlineImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One provider-neutral request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub kind: RequestKind,
    /// System instruction. `None` sends only the user turn.
    pub system: Option<String>,
    /// Text of the user turn.
    pub text: String,
    /// Attachments of the user turn, in order.
    pub images: Vec<InlineImage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

/// What the model answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// A vision-capable model.
///
/// Implementations perform exactly one attempt; [`call_with_retry`] owns the
/// retry policy.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Send one request.
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, FormEaseError>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "vision model".to_string()
    }
}

/// [`VisionModel`] over an `edgequake_llm` provider.
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
    timeout_secs: u64,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            provider,
            label: label.into(),
            timeout_secs,
        }
    }

    /// Build the chat messages for a request.
    ///
    /// The request text and the images travel in a single user turn; the
    /// stateless prompt already embeds any conversation history.
    fn messages(request: &ModelRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::system(system.as_str()));
        }
        let images: Vec<ImageData> = request
            .images
            .iter()
            .map(|img| {
                let data = ImageData::new(img.data.clone(), img.mime_type.as_str());
                match img.detail {
                    Some(ref d) => data.with_detail(d.as_str()),
                    None => data,
                }
            })
            .collect();
        messages.push(ChatMessage::user_with_images(request.text.as_str(), images));
        messages
    }
}

#[async_trait]
impl VisionModel for ProviderModel {
    async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, FormEaseError> {
        let messages = Self::messages(request);
        let options = CompletionOptions {
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            ..Default::default()
        };

        let call = self.provider.chat(&messages, Some(&options));
        let response = timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| FormEaseError::ApiTimeout {
                secs: self.timeout_secs,
            })?
            .map_err(|e| FormEaseError::LlmApiError {
                message: e.to_string(),
                retries: 0,
            })?;

        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Send `request`, retrying failures with exponential backoff.
///
/// Progress events go to `config.progress_callback`. The final error carries
/// the number of retries that were attempted.
pub async fn call_with_retry(
    model: &dyn VisionModel,
    request: &ModelRequest,
    config: &AssistConfig,
) -> Result<ModelReply, FormEaseError> {
    let start = Instant::now();
    let kind = request.kind;
    let cb = config.progress_callback.as_ref();

    if let Some(cb) = cb {
        cb.on_request_start(kind, request.images.len());
    }

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            let reason = last_err.as_deref().unwrap_or("unknown error");
            warn!(
                "{} request: retry {}/{} after {}ms",
                kind, attempt, config.max_retries, backoff
            );
            if let Some(cb) = cb {
                cb.on_retry(kind, attempt, config.max_retries, reason);
            }
            sleep(Duration::from_millis(backoff)).await;
        }

        match model.generate(request).await {
            Ok(reply) => {
                debug!(
                    "{} request via {}: {} input tokens, {} output tokens, {:?}",
                    kind,
                    model.describe(),
                    reply.input_tokens,
                    reply.output_tokens,
                    start.elapsed()
                );
                if let Some(cb) = cb {
                    cb.on_request_complete(kind, reply.input_tokens, reply.output_tokens);
                }
                return Ok(reply);
            }
            Err(e) => {
                let err_msg = match e {
                    FormEaseError::LlmApiError { message, .. } => message,
                    other => other.to_string(),
                };
                warn!("{} request: attempt {} failed: {}", kind, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    let message = last_err.unwrap_or_else(|| "Unknown error".to_string());
    if let Some(cb) = cb {
        cb.on_request_error(kind, &message);
    }
    Err(FormEaseError::LlmApiError {
        message,
        retries: config.max_retries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then echoes the request text.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl VisionModel for Flaky {
        async fn generate(&self, request: &ModelRequest) -> Result<ModelReply, FormEaseError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(FormEaseError::LlmApiError {
                    message: format!("503 attempt {n}"),
                    retries: 0,
                })
            } else {
                Ok(ModelReply::text(request.text.clone()))
            }
        }
    }

    fn request() -> ModelRequest {
        ModelRequest {
            kind: RequestKind::Analysis,
            system: None,
            text: "hello".into(),
            images: vec![],
            temperature: Some(0.2),
            max_tokens: Some(16),
        }
    }

    fn fast_config(retries: u32) -> AssistConfig {
        AssistConfig::builder()
            .max_retries(retries)
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let model = Flaky {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let reply = call_with_retry(&model, &request(), &fast_config(2)).await.unwrap();
        assert_eq!(reply.content, "hello");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let model = Flaky {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let err = call_with_retry(&model, &request(), &fast_config(1)).await.unwrap_err();
        match err {
            FormEaseError::LlmApiError { message, retries } => {
                assert_eq!(retries, 1);
                assert_eq!(message, "503 attempt 1");
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn messages_carry_system_and_user_turns() {
        let mut req = request();
        assert_eq!(ProviderModel::messages(&req).len(), 1);
        req.system = Some("be precise".into());
        req.images.push(InlineImage::new("AAAA", "image/png"));
        assert_eq!(ProviderModel::messages(&req).len(), 2);
    }
}
