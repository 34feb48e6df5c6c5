//! Progress-callback trait for model request events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AssistConfigBuilder::progress_callback`] to observe each
//! request the assistant sends: analysis, follow-up, and chat.
//!
//! Callbacks keep the library ignorant of how the host reports progress: the
//! CLI drives a terminal spinner, a server could forward events to a
//! WebSocket. The trait is `Send + Sync` so it can be shared with tasks.
//!
//! # Example
//!
//! ```rust
//! use formease::{AnalysisProgressCallback, AssistConfig, RequestKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RetryCounter(AtomicUsize);
//!
//! impl AnalysisProgressCallback for RetryCounter {
//!     fn on_retry(&self, _kind: RequestKind, _attempt: u32, _max: u32, _error: &str) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = AssistConfig::builder()
//!     .progress_callback(Arc::new(RetryCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which user action a model request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    /// First look at the form, with the user's free-text context.
    Analysis,
    /// Re-analysis carrying the answers to the model's questions.
    FollowUp,
    /// A free-form question in the chat panel.
    Chat,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestKind::Analysis => "analysis",
            RequestKind::FollowUp => "follow-up",
            RequestKind::Chat => "chat",
        };
        f.write_str(s)
    }
}

/// Called by the assistant around every model request.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once the document has been prepared and the request is sent.
    ///
    /// # Arguments
    /// * `kind`   : which action issued the request
    /// * `images` : number of images attached (pages for a rasterised PDF)
    fn on_request_start(&self, kind: RequestKind, images: usize) {
        let _ = (kind, images);
    }

    /// Called before a retry, after the backoff delay has been chosen.
    ///
    /// # Arguments
    /// * `attempt` : 1-based retry number
    /// * `max`     : configured maximum retries
    /// * `error`   : the error that triggered the retry
    fn on_retry(&self, kind: RequestKind, attempt: u32, max: u32, error: &str) {
        let _ = (kind, attempt, max, error);
    }

    /// Called when the model answered.
    fn on_request_complete(&self, kind: RequestKind, input_tokens: usize, output_tokens: usize) {
        let _ = (kind, input_tokens, output_tokens);
    }

    /// Called when the request failed for good.
    fn on_request_error(&self, kind: RequestKind, error: &str) {
        let _ = (kind, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssistConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        retries: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        tokens: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_request_start(&self, _kind: RequestKind, _images: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_retry(&self, _kind: RequestKind, _attempt: u32, _max: u32, _error: &str) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn on_request_complete(&self, _kind: RequestKind, input: usize, output: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            self.tokens.fetch_add(input + output, Ordering::SeqCst);
        }

        fn on_request_error(&self, _kind: RequestKind, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_request_start(RequestKind::Analysis, 1);
        cb.on_retry(RequestKind::Analysis, 1, 2, "503");
        cb.on_request_complete(RequestKind::Analysis, 10, 20);
        cb.on_request_error(RequestKind::Chat, "boom");
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_request_start(RequestKind::Analysis, 2);
        tracker.on_retry(RequestKind::Analysis, 1, 2, "timeout");
        tracker.on_request_complete(RequestKind::Analysis, 1200, 800);
        tracker.on_request_start(RequestKind::Chat, 1);
        tracker.on_request_error(RequestKind::Chat, "offline");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.retries.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.tokens.load(Ordering::SeqCst), 2000);
    }

    #[test]
    fn request_kind_display() {
        assert_eq!(RequestKind::FollowUp.to_string(), "follow-up");
        let cb: Arc<dyn AnalysisProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_request_start(RequestKind::FollowUp, 1);
    }
}
