//! The flow controller: which step of the form-filling flow the user is on.
//!
//! ```text
//!            begin_analysis                 NEEDS_DETAILS
//!   IDLE ─────────────────▶ ANALYZING ──────────────────▶ NEEDS_INFO
//!    ▲                       │  ▲   │                         │
//!    │ clear        COMPLETE │  │   │ failure                 │ begin_follow_up
//!    │                       ▼  │   ▼                         │
//!   (any)               SUCCESS │  ERROR ◀── failure ─────────┤
//!                               └─────────────────────────────┘
//! ```
//!
//! The `begin_*` / [`Session::complete`] pair lets a caller drive the request
//! itself; [`Session::analyze`] and [`Session::submit_answers`] do the whole
//! round trip against a [`FormAssistant`]. Either way only one request is in
//! flight per session.

use crate::analysis::{FormAnalysis, QaPair};
use crate::assistant::FormAssistant;
use crate::document::SourceDocument;
use crate::error::{FormEaseError, SessionError, ANALYZE_FAILED_MESSAGE, ANSWERS_FAILED_MESSAGE};
use crate::progress::RequestKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Answer recorded for a question the user left blank.
pub const NOT_PROVIDED: &str = "Not provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// Waiting for a document and an analyze request.
    Idle,
    /// A request is in flight.
    Analyzing,
    /// The model asked questions; waiting for answers.
    NeedsInfo,
    /// The guide is ready.
    Success,
    /// The last request failed; see [`Session::error`].
    Error,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowState::Idle => "IDLE",
            FlowState::Analyzing => "ANALYZING",
            FlowState::NeedsInfo => "NEEDS_INFO",
            FlowState::Success => "SUCCESS",
            FlowState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    kind: RequestKind,
    resume: FlowState,
}

/// In-memory state of one form-filling session.
#[derive(Debug, Clone)]
pub struct Session {
    document: Option<SourceDocument>,
    description: String,
    answers: HashMap<String, String>,
    analysis: Option<FormAnalysis>,
    error: Option<String>,
    state: FlowState,
    in_flight: Option<InFlight>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            document: None,
            description: String::new(),
            answers: HashMap::new(),
            analysis: None,
            error: None,
            state: FlowState::Idle,
            in_flight: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn document(&self) -> Option<&SourceDocument> {
        self.document.as_ref()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.document.as_ref().and_then(|d| d.file_name())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn analysis(&self) -> Option<&FormAnalysis> {
        self.analysis.as_ref()
    }

    /// The last user-facing error message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The current answer to `question`, if it was asked.
    pub fn answer(&self, question: &str) -> Option<&str> {
        self.answers.get(question).map(String::as_str)
    }

    /// Questions of the current analysis, in the order the model asked them.
    pub fn questions(&self) -> &[String] {
        self.analysis
            .as_ref()
            .map(|a| a.questions.as_slice())
            .unwrap_or(&[])
    }

    // ── Input ────────────────────────────────────────────────────────────────

    /// Select the document to analyze.
    pub fn select_document(&mut self, document: SourceDocument) -> Result<(), SessionError> {
        self.require(&[FlowState::Idle, FlowState::Error], "select a document")?;
        self.document = Some(document);
        self.error = None;
        Ok(())
    }

    /// Set the free-text context sent with the analysis.
    pub fn set_description(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.state == FlowState::Analyzing {
            return Err(self.invalid("edit the description"));
        }
        self.description = text.into();
        Ok(())
    }

    /// Record the answer to one of the model's questions.
    pub fn set_answer(
        &mut self,
        question: &str,
        answer: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.require(&[FlowState::NeedsInfo], "answer questions")?;
        match self.answers.get_mut(question) {
            Some(slot) => {
                *slot = answer.into();
                Ok(())
            }
            None => Err(SessionError::UnknownQuestion(question.to_string())),
        }
    }

    /// Drop everything and return to [`FlowState::Idle`].
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    // ── Requests ─────────────────────────────────────────────────────────────

    /// Enter [`FlowState::Analyzing`] for the initial analysis.
    pub fn begin_analysis(&mut self) -> Result<(), SessionError> {
        self.require(&[FlowState::Idle, FlowState::Error], "start an analysis")?;
        if self.document.is_none() {
            return Err(SessionError::NoDocument);
        }
        self.error = None;
        self.enter_analyzing(RequestKind::Analysis);
        Ok(())
    }

    /// Enter [`FlowState::Analyzing`] for the follow-up and return the Q&A
    /// history to send. Blank answers become [`NOT_PROVIDED`].
    ///
    /// A `NEEDS_DETAILS` reply without questions still allows the follow-up;
    /// the history is then empty.
    pub fn begin_follow_up(&mut self) -> Result<Vec<QaPair>, SessionError> {
        self.require(&[FlowState::NeedsInfo], "submit answers")?;
        let history = self.qa_history();
        self.enter_analyzing(RequestKind::FollowUp);
        Ok(history)
    }

    /// Apply the outcome of the in-flight request and return the new state.
    ///
    /// Failures are logged and replaced by a generic user-facing message.
    pub fn complete(
        &mut self,
        outcome: Result<FormAnalysis, FormEaseError>,
    ) -> Result<FlowState, SessionError> {
        let Some(flight) = self.in_flight.take() else {
            return Err(self.invalid("complete a request"));
        };

        self.state = match (flight.kind, outcome) {
            (RequestKind::FollowUp, Ok(analysis)) => {
                self.analysis = Some(analysis);
                FlowState::Success
            }
            (_, Ok(analysis)) if analysis.needs_details() => {
                self.answers = analysis
                    .questions
                    .iter()
                    .map(|q| (q.clone(), String::new()))
                    .collect();
                self.analysis = Some(analysis);
                FlowState::NeedsInfo
            }
            (_, Ok(analysis)) => {
                self.analysis = Some(analysis);
                FlowState::Success
            }
            (kind, Err(e)) => {
                warn!("{} failed: {}", kind, e);
                self.error = Some(
                    match kind {
                        RequestKind::FollowUp => ANSWERS_FAILED_MESSAGE,
                        _ => ANALYZE_FAILED_MESSAGE,
                    }
                    .to_string(),
                );
                FlowState::Error
            }
        };

        info!("Session → {}", self.state);
        Ok(self.state)
    }

    /// Abandon the in-flight request and return to the state it started from.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        let Some(flight) = self.in_flight.take() else {
            return Err(self.invalid("cancel"));
        };
        self.state = flight.resume;
        Ok(())
    }

    /// Run the initial analysis against `assistant`.
    pub async fn analyze(&mut self, assistant: &FormAssistant) -> Result<FlowState, SessionError> {
        self.begin_analysis()?;
        let outcome = match self.document.as_ref() {
            Some(doc) => {
                assistant
                    .analyze_form(doc, self.context(), &[])
                    .await
            }
            None => return Err(SessionError::NoDocument),
        };
        self.complete(outcome)
    }

    /// Send the user's answers to `assistant` and apply the result.
    pub async fn submit_answers(
        &mut self,
        assistant: &FormAssistant,
    ) -> Result<FlowState, SessionError> {
        let history = self.begin_follow_up()?;
        let outcome = match self.document.as_ref() {
            Some(doc) => {
                assistant
                    .follow_up(doc, self.context(), &history)
                    .await
            }
            None => return Err(SessionError::NoDocument),
        };
        self.complete(outcome)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn context(&self) -> Option<&str> {
        let d = self.description.trim();
        (!d.is_empty()).then_some(d)
    }

    fn qa_history(&self) -> Vec<QaPair> {
        self.questions()
            .iter()
            .map(|q| {
                let answer = self
                    .answers
                    .get(q)
                    .map(|a| a.trim())
                    .filter(|a| !a.is_empty())
                    .unwrap_or(NOT_PROVIDED);
                QaPair::new(q.clone(), answer)
            })
            .collect()
    }

    fn enter_analyzing(&mut self, kind: RequestKind) {
        self.in_flight = Some(InFlight {
            kind,
            resume: self.state,
        });
        self.state = FlowState::Analyzing;
        info!("Session → {} ({})", self.state, kind);
    }

    fn require(&self, allowed: &[FlowState], action: &'static str) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}
