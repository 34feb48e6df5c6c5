//! Conversational Q&A about an analyzed form.

use crate::assistant::FormAssistant;
use crate::document::SourceDocument;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// First message of every conversation.
pub const CHAT_GREETING: &str = "Hi! I’ve analyzed your form. Do you have any specific questions about it? I can explain tricky terms or help you find where to sign.";

/// Shown in place of an answer when the request fails.
pub const CHAT_FAILED_MESSAGE: &str =
    "Sorry, I encountered an error while analyzing the document. Please try again.";

/// Shown when the model answers with nothing.
pub const EMPTY_ANSWER_MESSAGE: &str = "I couldn't generate an answer. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// A conversation about one document.
///
/// Failures never escape [`ChatSession::ask`]: they turn into a model message
/// so the conversation can go on.
#[derive(Debug, Clone)]
pub struct ChatSession {
    document: SourceDocument,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Start a conversation seeded with [`CHAT_GREETING`].
    pub fn new(document: SourceDocument) -> Self {
        Self {
            document,
            messages: vec![ChatMessage::model(CHAT_GREETING)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn document(&self) -> &SourceDocument {
        &self.document
    }

    /// Ask a question and append both sides of the exchange.
    ///
    /// Returns the model's answer, or `None` for a blank question (nothing is
    /// sent or recorded).
    pub async fn ask(&mut self, assistant: &FormAssistant, question: &str) -> Option<&str> {
        let question = question.trim();
        if question.is_empty() {
            return None;
        }

        let history_len = self.messages.len();
        self.messages.push(ChatMessage::user(question));

        let answer = match assistant
            .ask_form_question(&self.document, question, &self.messages[..history_len])
            .await
        {
            Ok(text) if text.trim().is_empty() => EMPTY_ANSWER_MESSAGE.to_string(),
            Ok(text) => text,
            Err(e) => {
                warn!("Chat request failed: {}", e);
                CHAT_FAILED_MESSAGE.to_string()
            }
        };

        self.messages.push(ChatMessage::model(answer));
        self.messages.last().map(|m| m.text.as_str())
    }
}
