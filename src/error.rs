//! Error types for the formease library.
//!
//! Two error types reflect two distinct failure modes:
//!
//! * [`FormEaseError`]: **Fatal** for the operation at hand (bad input file,
//!   provider not configured, unparseable model reply, export failure).
//!   Returned as `Err(FormEaseError)` from the library's async entry points.
//!
//! * [`SessionError`]: the caller asked the flow controller for a transition
//!   that is not valid from its current state (analyzing with no document,
//!   answering questions that were never asked). These are programming or
//!   UI-sequencing mistakes and never involve the network.
//!
//! The session itself does not propagate `FormEaseError` to its caller: it
//! logs the detail and stores one of the generic user-facing messages below.

use crate::session::FlowState;
use std::path::PathBuf;
use thiserror::Error;

/// Shown when an uploaded file is neither an image nor a PDF.
pub const UNSUPPORTED_UPLOAD_MESSAGE: &str = "Please upload an image or a PDF file.";

/// Shown when the initial analysis request fails.
pub const ANALYZE_FAILED_MESSAGE: &str =
    "Something went wrong analyzing the document. Please try again.";

/// Shown when the follow-up request carrying the user's answers fails.
pub const ANSWERS_FAILED_MESSAGE: &str = "Failed to process answers. Please try again.";

/// Shown when PDF export fails.
pub const EXPORT_FAILED_MESSAGE: &str = "Failed to generate PDF. Please try again.";

/// All fatal errors returned by the formease library.
#[derive(Debug, Error)]
pub enum FormEaseError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file was read but is neither an image nor a PDF.
    #[error("{msg} Got '{mime}'.", msg = UNSUPPORTED_UPLOAD_MESSAGE)]
    UnsupportedFileType { mime: String },

    /// The document contained no bytes.
    #[error("Document '{name}' is empty")]
    EmptyDocument { name: String },

    /// The base64 payload of a data URI could not be decoded.
    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),

    /// An image document could not be decoded.
    #[error("Could not decode image '{name}': {detail}")]
    ImageDecodeFailed { name: String, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{name}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{name}'")]
    WrongPassword { name: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF forms are rasterised with PDFium before they are sent to the model.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy, or\n\
  • place libpdfium next to the binary, or\n\
  • pass --pdf-mode inline to send the PDF bytes directly (Gemini only).\n"
    )]
    PdfiumBindingFailed(String),

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error on every attempt.
    #[error("LLM API error after {retries} retries: {message}")]
    LlmApiError { message: String, retries: u32 },

    /// A single model call exceeded the configured timeout.
    #[error("API call timed out after {secs}s")]
    ApiTimeout { secs: u64 },

    /// The model answered with an empty body.
    #[error("No response received from AI.")]
    EmptyResponse,

    /// The model reply could not be parsed as an analysis result.
    #[error("Model reply is not a valid analysis result: {detail}\nReply starts with: {snippet:?}")]
    MalformedResponse { detail: String, snippet: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// PDF generation failed.
    #[error("{msg} ({detail})", msg = EXPORT_FAILED_MESSAGE)]
    ExportFailed { detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// An invalid request to the flow controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// An analysis was requested before any document was selected.
    #[error("No document selected. Upload a form first.")]
    NoDocument,

    /// The requested action is not valid in the current state.
    #[error("Cannot {action} while the session is {state}")]
    InvalidTransition {
        state: FlowState,
        action: &'static str,
    },

    /// An answer was given for a question the model did not ask.
    #[error("Unknown question: {0:?}")]
    UnknownQuestion(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_display_uses_upload_message() {
        let e = FormEaseError::UnsupportedFileType {
            mime: "text/plain".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with(UNSUPPORTED_UPLOAD_MESSAGE), "got: {msg}");
        assert!(msg.contains("text/plain"));
    }

    #[test]
    fn empty_response_display() {
        assert_eq!(
            FormEaseError::EmptyResponse.to_string(),
            "No response received from AI."
        );
    }

    #[test]
    fn llm_error_display_mentions_retries() {
        let e = FormEaseError::LlmApiError {
            message: "503 overloaded".into(),
            retries: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("2 retries"));
        assert!(msg.contains("503 overloaded"));
    }

    #[test]
    fn export_failed_display() {
        let e = FormEaseError::ExportFailed {
            detail: "bad image".into(),
        };
        assert!(e.to_string().starts_with(EXPORT_FAILED_MESSAGE));
    }

    #[test]
    fn invalid_transition_display() {
        let e = SessionError::InvalidTransition {
            state: FlowState::Analyzing,
            action: "select a document",
        };
        assert_eq!(
            e.to_string(),
            "Cannot select a document while the session is ANALYZING"
        );
    }
}
