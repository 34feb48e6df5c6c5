//! Pipeline stages between an uploaded form and a parsed analysis.
//!
//! Each submodule implements exactly one step, so each is testable on its own
//! and the rendering backend or provider can change without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ parse
//! (path/URL) (pdfium)  (base64)   (VLM)   (JSON)
//! ```
//!
//! 1. [`input`]: read the local file or download the URL into a document
//! 2. [`render`]: rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe (skipped for image uploads)
//! 3. [`encode`]: base64-wrap pages and images for the multimodal request
//! 4. [`llm`]: the model seam and the retry/backoff driver; the only stage
//!    with network I/O
//! 5. [`parse`]: recover the JSON object from the reply and clean the guide

pub mod encode;
pub mod input;
pub mod llm;
pub mod parse;
pub mod render;
