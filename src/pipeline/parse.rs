//! Reply parsing: raw model text → [`FormAnalysis`].
//!
//! Providers with native JSON mode return a bare object. Everyone else wraps it
//! in ` ```json ` fences or puts a sentence in front of it, despite the prompt.
//! The rules below recover the object without touching its content; the
//! markdown guide inside it then gets a light cleanup of its own.

use crate::analysis::FormAnalysis;
use crate::error::FormEaseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Deserializer;

/// Characters of the raw reply quoted in a parse error.
const SNIPPET_LEN: usize = 120;

/// Parse a model reply into an analysis result.
///
/// Rules (applied in order):
/// 1. Blank reply → [`FormEaseError::EmptyResponse`]
/// 2. Strip outer code fences
/// 3. Deserialize the first complete `{ … }` object, ignoring any text
///    before or after it; failures → [`FormEaseError::MalformedResponse`]
/// 4. Clean the markdown guide, dropping it when blank
pub fn parse_analysis(reply: &str) -> Result<FormAnalysis, FormEaseError> {
    if reply.trim().is_empty() {
        return Err(FormEaseError::EmptyResponse);
    }

    let unfenced = strip_code_fences(reply);
    let mut analysis =
        first_json_object(&unfenced).map_err(|e| FormEaseError::MalformedResponse {
            detail: e.to_string(),
            snippet: snippet(reply),
        })?;

    analysis.markdown_guide = analysis
        .markdown_guide
        .filter(|g| !g.trim().is_empty())
        .map(|g| clean_guide(&g));

    Ok(analysis)
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 3: Deserialize the first JSON object ────────────────────────────────

/// Deserialize the first value starting at a `{` that parses as a
/// [`FormAnalysis`]. Trailing text after the object is ignored.
///
/// When no candidate parses, the error of the first one is returned, or the
/// error of parsing the whole input when it holds no `{` at all.
pub fn first_json_object(input: &str) -> Result<FormAnalysis, serde_json::Error> {
    let mut first_err = None;
    for (start, _) in input.match_indices('{') {
        let mut stream = Deserializer::from_str(&input[start..]).into_iter::<FormAnalysis>();
        match stream.next() {
            Some(Ok(analysis)) => return Ok(analysis),
            Some(Err(e)) => {
                first_err.get_or_insert(e);
            }
            None => {}
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => serde_json::from_str(input),
    }
}

fn snippet(reply: &str) -> String {
    reply.trim().chars().take(SNIPPET_LEN).collect()
}

// ── Rule 4: Guide cleanup ────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

/// Normalise a markdown guide for display and for writing to disk:
/// LF line endings, no zero-width characters, at most two consecutive blank
/// lines, and exactly one final newline.
///
/// Trailing spaces inside the guide are kept; two of them are a markdown
/// hard line break.
pub fn clean_guide(input: &str) -> String {
    let s = strip_markdown_fence(input);
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s = s.replace(
        ['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{2060}'],
        "",
    );
    let s = RE_BLANK_LINES.replace_all(&s, "\n\n\n");

    let trimmed = s.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}

static RE_MARKDOWN_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?\n(.*)\n```\s*$").unwrap());

fn strip_markdown_fence(input: &str) -> String {
    match RE_MARKDOWN_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisStatus;

    const BARE: &str = r#"{"documentTitle":"W-4","summary":"Withholding.","status":"NEEDS_DETAILS","questions":["Name?"]}"#;

    #[test]
    fn bare_object() {
        let a = parse_analysis(BARE).unwrap();
        assert_eq!(a.document_title, "W-4");
        assert_eq!(a.status, AnalysisStatus::NeedsDetails);
        assert_eq!(a.questions, vec!["Name?"]);
    }

    #[test]
    fn fenced_object() {
        let reply = format!("```json\n{BARE}\n```");
        assert_eq!(parse_analysis(&reply).unwrap(), parse_analysis(BARE).unwrap());

        let reply = format!("```\r\n{BARE}\r\n```\n");
        assert!(parse_analysis(&reply).is_ok());
    }

    #[test]
    fn prose_around_object() {
        let reply = format!("Sure! Here is the analysis:\n\n{BARE}\n\nLet me know if you need more.");
        assert_eq!(parse_analysis(&reply).unwrap().document_title, "W-4");
    }

    #[test]
    fn empty_reply() {
        assert!(matches!(parse_analysis(""), Err(FormEaseError::EmptyResponse)));
        assert!(matches!(parse_analysis(" \n "), Err(FormEaseError::EmptyResponse)));
    }

    #[test]
    fn malformed_reply_quotes_snippet() {
        let err = parse_analysis("I cannot read this document.").unwrap_err();
        match err {
            FormEaseError::MalformedResponse { snippet, .. } => {
                assert_eq!(snippet, "I cannot read this document.");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let err = parse_analysis(r#"{"summary":"x","status":"COMPLETE"}"#).unwrap_err();
        assert!(matches!(err, FormEaseError::MalformedResponse { .. }));
    }

    #[test]
    fn guide_is_cleaned_and_blank_guide_dropped() {
        let reply = r#"{"documentTitle":"T","summary":"S","status":"COMPLETE","markdownGuide":"```markdown\n# T\r\n\r\n\r\n\r\n\r\n## Summary   \n```"}"#;
        let a = parse_analysis(reply).unwrap();
        assert_eq!(a.markdown_guide.as_deref(), Some("# T\n\n\n## Summary\n"));

        let reply = r#"{"documentTitle":"T","summary":"S","status":"COMPLETE","markdownGuide":"  "}"#;
        assert!(parse_analysis(reply).unwrap().markdown_guide.is_none());
    }

    #[test]
    fn trailing_prose_with_braces_is_ignored() {
        let reply = "{\"documentTitle\":\"W-4\",\"summary\":\"s\",\"status\":\"COMPLETE\"}\n\nNote: boxes are {ymin, xmin, ymax, xmax}.";
        let a = parse_analysis(reply).unwrap();
        assert_eq!(a.document_title, "W-4");
        assert_eq!(a.status, AnalysisStatus::Complete);
    }

    #[test]
    fn leading_prose_with_braces_is_skipped() {
        let reply = format!("Format {{json}} as requested:\n{BARE}\nDone {{ok}}.");
        assert_eq!(parse_analysis(&reply).unwrap().document_title, "W-4");
    }

    #[test]
    fn first_object_errors_without_braces() {
        assert!(first_json_object("no braces").is_err());
        assert!(first_json_object("} {").is_err());
    }

    #[test]
    fn clean_guide_keeps_hard_line_breaks() {
        assert_eq!(
            clean_guide("Line one  \nLine two\n"),
            "Line one  \nLine two\n"
        );
    }

    #[test]
    fn clean_guide_removes_invisible_chars() {
        assert_eq!(clean_guide("Sign\u{200B} here\u{FEFF}"), "Sign here\n");
        assert_eq!(clean_guide(""), "\n");
    }
}
