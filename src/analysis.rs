//! The analysis result returned by the model, and the Q&A history sent back
//! to it.
//!
//! The wire shape is fixed by the JSON schema embedded in the system
//! instruction (see [`crate::prompts::RESPONSE_SCHEMA`]). A result is produced
//! wholesale by the model for every request and is never edited locally.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Whether the model could produce the guide or needs more details first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    /// The guide and filled fields are present.
    Complete,
    /// The model asked clarifying questions instead.
    NeedsDetails,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStatus::Complete => f.write_str("COMPLETE"),
            AnalysisStatus::NeedsDetails => f.write_str("NEEDS_DETAILS"),
        }
    }
}

/// A box in `[ymin, xmin, ymax, xmax]` order, as the model returns it.
///
/// Coordinates are either on the 0–1 scale or the 0–1000 scale; see
/// [`crate::overlay::normalize_coordinate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl From<[f64; 4]> for BoundingBox {
    fn from([ymin, xmin, ymax, xmax]: [f64; 4]) -> Self {
        Self {
            ymin,
            xmin,
            ymax,
            xmax,
        }
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.ymin, b.xmin, b.ymax, b.xmax]
    }
}

/// One value the model suggests writing onto the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilledField {
    /// The text to write.
    #[serde(default)]
    pub value: String,

    /// Where to write it. Absent when the model gave no box or a malformed one.
    #[serde(
        rename = "box_2d",
        default,
        deserialize_with = "lenient_box",
        skip_serializing_if = "Option::is_none"
    )]
    pub bounding_box: Option<BoundingBox>,
}

impl FilledField {
    pub fn new(value: impl Into<String>, bounding_box: Option<[f64; 4]>) -> Self {
        Self {
            value: value.into(),
            bounding_box: bounding_box.map(BoundingBox::from),
        }
    }
}

/// Structured analysis of an uploaded form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormAnalysis {
    /// Name of the document, e.g. "Form W-4 (2024)".
    pub document_title: String,

    /// One-paragraph summary of what the form is for.
    pub summary: String,

    pub status: AnalysisStatus,

    /// Clarifying questions, present when `status` is `NEEDS_DETAILS`.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub questions: Vec<String>,

    /// The full markdown guide, present when `status` is `COMPLETE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown_guide: Option<String>,

    /// Values to overlay on the form image.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub filled_fields: Vec<FilledField>,
}

impl FormAnalysis {
    pub fn needs_details(&self) -> bool {
        self.status == AnalysisStatus::NeedsDetails
    }

    /// Title to show to the user, falling back when the model left it blank.
    pub fn display_title(&self) -> &str {
        let t = self.document_title.trim();
        if t.is_empty() {
            "Form Detected"
        } else {
            t
        }
    }

    /// Fields that carry a bounding box and can be overlaid.
    pub fn placeable_fields(&self) -> impl Iterator<Item = &FilledField> {
        self.filled_fields.iter().filter(|f| f.bounding_box.is_some())
    }
}

/// A question the model asked and the user's answer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Accept `null` wherever a list is expected.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Models occasionally emit three or five numbers, strings, or nested arrays.
/// Any of those drops the box instead of rejecting the whole reply.
fn lenient_box<'de, D>(deserializer: D) -> Result<Option<BoundingBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    let Some(items) = raw.as_array() else {
        return Ok(None);
    };
    if items.len() != 4 {
        return Ok(None);
    }
    let mut coords = [0.0f64; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        match item.as_f64() {
            Some(v) if v.is_finite() => *slot = v,
            _ => return Ok(None),
        }
    }
    Ok(Some(BoundingBox::from(coords)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_complete_reply() {
        let json = r##"{
            "documentTitle": "Form W-4",
            "summary": "Employee's withholding certificate.",
            "status": "COMPLETE",
            "questions": [],
            "markdownGuide": "# Form W-4",
            "filledFields": [
                {"value": "Jane Doe", "box_2d": [120, 80, 140, 400]},
                {"value": "Single"}
            ]
        }"##;
        let a: FormAnalysis = serde_json::from_str(json).unwrap();
        assert_eq!(a.status, AnalysisStatus::Complete);
        assert_eq!(a.filled_fields.len(), 2);
        assert_eq!(
            a.filled_fields[0].bounding_box,
            Some(BoundingBox::from([120.0, 80.0, 140.0, 400.0]))
        );
        assert!(a.filled_fields[1].bounding_box.is_none());
        assert_eq!(a.placeable_fields().count(), 1);
    }

    #[test]
    fn optional_fields_may_be_missing_or_null() {
        let json = r#"{
            "documentTitle": "Lease",
            "summary": "A rental agreement.",
            "status": "NEEDS_DETAILS",
            "questions": ["What is your full name?"],
            "markdownGuide": null,
            "filledFields": null
        }"#;
        let a: FormAnalysis = serde_json::from_str(json).unwrap();
        assert!(a.needs_details());
        assert_eq!(a.questions, vec!["What is your full name?"]);
        assert!(a.markdown_guide.is_none());
        assert!(a.filled_fields.is_empty());
    }

    #[test]
    fn malformed_boxes_are_dropped() {
        let json = r#"[
            {"value": "a", "box_2d": [1, 2, 3]},
            {"value": "b", "box_2d": "10,20,30,40"},
            {"value": "c", "box_2d": [1, "x", 3, 4]},
            {"value": "d", "box_2d": null},
            {"value": "e", "box_2d": [0.1, 0.2, 0.3, 0.4]}
        ]"#;
        let fields: Vec<FilledField> = serde_json::from_str(json).unwrap();
        let boxes: Vec<bool> = fields.iter().map(|f| f.bounding_box.is_some()).collect();
        assert_eq!(boxes, vec![false, false, false, false, true]);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let json = r#"{"documentTitle": "x", "summary": "y", "status": "DONE"}"#;
        assert!(serde_json::from_str::<FormAnalysis>(json).is_err());
    }

    #[test]
    fn serializes_in_wire_shape() {
        let a = FormAnalysis {
            document_title: "T".into(),
            summary: "S".into(),
            status: AnalysisStatus::NeedsDetails,
            questions: vec!["Q?".into()],
            markdown_guide: None,
            filled_fields: vec![FilledField::new("v", Some([1.0, 2.0, 3.0, 4.0]))],
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["documentTitle"], "T");
        assert_eq!(v["status"], "NEEDS_DETAILS");
        assert_eq!(v["filledFields"][0]["box_2d"][3], 4.0);
        assert!(v.get("markdownGuide").is_none());
    }

    #[test]
    fn display_title_falls_back() {
        let mut a: FormAnalysis = serde_json::from_str(
            r#"{"documentTitle": "  ", "summary": "", "status": "COMPLETE"}"#,
        )
        .unwrap();
        assert_eq!(a.display_title(), "Form Detected");
        a.document_title = "DS-160".into();
        assert_eq!(a.display_title(), "DS-160");
    }
}
