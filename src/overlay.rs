//! Auto-fill overlay: where each suggested value goes on the form image.
//!
//! Models disagree on the box scale. Gemini answers on a 0–1000 grid, others
//! answer with fractions. Every coordinate is normalized on its own: anything
//! above 1 is read as per-mille.

use crate::analysis::{BoundingBox, FilledField};
use crate::document::SourceDocument;
use crate::error::FormEaseError;
use image::ImageReader;
use serde::Serialize;
use std::io::Cursor;

/// Map a coordinate to the 0–1 scale.
pub fn normalize_coordinate(value: f64) -> f64 {
    if value > 1.0 {
        value / 1000.0
    } else {
        value
    }
}

impl BoundingBox {
    /// The box with every coordinate on the 0–1 scale.
    pub fn normalized(&self) -> BoundingBox {
        BoundingBox {
            ymin: normalize_coordinate(self.ymin),
            xmin: normalize_coordinate(self.xmin),
            ymax: normalize_coordinate(self.ymax),
            xmax: normalize_coordinate(self.xmax),
        }
    }
}

/// A value anchored on the page, as fractions of the page size from the
/// top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub value: String,
    pub left: f64,
    pub top: f64,
}

/// Anchor each boxed field at its box's top-left corner.
///
/// Fields without a box are skipped. Anchors are clamped to the page.
pub fn placements(fields: &[FilledField]) -> Vec<Placement> {
    fields
        .iter()
        .filter_map(|field| {
            let b = field.bounding_box?.normalized();
            Some(Placement {
                value: field.value.clone(),
                left: b.xmin.clamp(0.0, 1.0),
                top: b.ymin.clamp(0.0, 1.0),
            })
        })
        .collect()
}

/// Render the form image with the values drawn over it as a standalone SVG.
///
/// Only image documents can be previewed; PDFs get a data sheet instead.
pub fn render_svg_preview(
    document: &SourceDocument,
    fields: &[FilledField],
) -> Result<String, FormEaseError> {
    if !document.is_image() {
        return Err(FormEaseError::UnsupportedFileType {
            mime: document.mime_type().to_string(),
        });
    }

    let (width, height) = image_dimensions(document)?;
    let (w, h) = (f64::from(width), f64::from(height));
    // Scale the label with the page so it reads the same on phone photos and
    // 300 dpi scans.
    let font_size = (h / 70.0).max(10.0).round();

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{width}" height="{height}" viewBox="0 0 {width} {height}">
<image x="0" y="0" width="{width}" height="{height}" xlink:href="{}"/>
"#,
        document.to_data_uri()
    );

    for p in placements(fields) {
        svg.push_str(&format!(
            r##"<text x="{:.1}" y="{:.1}" dominant-baseline="middle" font-family="Helvetica, Arial, sans-serif" font-size="{}" font-weight="bold" fill="#1d4ed8">{}</text>
"##,
            p.left * w,
            p.top * h,
            font_size,
            xml_escape(&p.value)
        ));
    }

    svg.push_str("</svg>\n");
    Ok(svg)
}

/// Pixel size of an image document, read from its header.
pub fn image_dimensions(document: &SourceDocument) -> Result<(u32, u32), FormEaseError> {
    let name = document.display_name("image").to_string();
    let bytes = document.decoded_bytes()?;
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| FormEaseError::ImageDecodeFailed {
            name: name.clone(),
            detail: e.to_string(),
        })?
        .into_dimensions()
        .map_err(|e| FormEaseError::ImageDecodeFailed {
            name,
            detail: e.to_string(),
        })
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
