//! PDF export of the filled-in values.
//!
//! Two layouts, chosen by what was uploaded:
//!
//! * **Data sheet** (PDF uploads): the original cannot be drawn on without a
//!   full PDF editor, so the values are listed on A4 pages meant to be
//!   attached to the printed form.
//! * **Overlay sheet** (image uploads): the image stretched over an A4 page
//!   with each value written at its box.
//!
//! Both use the standard Helvetica font, so no font program is embedded and
//! text is limited to WinAnsi.
//!
//! Layout coordinates are given from the top-left corner like on screen;
//! they are flipped into PDF user space (origin bottom-left) when written.

use crate::analysis::FilledField;
use crate::document::SourceDocument;
use crate::error::FormEaseError;
use crate::output::write_atomic;
use crate::overlay::placements;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// A4 width in points.
pub const PAGE_WIDTH_PT: f32 = 595.28;
/// A4 height in points.
pub const PAGE_HEIGHT_PT: f32 = 841.89;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Longest value printed on a data sheet before it is cut.
pub const MAX_VALUE_CHARS: usize = 80;

// Data-sheet layout, in millimetres from the top-left corner.
const MARGIN_MM: f32 = 20.0;
const FIRST_FIELD_MM: f32 = 55.0;
const LINE_STEP_MM: f32 = 10.0;
const PAGE_BREAK_MM: f32 = 270.0;

/// Overlay text size in points.
const OVERLAY_FONT_PT: f32 = 10.0;
/// Downward shift from the box's top edge to the text baseline, in points.
const OVERLAY_BASELINE_PT: f32 = 5.0;

const FONT_KEY: &str = "F1";
const IMAGE_KEY: &str = "Im1";

/// Name of the exported file for an upload called `file_name`.
///
/// `w4.png` → `filled_w4.pdf`; without a name, `filled_form.pdf`.
///
/// The upload's extension is dropped on purpose: appending `.pdf` to the full
/// name would give `filled_w4.png.pdf`, which some file managers open with the
/// image viewer.
pub fn export_file_name(file_name: Option<&str>) -> String {
    let stem = file_name
        .map(Path::new)
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "form".to_string());
    format!("filled_{stem}.pdf")
}

/// Build the export for `document`: a data sheet for PDFs, an overlay sheet
/// for images.
pub fn export_pdf(
    document: &SourceDocument,
    fields: &[FilledField],
    file_name: Option<&str>,
) -> Result<Vec<u8>, FormEaseError> {
    let bytes = if document.is_pdf() {
        build_data_sheet(fields, file_name)?
    } else {
        build_overlay_sheet(document, fields)?
    };
    info!(
        "Exported {} fields as {} ({} bytes)",
        fields.len(),
        if document.is_pdf() { "data sheet" } else { "overlay" },
        bytes.len()
    );
    Ok(bytes)
}

/// Write an export atomically.
pub async fn write_export(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), FormEaseError> {
    write_atomic(path, bytes).await
}

// ── Data sheet ───────────────────────────────────────────────────────────────

/// One line of text placed on a page, in millimetres from the top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetLine {
    pub text: String,
    pub size_pt: f32,
    pub x_mm: f32,
    pub y_mm: f32,
}

impl SheetLine {
    fn new(text: impl Into<String>, size_pt: f32, x_mm: f32, y_mm: f32) -> Self {
        Self {
            text: text.into(),
            size_pt,
            x_mm,
            y_mm,
        }
    }
}

/// Bullet line for one value, cut to [`MAX_VALUE_CHARS`].
pub fn data_sheet_line(value: &str) -> String {
    if value.chars().count() > MAX_VALUE_CHARS {
        let cut: String = value.chars().take(MAX_VALUE_CHARS).collect();
        format!("• {cut}...")
    } else {
        format!("• {value}")
    }
}

/// Lay out the data sheet: one inner vector per page.
pub fn data_sheet_layout(fields: &[FilledField], file_name: Option<&str>) -> Vec<Vec<SheetLine>> {
    let mut first = vec![
        SheetLine::new("Filled Form Data Sheet", 20.0, MARGIN_MM, 20.0),
        SheetLine::new(
            format!("Reference for: {}", file_name.unwrap_or("Document")),
            12.0,
            MARGIN_MM,
            30.0,
        ),
        SheetLine::new("Attach this sheet to your original form.", 10.0, MARGIN_MM, 40.0),
    ];

    let mut pages = Vec::new();
    let mut y = FIRST_FIELD_MM;
    for field in fields {
        if y > PAGE_BREAK_MM {
            pages.push(std::mem::take(&mut first));
            y = MARGIN_MM;
        }
        first.push(SheetLine::new(data_sheet_line(&field.value), 10.0, MARGIN_MM, y));
        y += LINE_STEP_MM;
    }
    pages.push(first);
    pages
}

/// Render the data sheet to PDF bytes.
pub fn build_data_sheet(
    fields: &[FilledField],
    file_name: Option<&str>,
) -> Result<Vec<u8>, FormEaseError> {
    let mut pdf = PdfWriter::new();
    for page in data_sheet_layout(fields, file_name) {
        let mut ops = Vec::with_capacity(page.len() * 5);
        for line in &page {
            push_text(
                &mut ops,
                &line.text,
                line.size_pt,
                line.x_mm * PT_PER_MM,
                line.y_mm * PT_PER_MM,
            );
        }
        pdf.add_page(ops, None)?;
    }
    pdf.finish()
}

// ── Overlay sheet ────────────────────────────────────────────────────────────

/// Render the form image with the values on top to PDF bytes.
pub fn build_overlay_sheet(
    document: &SourceDocument,
    fields: &[FilledField],
) -> Result<Vec<u8>, FormEaseError> {
    let name = document.display_name("image");
    let decoded = image::load_from_memory(&document.decoded_bytes()?).map_err(|e| {
        FormEaseError::ExportFailed {
            detail: format!("could not decode '{name}': {e}"),
        }
    })?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    debug!("Embedding {}x{} image in overlay sheet", width, height);

    let compressed = deflate(rgb.as_raw()).map_err(|e| FormEaseError::ExportFailed {
        detail: format!("image compression failed: {e}"),
    })?;

    let mut pdf = PdfWriter::new();
    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        },
        compressed,
    )
    .with_compression(false);
    let image_id = pdf.doc.add_object(image);

    let mut ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(PAGE_WIDTH_PT),
                0.into(),
                0.into(),
                Object::Real(PAGE_HEIGHT_PT),
                0.into(),
                0.into(),
            ],
        ),
        Operation::new("Do", vec![Object::Name(IMAGE_KEY.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
        Operation::new("rg", vec![0.into(), 0.into(), 0.into()]),
    ];
    for p in placements(fields) {
        push_text(
            &mut ops,
            &p.value,
            OVERLAY_FONT_PT,
            p.left as f32 * PAGE_WIDTH_PT,
            p.top as f32 * PAGE_HEIGHT_PT + OVERLAY_BASELINE_PT,
        );
    }

    pdf.add_page(ops, Some(image_id))?;
    pdf.finish()
}

fn deflate(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    encoder.finish()
}

// ── PDF assembly ─────────────────────────────────────────────────────────────

/// Append one line of Helvetica text with its baseline at (`x`, `y_from_top`)
/// points.
fn push_text(ops: &mut Vec<Operation>, text: &str, size: f32, x: f32, y_from_top: f32) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new(
        "Tf",
        vec![Object::Name(FONT_KEY.as_bytes().to_vec()), Object::Real(size)],
    ));
    ops.push(Operation::new(
        "Td",
        vec![Object::Real(x), Object::Real(PAGE_HEIGHT_PT - y_from_top)],
    ));
    ops.push(Operation::new(
        "Tj",
        vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
    ));
    ops.push(Operation::new("ET", vec![]));
}

/// Minimal A4 document writer over lopdf.
struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    font_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        Self {
            doc,
            pages_id,
            font_id,
            kids: Vec::new(),
        }
    }

    fn add_page(
        &mut self,
        operations: Vec<Operation>,
        image: Option<ObjectId>,
    ) -> Result<(), FormEaseError> {
        let content = Content { operations }
            .encode()
            .map_err(|e| FormEaseError::ExportFailed {
                detail: format!("content stream: {e}"),
            })?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));

        let mut resources = dictionary! {
            "Font" => dictionary! { FONT_KEY => self.font_id },
        };
        if let Some(image_id) = image {
            resources.set("XObject", dictionary! { IMAGE_KEY => image_id });
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "Contents" => content_id,
            "Resources" => resources,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(PAGE_WIDTH_PT),
                Object::Real(PAGE_HEIGHT_PT),
            ],
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>, FormEaseError> {
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => self.kids,
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| FormEaseError::ExportFailed {
                detail: format!("serialise: {e}"),
            })?;
        Ok(buf)
    }
}

/// Encode text for a Helvetica font with `WinAnsiEncoding`.
///
/// Latin-1 maps directly; the typographic characters of the 0x80–0x9F block
/// are translated; anything else becomes `?`. Control characters become
/// spaces so a multi-line value stays on one line.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{A0}'..='\u{FF}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    fn fields(n: usize) -> Vec<FilledField> {
        (0..n)
            .map(|i| FilledField::new(format!("Value {i}"), Some([100.0, 100.0, 120.0, 400.0])))
            .collect()
    }

    /// Every `Tj` string on every page, in page order.
    fn shown_text(pdf: &[u8]) -> Vec<Vec<Vec<u8>>> {
        let doc = Document::load_mem(pdf).unwrap();
        doc.get_pages()
            .values()
            .map(|&page_id| {
                let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .filter_map(|op| op.operands.first()?.as_str().ok().map(<[u8]>::to_vec))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn file_name_uses_stem() {
        assert_eq!(export_file_name(Some("w4.png")), "filled_w4.pdf");
        assert_eq!(export_file_name(Some("tax.return.pdf")), "filled_tax.return.pdf");
        assert_eq!(export_file_name(Some("scan")), "filled_scan.pdf");
        assert_eq!(export_file_name(None), "filled_form.pdf");
        assert_eq!(export_file_name(Some("")), "filled_form.pdf");
    }

    #[test]
    fn long_values_are_cut() {
        let long = "x".repeat(81);
        let line = data_sheet_line(&long);
        assert_eq!(line, format!("• {}...", "x".repeat(80)));
        assert_eq!(data_sheet_line(&"y".repeat(80)), format!("• {}", "y".repeat(80)));
    }

    #[test]
    fn layout_header_and_first_rows() {
        let pages = data_sheet_layout(&fields(2), Some("lease.pdf"));
        assert_eq!(pages.len(), 1);
        let p = &pages[0];
        assert_eq!(p[0].text, "Filled Form Data Sheet");
        assert_eq!(p[1].text, "Reference for: lease.pdf");
        assert_eq!(p[2].text, "Attach this sheet to your original form.");
        assert_eq!((p[3].text.as_str(), p[3].y_mm), ("• Value 0", 55.0));
        assert_eq!(p[4].y_mm, 65.0);

        let pages = data_sheet_layout(&[], None);
        assert_eq!(pages[0][1].text, "Reference for: Document");
    }

    #[test]
    fn layout_breaks_pages_past_270mm() {
        // Rows at 55, 65, ... 265; the cursor then sits at 275.
        let pages = data_sheet_layout(&fields(25), None);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 3 + 22);
        assert_eq!(pages[0].last().unwrap().y_mm, 265.0);
        assert_eq!(pages[1].len(), 3);
        assert_eq!(pages[1][0].text, "• Value 22");
        assert_eq!(pages[1][0].y_mm, 20.0);
        assert_eq!(pages[1][1].y_mm, 30.0);
    }

    #[test]
    fn data_sheet_is_a_valid_pdf() {
        let pdf = build_data_sheet(&fields(30), Some("w4.pdf")).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.5"));
        let text = shown_text(&pdf);
        assert_eq!(text.len(), 2);
        assert_eq!(text[0][0], b"Filled Form Data Sheet");
        assert_eq!(text[0][3], b"\x95 Value 0");
    }

    #[test]
    fn overlay_sheet_embeds_image_and_values() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, image::Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        let doc = SourceDocument::from_bytes(&buf, Some("form.png")).unwrap();

        let mut f = fields(2);
        f.push(FilledField::new("unplaced", None));
        let pdf = export_pdf(&doc, &f, doc.file_name()).unwrap();

        let text = shown_text(&pdf);
        assert_eq!(text.len(), 1);
        assert_eq!(text[0], vec![b"Value 0".to_vec(), b"Value 1".to_vec()]);

        let loaded = Document::load_mem(&pdf).unwrap();
        let has_image = loaded.objects.values().any(|o| {
            o.as_stream()
                .ok()
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|v| v.as_name().ok())
                == Some(&b"Image"[..])
        });
        assert!(has_image);
    }

    #[test]
    fn overlay_text_sits_below_box_top() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, image::Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        let doc = SourceDocument::from_bytes(&buf, Some("form.png")).unwrap();

        let f = vec![FilledField::new("Jane", Some([500.0, 250.0, 520.0, 600.0]))];
        let pdf = export_pdf(&doc, &f, doc.file_name()).unwrap();

        let loaded = Document::load_mem(&pdf).unwrap();
        let page_id = *loaded.get_pages().values().next().unwrap();
        let content = Content::decode(&loaded.get_page_content(page_id).unwrap()).unwrap();
        let td: Vec<f32> = content
            .operations
            .iter()
            .find(|op| op.operator == "Td")
            .unwrap()
            .operands
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect();

        // x = 0.25 · W, y = H − (0.5 · H + 5)
        assert!((td[0] - 0.25 * PAGE_WIDTH_PT).abs() < 0.01, "x = {}", td[0]);
        assert!((td[0] - 148.82).abs() < 0.01);
        assert!((td[1] - (PAGE_HEIGHT_PT * 0.5 - 5.0)).abs() < 0.01, "y = {}", td[1]);
        assert!((td[1] - 415.945).abs() < 0.01);
    }

    #[test]
    fn pdf_source_exports_data_sheet() {
        let doc = SourceDocument::from_bytes(b"%PDF-1.4 original", Some("i9.pdf")).unwrap();
        let pdf = export_pdf(&doc, &fields(1), doc.file_name()).unwrap();
        let text = shown_text(&pdf);
        assert_eq!(text[0][1], b"Reference for: i9.pdf");
    }

    #[test]
    fn undecodable_image_fails_export() {
        let doc = SourceDocument::from_data_uri("data:image/png;base64,AAAA", None).unwrap();
        let err = export_pdf(&doc, &fields(1), None).unwrap_err();
        assert!(err.to_string().starts_with(crate::error::EXPORT_FAILED_MESSAGE));
    }

    #[test]
    fn win_ansi_mapping() {
        assert_eq!(encode_win_ansi("Café • 5€"), b"Caf\xE9 \x95 5\x80");
        assert_eq!(encode_win_ansi("名前\nok"), b"?? ok");
    }
}
