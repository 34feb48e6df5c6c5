//! Image encoding: documents and rendered pages → base64 [`InlineImage`]s.
//!
//! VLM APIs accept images as base64 payloads embedded in the JSON request
//! body. Uploaded photos and scans are forwarded untouched with their own MIME
//! type; only rasterised PDF pages are re-encoded, as lossless PNG so small
//! print next to form fields stays legible.

use crate::document::SourceDocument;
use crate::pipeline::llm::InlineImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
///
/// `detail: "high"` asks GPT-4-class models for the full tile budget; form
/// labels are small and the low-detail single tile loses them.
pub fn encode_page(img: &DynamicImage) -> Result<InlineImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page {}x{} → {} bytes base64", img.width(), img.height(), b64.len());

    Ok(InlineImage::new(b64, "image/png").with_detail("high"))
}

/// Forward an uploaded document as-is.
///
/// Used for image uploads, and for PDFs when the provider reads PDFs natively.
pub fn inline_document(doc: &SourceDocument) -> InlineImage {
    InlineImage::new(doc.base64_data(), doc.mime_type()).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        assert_eq!(data.detail.as_deref(), Some("high"));
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(b"\x89PNG"));
    }

    #[test]
    fn inline_document_keeps_mime_and_payload() {
        let doc = SourceDocument::from_data_uri("data:image/jpeg;base64,/9j/4AAQ", Some("a.jpg"))
            .unwrap();
        let img = inline_document(&doc);
        assert_eq!(img.mime_type, "image/jpeg");
        assert_eq!(img.data, "/9j/4AAQ");
    }
}
