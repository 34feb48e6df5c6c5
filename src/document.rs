//! The uploaded document, held as a data URI.
//!
//! A form enters the tool as raw bytes (local file or download) and is kept
//! as `data:<mime>;base64,<payload>` for its whole lifetime. That is the shape
//! every VLM API wants for inline attachments, and it embeds directly into the
//! SVG preview.

use crate::error::FormEaseError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^data:(.+);base64,(.+)$").unwrap());

/// MIME type assumed when a data URI carries no header.
const FALLBACK_MIME: &str = "image/jpeg";

/// An uploaded form: an image or a PDF.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDocument {
    mime_type: String,
    data: String,
    file_name: Option<String>,
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("mime_type", &self.mime_type)
            .field("base64_len", &self.data.len())
            .field("file_name", &self.file_name)
            .finish()
    }
}

impl SourceDocument {
    /// Wrap raw file bytes, detecting the MIME type from magic bytes first and
    /// from the file extension second.
    ///
    /// Only `image/*` and `application/pdf` are accepted.
    pub fn from_bytes(bytes: &[u8], file_name: Option<&str>) -> Result<Self, FormEaseError> {
        if bytes.is_empty() {
            return Err(FormEaseError::EmptyDocument {
                name: file_name.unwrap_or("document").to_string(),
            });
        }

        let mime = sniff_mime(bytes)
            .or_else(|| file_name.and_then(mime_from_extension))
            .unwrap_or("application/octet-stream");

        if !is_accepted_mime(mime) {
            return Err(FormEaseError::UnsupportedFileType {
                mime: mime.to_string(),
            });
        }

        Ok(Self {
            mime_type: mime.to_string(),
            data: STANDARD.encode(bytes),
            file_name: file_name.map(str::to_string),
        })
    }

    /// Parse a `data:<mime>;base64,<payload>` URI.
    ///
    /// A string that does not match is treated as a bare JPEG payload: the
    /// part after the first comma, or the whole string when there is none.
    pub fn from_data_uri(uri: &str, file_name: Option<&str>) -> Result<Self, FormEaseError> {
        let (mime, data) = split_data_uri(uri);
        if data.is_empty() {
            return Err(FormEaseError::EmptyDocument {
                name: file_name.unwrap_or("document").to_string(),
            });
        }
        if !is_accepted_mime(&mime) {
            return Err(FormEaseError::UnsupportedFileType { mime });
        }
        Ok(Self {
            mime_type: mime,
            data: data.to_string(),
            file_name: file_name.map(str::to_string),
        })
    }

    /// Read a local file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FormEaseError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FormEaseError::FileNotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => FormEaseError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => FormEaseError::Internal(format!("read {}: {e}", path.display())),
        })?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        Self::from_bytes(&bytes, name.as_deref())
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// The base64 payload without the `data:` header.
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// True for PDF uploads. PDFs get a data sheet instead of a visual overlay.
    pub fn is_pdf(&self) -> bool {
        self.mime_type.starts_with("application/pdf")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Decode the payload back to raw bytes.
    pub fn decoded_bytes(&self) -> Result<Vec<u8>, FormEaseError> {
        STANDARD
            .decode(self.data.trim())
            .map_err(|e| FormEaseError::InvalidDataUri(e.to_string()))
    }

    /// Display name: the file name, or `fallback`.
    pub fn display_name<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.file_name.as_deref().unwrap_or(fallback)
    }
}

/// Split a data URI into `(mime, payload)`, falling back to JPEG.
pub fn split_data_uri(uri: &str) -> (String, &str) {
    if let Some(caps) = RE_DATA_URI.captures(uri) {
        if let (Some(mime), Some(data)) = (caps.get(1), caps.get(2)) {
            return (mime.as_str().to_string(), data.as_str());
        }
    }
    let data = uri.split_once(',').map(|(_, rest)| rest).unwrap_or(uri);
    (FALLBACK_MIME.to_string(), data)
}

fn is_accepted_mime(mime: &str) -> bool {
    mime.starts_with("image/") || mime == "application/pdf"
}

/// Detect a MIME type from the leading bytes of a file.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xFF\xD8\xFF", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"BM", "image/bmp"),
        (b"II*\x00", "image/tiff"),
        (b"MM\x00*", "image/tiff"),
    ];
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    SIGNATURES
        .iter()
        .find(|(magic, _)| bytes.starts_with(magic))
        .map(|(_, mime)| *mime)
}

/// Guess a MIME type from a file name's extension.
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(mime)
}
