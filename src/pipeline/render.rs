//! PDF rasterisation: render the first pages of a PDF form via pdfium.
//!
//! Most vision providers only accept raster images, so a PDF upload is
//! rendered page by page before it is sent. pdfium is a C++ library with
//! thread-local state; all calls run inside `spawn_blocking` so Tokio worker
//! threads never stall on CPU-heavy rendering.
//!
//! The longest edge of each page is capped at `max_rendered_pixels` rather
//! than fixing a DPI: forms range from receipts to A3 sheets and the cap keeps
//! every page inside the 1 000–2 000 px range vision models read best.

use crate::config::AssistConfig;
use crate::error::FormEaseError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Environment variable naming an existing pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise up to `config.max_pdf_pages` pages of a PDF.
///
/// # Returns
/// A vector of `(page_index_0based, DynamicImage)` tuples.
pub async fn render_pages(
    pdf_bytes: Vec<u8>,
    name: &str,
    config: &AssistConfig,
) -> Result<Vec<(usize, DynamicImage)>, FormEaseError> {
    let name = name.to_string();
    let max_pixels = config.max_rendered_pixels;
    let max_pages = config.max_pdf_pages;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || {
        render_pages_blocking(pdf_bytes, &name, max_pixels, max_pages, password.as_deref())
    })
    .await
    .map_err(|e| FormEaseError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to pdfium: `PDFIUM_LIB_PATH` first, then a library next to the
/// working directory, then the system library path.
pub fn bind_pdfium() -> Result<Pdfium, FormEaseError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.is_empty() => {
            debug!("Binding pdfium from {}", path);
            Pdfium::bind_to_library(&path)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| FormEaseError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf_bytes: Vec<u8>,
    name: &str,
    max_pixels: u32,
    max_pages: usize,
    password: Option<&str>,
) -> Result<Vec<(usize, DynamicImage)>, FormEaseError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_vec(pdf_bytes, password)
        .map_err(|e| classify_load_error(&format!("{:?}", e), name, password.is_some()))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    if total_pages > max_pages {
        warn!(
            "Form has {} pages; only the first {} are sent to the model",
            total_pages, max_pages
        );
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let count = total_pages.min(max_pages);
    let mut results = Vec::with_capacity(count);

    for idx in 0..count {
        let page = pages
            .get(idx as u16)
            .map_err(|e| FormEaseError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            FormEaseError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        results.push((idx, image));
    }

    Ok(results)
}

/// Map a pdfium load error to the matching [`FormEaseError`].
///
/// pdfium reports password problems through its error text only.
fn classify_load_error(detail: &str, name: &str, had_password: bool) -> FormEaseError {
    if detail.contains("Password") || detail.contains("password") {
        if had_password {
            FormEaseError::WrongPassword {
                name: name.to_string(),
            }
        } else {
            FormEaseError::PasswordRequired {
                name: name.to_string(),
            }
        }
    } else {
        FormEaseError::CorruptPdf {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }
}
