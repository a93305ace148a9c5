//! PDF rasterisation: render slides to PNG via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. `tokio::task::spawn_blocking` moves
//! the work onto the blocking pool so runtime workers never stall.
//!
//! ## Scale, then cap
//!
//! Each page is scaled by `dpi / 72` (PDF user space is 72 units per inch),
//! then clamped so neither edge exceeds `max_rendered_pixels`, preserving the
//! aspect ratio. A slide deck at 200 DPI lands around 2000 × 1125 px.

use crate::config::PipelineConfig;
use crate::error::Pdf2VideoError;
use crate::pipeline::encode::png_bytes;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns PDF pages into PNG images.
///
/// The production implementation is [`PdfiumRenderer`]; tests inject a
/// renderer that fabricates images without pdfium.
#[async_trait]
pub trait SlideRenderer: Send + Sync {
    /// Number of pages (slides) in the document.
    async fn page_count(&self, pdf: &Path) -> Result<usize, Pdf2VideoError>;

    /// Render the given 1-based slides, returning `(slide, png_bytes)` in the
    /// order requested.
    async fn render(
        &self,
        pdf: &Path,
        slides: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>, Pdf2VideoError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    dpi: u32,
    max_rendered_pixels: u32,
    library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_rendered_pixels: u32, library_path: Option<PathBuf>) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
            library_path,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let library_path = config.pdfium_lib_path.clone().or_else(|| {
            std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });
        Self::new(config.dpi, config.max_rendered_pixels, library_path)
    }
}

#[async_trait]
impl SlideRenderer for PdfiumRenderer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, Pdf2VideoError> {
        let path = pdf.to_path_buf();
        let library_path = self.library_path.clone();
        tokio::task::spawn_blocking(move || {
            let pdfium = bind_pdfium(library_path.as_deref())?;
            let document = open_document(&pdfium, &path)?;
            let count = document.pages().len() as usize;
            Ok(count)
        })
        .await
        .map_err(|e| Pdf2VideoError::Internal(format!("Page-count task panicked: {e}")))?
    }

    async fn render(
        &self,
        pdf: &Path,
        slides: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>, Pdf2VideoError> {
        let path = pdf.to_path_buf();
        let this = self.clone();
        let slides = slides.to_vec();
        tokio::task::spawn_blocking(move || this.render_blocking(&path, &slides))
            .await
            .map_err(|e| Pdf2VideoError::Internal(format!("Render task panicked: {e}")))?
    }
}

impl PdfiumRenderer {
    fn render_blocking(
        &self,
        pdf_path: &Path,
        slides: &[usize],
    ) -> Result<Vec<(usize, Vec<u8>)>, Pdf2VideoError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;
        let document = open_document(&pdfium, pdf_path)?;
        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages, rendering {}", total, slides.len());

        let max_px = self.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(max_px)
            .set_maximum_height(max_px);

        let mut results = Vec::with_capacity(slides.len());
        for &slide in slides {
            if slide == 0 || slide > total {
                return Err(Pdf2VideoError::RasterisationFailed {
                    slide,
                    detail: format!("slide out of range (document has {total} pages)"),
                });
            }

            let page = pages
                .get((slide - 1) as u16)
                .map_err(|e| Pdf2VideoError::RasterisationFailed {
                    slide,
                    detail: format!("{e:?}"),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Pdf2VideoError::RasterisationFailed {
                    slide,
                    detail: format!("{e:?}"),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered slide {} → {}x{} px",
                slide,
                image.width(),
                image.height()
            );

            let png = png_bytes(&image).map_err(|e| Pdf2VideoError::RasterisationFailed {
                slide,
                detail: format!("PNG encoding: {e}"),
            })?;
            results.push((slide, png));
        }

        Ok(results)
    }
}

/// Bind to an explicit pdfium library when given, else the system one.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, Pdf2VideoError> {
    let bindings = match library_path {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(path)
            } else {
                path.to_path_buf()
            };
            Pdfium::bind_to_library(&lib).map_err(|e| {
                Pdf2VideoError::PdfiumBindingFailed(format!("{}: {e:?}", lib.display()))
            })?
        }
        None => Pdfium::bind_to_system_library()
            .map_err(|e| Pdf2VideoError::PdfiumBindingFailed(format!("{e:?}")))?,
    };
    Ok(Pdfium::new(bindings))
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
) -> Result<PdfDocument<'a>, Pdf2VideoError> {
    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.contains("Password") || err_str.contains("password") {
            Pdf2VideoError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        } else {
            Pdf2VideoError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    if document.pages().len() == 0 {
        return Err(Pdf2VideoError::EmptyDocument {
            path: pdf_path.to_path_buf(),
        });
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_config_carries_render_settings() {
        let config = PipelineConfig::builder()
            .dpi(150)
            .max_rendered_pixels(1200)
            .pdfium_lib_path("/opt/pdfium/lib")
            .build()
            .unwrap();
        let r = PdfiumRenderer::from_config(&config);
        assert_eq!(r.dpi, 150);
        assert_eq!(r.max_rendered_pixels, 1200);
        assert_eq!(r.library_path, Some(PathBuf::from("/opt/pdfium/lib")));
    }

    #[test]
    fn missing_library_is_a_binding_error() {
        match bind_pdfium(Some(Path::new("/nonexistent/libpdfium.so"))) {
            Err(Pdf2VideoError::PdfiumBindingFailed(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("binding a missing library should fail"),
        }
    }
}
