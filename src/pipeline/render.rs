//! PDF rasterisation via pdfium.
//!
//! [`PageRenderer`] is the seam between the run and pdfium: the cache in
//! [`super::cache`] only ever sees this trait, so tests substitute an
//! in-memory renderer and never load a native library.
//!
//! pdfium uses thread-local state and is not async-safe, so every call runs
//! inside `tokio::task::spawn_blocking`. Each call binds and opens the
//! document afresh; rendering dominates the cost and this keeps the renderer
//! `Send + Sync` without holding pdfium handles across awaits.

use crate::error::{MagnifierError, RasterizationError};
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Renders single pages of a PDF.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Number of pages in the document.
    async fn page_count(&self, pdf: &Path) -> Result<usize, MagnifierError>;

    /// Render 1-based `page` at `dpi`. Must be deterministic for identical inputs.
    async fn render_page(
        &self,
        pdf: &Path,
        page: usize,
        dpi: u32,
    ) -> Result<DynamicImage, RasterizationError>;
}

/// Title and author from the PDF info dictionary.
#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    max_rendered_pixels: u32,
    password: Option<String>,
}

impl PdfiumRenderer {
    pub fn new(max_rendered_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_rendered_pixels,
            password,
        }
    }

    /// Read page count and basic metadata without rendering anything.
    pub async fn metadata(&self, pdf: &Path) -> Result<PdfMetadata, MagnifierError> {
        let path = pdf.to_path_buf();
        let password = self.password.clone();
        tokio::task::spawn_blocking(move || metadata_blocking(&path, password.as_deref()))
            .await
            .map_err(|e| MagnifierError::Internal(format!("Metadata task panicked: {}", e)))?
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn page_count(&self, pdf: &Path) -> Result<usize, MagnifierError> {
        Ok(self.metadata(pdf).await?.page_count)
    }

    async fn render_page(
        &self,
        pdf: &Path,
        page: usize,
        dpi: u32,
    ) -> Result<DynamicImage, RasterizationError> {
        let path = pdf.to_path_buf();
        let password = self.password.clone();
        let max_pixels = self.max_rendered_pixels;

        tokio::task::spawn_blocking(move || {
            render_page_blocking(&path, password.as_deref(), page, dpi, max_pixels)
        })
        .await
        .map_err(|e| RasterizationError::Render {
            page,
            detail: format!("render task panicked: {e}"),
        })?
    }
}

fn bind() -> Result<Pdfium, MagnifierError> {
    pdfium_auto::bind_pdfium().map_err(|e| MagnifierError::PdfiumBindingFailed(e.to_string()))
}

fn open_error(path: &Path, password: Option<&str>, e: PdfiumError) -> MagnifierError {
    let detail = format!("{:?}", e);
    if detail.to_lowercase().contains("password") {
        let path: PathBuf = path.to_path_buf();
        if password.is_some() {
            MagnifierError::WrongPassword { path }
        } else {
            MagnifierError::PasswordRequired { path }
        }
    } else {
        MagnifierError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    }
}

fn render_page_blocking(
    pdf: &Path,
    password: Option<&str>,
    page: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<DynamicImage, RasterizationError> {
    let render_err = |detail: String| RasterizationError::Render { page, detail };

    let pdfium = bind().map_err(|e| render_err(e.to_string()))?;
    let document = pdfium
        .load_pdf_from_file(pdf, password)
        .map_err(|e| render_err(open_error(pdf, password, e).to_string()))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page == 0 || page > total {
        return Err(RasterizationError::OutOfRange { page, total });
    }

    let pdf_page = pages
        .get((page - 1) as u16)
        .map_err(|e| render_err(format!("{:?}", e)))?;

    // PDF user space is 72 units per inch.
    let config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = pdf_page
        .render_with_config(&config)
        .map_err(|e| render_err(format!("{:?}", e)))?;
    let image = bitmap.as_image();

    debug!(
        "Rendered page {} at {} DPI → {}x{} px",
        page,
        dpi,
        image.width(),
        image.height()
    );
    Ok(image)
}

fn metadata_blocking(pdf: &Path, password: Option<&str>) -> Result<PdfMetadata, MagnifierError> {
    let pdfium = bind()?;
    let document = pdfium
        .load_pdf_from_file(pdf, password)
        .map_err(|e| open_error(pdf, password, e))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata
            .get(tag)
            .map(|t| t.value().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(PdfMetadata {
        page_count: document.pages().len() as usize,
        title: get_meta(PdfDocumentMetadataTagType::Title),
        author: get_meta(PdfDocumentMetadataTagType::Author),
    })
}
