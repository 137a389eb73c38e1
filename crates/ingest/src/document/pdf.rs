//! PDF text extraction with per-page OCR fallback.
//!
//! Each page first tries its embedded text layer. A page whose text layer is
//! empty is rendered at [`RASTER_DPI`] and sent through the preprocessor and
//! the OCR engine instead. Two backends can open documents; the primary one
//! is chosen at startup and the other is tried when it cannot open a file.

mod poppler;

#[cfg(feature = "pdfium")]
mod pdfium;

use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use arbor_core::config::{PdfConfig, RASTER_DPI};
use arbor_core::sentinel;

use crate::ocr::{OcrEngine, OcrError};
use crate::preprocess::ImagePreprocessor;

pub use poppler::PopplerBackend;

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumBackend;

#[derive(Debug, Error)]
pub enum PdfError {
    /// The backend cannot work on this machine (library or tool missing).
    #[error("PDF backend unavailable: {0}")]
    Unavailable(String),

    #[error("Could not open PDF: {0}")]
    Open(String),

    #[error("Page {page}: {message}")]
    Page { page: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Ocr(#[from] OcrError),
}

impl PdfError {
    /// Errors that say nothing about the document and must not be retried
    /// with another backend.
    fn is_fatal(&self) -> bool {
        matches!(self, PdfError::Ocr(OcrError::Unavailable(_)))
    }
}

/// Page access inside an opened document. Indices are zero-based.
pub trait PdfPages {
    fn page_count(&self) -> usize;

    /// Embedded text of one page, possibly empty.
    fn page_text(&mut self, index: usize) -> Result<String, PdfError>;

    /// Rasterize one page at `dpi`.
    fn render_page(&mut self, index: usize, dpi: u32) -> Result<DynamicImage, PdfError>;
}

/// A library able to open PDF documents.
pub trait PdfBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open `bytes` and pass the document to `visit`.
    ///
    /// Errors raised before `visit` runs mean the document could not be
    /// opened by this backend; errors from `visit` are passed through.
    fn open(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn PdfPages) -> Result<(), PdfError>,
    ) -> Result<(), PdfError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    /// Embedded text layer.
    Native,
    /// Rendered and recognized.
    Ocr,
}

/// Text of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    /// 1-based page number.
    pub page_number: usize,
    pub text: String,
    pub source: PageSource,
}

/// Result of extracting one document.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub backend: &'static str,
    pub page_count: usize,
    pub pages: Vec<PageContent>,
}

impl PdfText {
    /// Pages in order with `--- Page N ---` headers; sentinel pages are left
    /// out. No usable page at all gives the PDF sentinel.
    pub fn render(&self) -> String {
        let blocks: Vec<String> = self
            .pages
            .iter()
            .filter(|p| !sentinel::is_sentinel(&p.text) && !p.text.trim().is_empty())
            .map(|p| match p.source {
                PageSource::Native => format!("--- Page {} ---\n{}", p.page_number, p.text),
                PageSource::Ocr => format!("--- Page {} (OCR) ---\n{}", p.page_number, p.text),
            })
            .collect();
        if blocks.is_empty() {
            sentinel::PDF_NO_TEXT.to_string()
        } else {
            blocks.join("\n\n")
        }
    }

    pub fn ocr_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.source == PageSource::Ocr).count()
    }
}

/// Per-page native text or OCR, over a primary and an optional fallback backend.
pub struct PdfExtractor {
    primary: Arc<dyn PdfBackend>,
    fallback: Option<Arc<dyn PdfBackend>>,
    ocr: Arc<OcrEngine>,
    preprocessor: ImagePreprocessor,
    max_pages: Option<usize>,
    raster_ready: bool,
}

impl PdfExtractor {
    pub fn new(primary: Arc<dyn PdfBackend>, ocr: Arc<OcrEngine>, preprocessor: ImagePreprocessor) -> Self {
        Self {
            primary,
            fallback: None,
            ocr,
            preprocessor,
            max_pages: None,
            raster_ready: true,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn PdfBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Pick backends from `PDF_BACKEND` and what this machine provides.
    ///
    /// `auto` prefers pdfium when it is compiled in and its library loads.
    pub fn from_config(
        config: &PdfConfig,
        ocr: Arc<OcrEngine>,
        preprocessor: ImagePreprocessor,
    ) -> Result<Self, PdfError> {
        let poppler_backend =
            PopplerBackend::new(config.pdftoppm_cmd.clone()).with_pdfinfo(config.pdfinfo_cmd.clone());
        let can_render = poppler_backend.can_render();
        if !can_render {
            warn!(
                cmd = %config.pdftoppm_cmd,
                "pdftoppm not found; poppler cannot rasterize pages without a text layer"
            );
        }
        let poppler: Arc<dyn PdfBackend> = Arc::new(poppler_backend);
        let pdfium = pdfium_backend();

        let (primary, fallback) = match (config.backend.as_str(), pdfium) {
            ("poppler", Some(pdfium)) if !can_render => {
                warn!("PDF_BACKEND=poppler but pdftoppm is missing, using pdfium first");
                (pdfium, Some(poppler))
            }
            ("poppler", pdfium) => (poppler, pdfium),
            ("pdfium", None) => {
                return Err(PdfError::Unavailable(
                    "PDF_BACKEND=pdfium but the pdfium library is not available".into(),
                ))
            }
            (_, Some(pdfium)) => (pdfium, Some(poppler)),
            (_, None) => (poppler, None),
        };
        // pdfium renders in-process; poppler needs pdftoppm.
        let raster_ready = primary.name() != "poppler" || can_render;
        info!(
            primary = primary.name(),
            fallback = fallback.as_ref().map(|b| b.name()).unwrap_or("none"),
            max_pages = ?config.max_pages,
            raster_ready,
            "PDF backends selected"
        );

        let mut extractor = Self::new(primary, ocr, preprocessor).with_max_pages(config.max_pages);
        extractor.fallback = fallback;
        extractor.raster_ready = raster_ready;
        Ok(extractor)
    }

    /// Whether the primary backend can render pages for OCR.
    pub fn raster_ready(&self) -> bool {
        self.raster_ready
    }

    pub fn backend_names(&self) -> Vec<&'static str> {
        std::iter::once(self.primary.name())
            .chain(self.fallback.as_ref().map(|b| b.name()))
            .collect()
    }

    /// Extract all pages, falling back to the alternate backend when the
    /// primary cannot open the document.
    pub fn extract(&self, bytes: &[u8]) -> Result<PdfText, PdfError> {
        match self.extract_with(self.primary.as_ref(), bytes) {
            Ok(text) => Ok(text),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => match &self.fallback {
                Some(fallback) => {
                    warn!(
                        primary = self.primary.name(),
                        fallback = fallback.name(),
                        error = %e,
                        "primary PDF backend failed, trying fallback"
                    );
                    self.extract_with(fallback.as_ref(), bytes)
                }
                None => Err(e),
            },
        }
    }

    fn extract_with(&self, backend: &dyn PdfBackend, bytes: &[u8]) -> Result<PdfText, PdfError> {
        let mut result = PdfText {
            backend: backend.name(),
            page_count: 0,
            pages: Vec::new(),
        };
        backend.open(bytes, &mut |doc| {
            result.page_count = doc.page_count();
            let limit = self
                .max_pages
                .map_or(result.page_count, |max| max.min(result.page_count));
            for index in 0..limit {
                result.pages.push(self.page(doc, index)?);
            }
            Ok(())
        })?;
        debug!(
            backend = result.backend,
            pages = result.page_count,
            ocr_pages = result.ocr_pages(),
            "PDF extracted"
        );
        Ok(result)
    }

    /// NativeText, then RasterFallback when the text layer is empty.
    fn page(&self, doc: &mut dyn PdfPages, index: usize) -> Result<PageContent, PdfError> {
        let page_number = index + 1;
        match doc.page_text(index) {
            Ok(text) if !text.trim().is_empty() => {
                return Ok(PageContent {
                    page_number,
                    text: text.trim().to_string(),
                    source: PageSource::Native,
                })
            }
            Ok(_) => debug!(page = page_number, "no text layer, rasterizing"),
            Err(e) => debug!(page = page_number, error = %e, "text layer unreadable, rasterizing"),
        }

        let text = match doc.render_page(index, RASTER_DPI) {
            Ok(image) => {
                let cleaned = self.preprocessor.apply(&image);
                self.ocr.recognize(&cleaned)?
            }
            // A missing rasterizer says nothing about the page; let the
            // caller try the other backend.
            Err(e @ PdfError::Unavailable(_)) => return Err(e),
            Err(e) => {
                warn!(page = page_number, error = %e, "could not render page");
                sentinel::IMAGE_NO_TEXT.to_string()
            }
        };
        Ok(PageContent {
            page_number,
            text,
            source: PageSource::Ocr,
        })
    }
}

#[cfg(feature = "pdfium")]
fn pdfium_backend() -> Option<Arc<dyn PdfBackend>> {
    match PdfiumBackend::bind() {
        Ok(backend) => Some(Arc::new(backend)),
        Err(e) => {
            warn!(error = %e, "pdfium library not available");
            None
        }
    }
}

#[cfg(not(feature = "pdfium"))]
fn pdfium_backend() -> Option<Arc<dyn PdfBackend>> {
    None
}
