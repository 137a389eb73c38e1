//! Native pdfium bindings (`pdfium` feature).

use std::sync::Mutex;

use image::DynamicImage;
use pdfium_render::prelude::*;

use super::{PdfBackend, PdfError, PdfPages};

/// Holds the pdfium library bound at startup. pdfium is not re-entrant, so
/// documents are processed one at a time.
pub struct PdfiumBackend {
    pdfium: Mutex<Pdfium>,
}

impl PdfiumBackend {
    /// Fails when no pdfium shared library can be loaded.
    pub fn bind() -> Result<Self, PdfError> {
        let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())
            .map_err(|e| PdfError::Unavailable(e.to_string()))?;
        Ok(Self {
            pdfium: Mutex::new(Pdfium::new(bindings)),
        })
    }
}

struct PdfiumPages<'d, 'a> {
    document: &'d PdfDocument<'a>,
}

impl PdfiumPages<'_, '_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, PdfError> {
        let page_error = |message: String| PdfError::Page {
            page: index + 1,
            message,
        };
        let index = u16::try_from(index).map_err(|_| page_error("page index out of range".into()))?;
        self.document
            .pages()
            .get(index)
            .map_err(|e| page_error(e.to_string()))
    }
}

impl PdfPages for PdfiumPages<'_, '_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&mut self, index: usize) -> Result<String, PdfError> {
        let page = self.page(index)?;
        let text = page.text().map_err(|e| PdfError::Page {
            page: index + 1,
            message: e.to_string(),
        })?;
        Ok(text.all())
    }

    fn render_page(&mut self, index: usize, dpi: u32) -> Result<DynamicImage, PdfError> {
        let page = self.page(index)?;
        // PDF user space is 72 units per inch.
        let config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / 72.0)
            .render_form_data(true)
            .render_annotations(true);
        let bitmap = page.render_with_config(&config).map_err(|e| PdfError::Page {
            page: index + 1,
            message: e.to_string(),
        })?;
        Ok(bitmap.as_image())
    }
}

impl PdfBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn open(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn PdfPages) -> Result<(), PdfError>,
    ) -> Result<(), PdfError> {
        let pdfium = self
            .pdfium
            .lock()
            .map_err(|_| PdfError::Unavailable("pdfium lock poisoned".into()))?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| PdfError::Open(e.to_string()))?;
        visit(&mut PdfiumPages {
            document: &document,
        })
    }
}
