//! Format dispatch: decide how a document's bytes become text.
//!
//! Routing looks at the content first and only falls back to the file name
//! extension when the bytes are inconclusive. Unreadable or unsupported
//! documents come back as sentinel text so a batch keeps going; the only
//! error that escapes is a missing OCR or PDF capability.

pub mod elements;
mod img;
pub mod pdf;
pub mod sniff;
mod txt;

use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use arbor_core::{sentinel, Config, DocumentKind, ExtractedText, Provenance, RawPayload};

use crate::ocr::{EngineInfo, OcrEngine, OcrError};
use crate::preprocess::ImagePreprocessor;

pub use pdf::{PageContent, PageSource, PdfBackend, PdfError, PdfExtractor, PdfPages, PdfText};
pub use txt::extract_txt;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// OCR engine or every PDF backend is missing. Fatal for a run.
    #[error("Extraction backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<OcrError> for ExtractError {
    fn from(e: OcrError) -> Self {
        ExtractError::BackendUnavailable(e.to_string())
    }
}

/// What to extract from, resolved once here and never re-inspected downstream.
#[derive(Debug, Clone)]
pub enum DocumentInput {
    /// A local file.
    Path(PathBuf),
    /// Raw bytes, e.g. a download.
    Bytes(Vec<u8>),
    /// An image already decoded in memory.
    DecodedImage(DynamicImage),
}

impl From<RawPayload> for DocumentInput {
    fn from(payload: RawPayload) -> Self {
        DocumentInput::Bytes(payload.bytes)
    }
}

/// Routes documents to the text, image/OCR or PDF extractors.
pub struct FormatDispatcher {
    ocr: Arc<OcrEngine>,
    pdf: PdfExtractor,
    preprocessor: ImagePreprocessor,
    detect_elements: bool,
}

impl FormatDispatcher {
    pub fn new(ocr: Arc<OcrEngine>, pdf: PdfExtractor, preprocessor: ImagePreprocessor) -> Self {
        Self {
            ocr,
            pdf,
            preprocessor,
            detect_elements: true,
        }
    }

    /// Toggle listing highlighted buttons found in images.
    pub fn with_element_detection(mut self, enabled: bool) -> Self {
        self.detect_elements = enabled;
        self
    }

    /// Build from configuration and probe the backends.
    ///
    /// Fails when the OCR engine cannot run, so a run stops before any crawl.
    pub fn from_config(config: &Config) -> Result<Self, ExtractError> {
        let ocr = Arc::new(OcrEngine::from_config(&config.ocr)?);
        ocr.probe()?;
        let preprocessor = ImagePreprocessor::new(config.preprocess);
        let pdf = PdfExtractor::from_config(&config.pdf, ocr.clone(), preprocessor)
            .map_err(|e| ExtractError::BackendUnavailable(e.to_string()))?;
        Ok(Self::new(ocr, pdf, preprocessor).with_element_detection(config.ocr.detect_elements))
    }

    pub fn probe(&self) -> Result<EngineInfo, ExtractError> {
        Ok(self.ocr.probe()?)
    }

    pub fn pdf_backends(&self) -> Vec<&'static str> {
        self.pdf.backend_names()
    }

    /// False when scanned PDF pages cannot be rasterized for OCR.
    pub fn pdf_raster_ready(&self) -> bool {
        self.pdf.raster_ready()
    }

    pub fn preprocessor(&self) -> ImagePreprocessor {
        self.preprocessor
    }

    /// Extract a downloaded file, keeping its tree position as provenance.
    pub fn extract_payload(&self, payload: RawPayload) -> Result<ExtractedText, ExtractError> {
        let provenance = Provenance::from_descriptor(&payload.descriptor);
        self.extract(payload.into(), provenance)
    }

    /// Text for one document.
    ///
    /// `provenance.kind` is replaced by the format actually used.
    pub fn extract(
        &self,
        input: DocumentInput,
        mut provenance: Provenance,
    ) -> Result<ExtractedText, ExtractError> {
        let (kind, text) = match input {
            DocumentInput::Path(path) => {
                if provenance.source_name.is_empty() {
                    provenance.source_name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                }
                let bytes = std::fs::read(&path)?;
                self.route(&bytes, &provenance.source_name)?
            }
            DocumentInput::Bytes(bytes) => self.route(&bytes, &provenance.source_name)?,
            DocumentInput::DecodedImage(image) => (
                DocumentKind::Image,
                self.image_text(&image)?,
            ),
        };
        provenance.kind = kind;
        Ok(ExtractedText::new(text, provenance))
    }

    /// Content sniff first, then the name's extension. Unknown formats try
    /// the image path, then the PDF path, before giving up.
    fn route(&self, bytes: &[u8], name: &str) -> Result<(DocumentKind, String), ExtractError> {
        let sniffed = sniff::sniff(bytes);
        let kind = sniffed.unwrap_or_else(|| DocumentKind::from_name(name));
        debug!(name, sniffed = ?sniffed, kind = %kind, bytes = bytes.len(), "routing document");

        let text = match kind {
            DocumentKind::Text => extract_txt(bytes),
            DocumentKind::Image => match img::decode(bytes) {
                Ok(image) => self.image_text(&image)?,
                Err(e) => failed(name, &e.to_string()),
            },
            DocumentKind::Pdf => match self.pdf.extract(bytes) {
                Ok(pdf) => pdf.render(),
                Err(e) => self.pdf_failure(name, e)?,
            },
            DocumentKind::Unknown => return self.probe_unknown(bytes, name),
        };
        Ok((kind, text))
    }

    fn probe_unknown(&self, bytes: &[u8], name: &str) -> Result<(DocumentKind, String), ExtractError> {
        if let Ok(image) = img::decode(bytes) {
            let text = self.image_text(&image)?;
            return Ok((DocumentKind::Image, text));
        }
        match self.pdf.extract(bytes) {
            Ok(pdf) => Ok((DocumentKind::Pdf, pdf.render())),
            Err(PdfError::Ocr(e)) => Err(e.into()),
            Err(_) => {
                debug!(name, "no extractor accepted the document");
                Ok((DocumentKind::Unknown, sentinel::unsupported_format(name)))
            }
        }
    }

    fn image_text(&self, image: &DynamicImage) -> Result<String, OcrError> {
        img::extract_image(image, &self.preprocessor, &self.ocr, self.detect_elements)
    }

    fn pdf_failure(&self, name: &str, error: PdfError) -> Result<String, ExtractError> {
        match error {
            PdfError::Ocr(e) => Err(e.into()),
            other => Ok(failed(name, &other.to_string())),
        }
    }
}

fn failed(name: &str, reason: &str) -> String {
    warn!(name, reason, "extraction failed");
    sentinel::extraction_failed(name, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{LanguageSpec, OcrBackend};
    use arbor_core::PreprocessingConfig;
    use image::ImageFormat;
    use std::io::Cursor;

    struct EchoOcr;

    impl OcrBackend for EchoOcr {
        fn name(&self) -> &str {
            "echo"
        }

        fn recognize(&self, image: &DynamicImage, _languages: &LanguageSpec) -> Result<String, OcrError> {
            Ok(format!("ocr {}x{}", image.width(), image.height()))
        }

        fn probe(&self) -> Result<EngineInfo, OcrError> {
            Ok(EngineInfo::default())
        }
    }

    /// Opens anything and reports one page of text.
    struct OnePagePdf;

    impl PdfBackend for OnePagePdf {
        fn name(&self) -> &'static str {
            "one-page"
        }

        fn open(
            &self,
            bytes: &[u8],
            visit: &mut dyn FnMut(&mut dyn PdfPages) -> Result<(), PdfError>,
        ) -> Result<(), PdfError> {
            if !bytes.starts_with(b"%PDF-") {
                return Err(PdfError::Open("not a pdf".into()));
            }
            struct Page;
            impl PdfPages for Page {
                fn page_count(&self) -> usize {
                    1
                }
                fn page_text(&mut self, _index: usize) -> Result<String, PdfError> {
                    Ok("pdf text".into())
                }
                fn render_page(&mut self, _index: usize, _dpi: u32) -> Result<DynamicImage, PdfError> {
                    Ok(DynamicImage::new_luma8(1, 1))
                }
            }
            visit(&mut Page)
        }
    }

    fn dispatcher() -> FormatDispatcher {
        let ocr = Arc::new(OcrEngine::new(Box::new(EchoOcr), LanguageSpec::default()));
        let pre = ImagePreprocessor::new(PreprocessingConfig::default());
        let pdf = PdfExtractor::new(Arc::new(OnePagePdf), ocr.clone(), pre);
        FormatDispatcher::new(ocr, pdf, pre)
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgb8(w, h)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn sniffed_image_wins_over_pdf_extension() {
        let out = dispatcher()
            .extract(DocumentInput::Bytes(png(3, 2)), Provenance::local("relatorio.pdf"))
            .unwrap();
        assert_eq!(out.text, "ocr 3x2");
        assert_eq!(out.provenance.kind, DocumentKind::Image);
    }

    #[test]
    fn pdf_and_text_routes() {
        let d = dispatcher();
        let pdf = d
            .extract(DocumentInput::Bytes(b"%PDF-1.4 body".to_vec()), Provenance::local("x.bin"))
            .unwrap();
        assert_eq!(pdf.text, "--- Page 1 ---\npdf text");
        assert_eq!(pdf.provenance.kind, DocumentKind::Pdf);

        let txt = d
            .extract(DocumentInput::Bytes(b"  plain words \n".to_vec()), Provenance::local("notes"))
            .unwrap();
        assert_eq!(txt.text, "plain words");
        assert_eq!(txt.provenance.kind, DocumentKind::Text);
    }

    #[test]
    fn extension_decides_when_sniff_is_silent() {
        // Binary noise named like an image: decoding fails, which is data.
        let out = dispatcher()
            .extract(DocumentInput::Bytes(vec![0, 1, 2, 3, 250]), Provenance::local("foto.jpg"))
            .unwrap();
        assert_eq!(out.provenance.kind, DocumentKind::Image);
        assert!(out.text.starts_with("[extraction failed: foto.jpg: "));
    }

    #[test]
    fn unknown_formats_end_in_sentinel() {
        let out = dispatcher()
            .extract(DocumentInput::Bytes(vec![0, 159, 146, 150]), Provenance::local("dados.bin"))
            .unwrap();
        assert_eq!(out.text, "[unsupported format: dados.bin]");
        assert_eq!(out.provenance.kind, DocumentKind::Unknown);
    }

    #[test]
    fn decoded_images_skip_routing() {
        let out = dispatcher()
            .extract(
                DocumentInput::DecodedImage(DynamicImage::new_rgb8(5, 4)),
                Provenance::default(),
            )
            .unwrap();
        assert_eq!(out.text, "ocr 5x4");
    }

    #[test]
    fn highlighted_buttons_are_listed_after_image_text() {
        let mut screen = image::RgbImage::from_pixel(300, 120, image::Rgb([255, 255, 255]));
        for y in 30..70 {
            for x in 20..140 {
                screen.put_pixel(x, y, image::Rgb([255, 220, 0]));
            }
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(screen)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let out = dispatcher()
            .extract(DocumentInput::Bytes(bytes.clone()), Provenance::local("tela.png"))
            .unwrap();
        assert_eq!(
            out.text,
            "ocr 300x120\n\nDetected interface elements:\n- Button 1: 'ocr 120x40'"
        );

        let out = dispatcher()
            .with_element_detection(false)
            .extract(DocumentInput::Bytes(bytes), Provenance::local("tela.png"))
            .unwrap();
        assert_eq!(out.text, "ocr 300x120");
    }

    #[test]
    fn local_paths_take_the_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aviso.txt");
        std::fs::write(&path, "Comunicado importante").unwrap();

        let out = dispatcher()
            .extract(DocumentInput::Path(path), Provenance::default())
            .unwrap();
        assert_eq!(out.provenance.source_name, "aviso.txt");
        assert_eq!(out.annotated(), "[Type: text] [Source: aviso.txt]\n\nComunicado importante");
    }

    #[test]
    fn missing_local_file_is_an_io_error() {
        let err = dispatcher()
            .extract(DocumentInput::Path("/no/such/file.pdf".into()), Provenance::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn payload_keeps_tree_provenance() {
        let descriptor = arbor_core::FileDescriptor::new("1", "aviso.txt", vec!["Comunicados".into()])
            .with_category(arbor_core::Category::Announcement);
        let out = dispatcher()
            .extract_payload(RawPayload {
                descriptor,
                bytes: b"texto".to_vec(),
            })
            .unwrap();
        assert_eq!(out.provenance.depth, 1);
        assert_eq!(out.provenance.folder_path, vec!["Comunicados"]);
        assert_eq!(out.provenance.category, arbor_core::Category::Announcement);
        assert_eq!(out.text, "texto");
    }
}
