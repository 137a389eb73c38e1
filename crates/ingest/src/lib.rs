//! Text extraction for documents pulled from a remote tree.
//!
//! - `document`: format sniffing and the `FormatDispatcher`, PDF extraction
//! - `preprocess`: the image clean-up chain run before OCR
//! - `ocr`: the `OcrBackend` seam and the tesseract engine
//! - `pipeline`: crawl, fetch and extract with bounded concurrency

pub mod document;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;

pub use document::{DocumentInput, ExtractError, FormatDispatcher, PdfExtractor};
pub use ocr::{EngineInfo, LanguageSpec, OcrBackend, OcrEngine, OcrError, TesseractCli};
pub use pipeline::{FileFailure, Pipeline, PipelineError, PipelineOutput};
pub use preprocess::ImagePreprocessor;
