//! Text recognition over raster images.
//!
//! [`OcrBackend`] is the engine seam; [`TesseractCli`] drives the
//! `tesseract` executable. [`OcrEngine`] wraps a backend with the configured
//! languages and the output contract: trimmed text, or the "no text"
//! sentinel, and an error only when the engine itself is unusable.

use std::fmt;
use std::io::ErrorKind;
use std::process::Command;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tracing::{debug, info, warn};

use arbor_core::config::OcrConfig;
use arbor_core::sentinel;

#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine is missing or cannot run at all.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but failed on this image.
    #[error("OCR failed: {0}")]
    Failed(String),

    #[error("Invalid language spec: {0:?}")]
    Languages(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encode error: {0}")]
    Image(#[from] image::ImageError),
}

/// Language codes recognized together, written `por+eng` (or `por-eng`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSpec {
    codes: Vec<String>,
}

impl LanguageSpec {
    pub fn parse(spec: &str) -> Result<Self, OcrError> {
        let codes: Vec<String> = spec
            .split(['+', '-', ',', ' '])
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_lowercase)
            .collect();
        if codes.is_empty() {
            return Err(OcrError::Languages(spec.to_string()));
        }
        Ok(Self { codes })
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}

impl Default for LanguageSpec {
    fn default() -> Self {
        Self {
            codes: vec!["por".into(), "eng".into()],
        }
    }
}

impl fmt::Display for LanguageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.codes.join("+"))
    }
}

/// What an engine reports about itself at startup.
#[derive(Debug, Clone, Default)]
pub struct EngineInfo {
    pub name: String,
    pub version: String,
    pub languages: Vec<String>,
}

/// Trait for OCR engines (tesseract, test fakes).
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Raw recognized text; may be empty or whitespace.
    fn recognize(&self, image: &DynamicImage, languages: &LanguageSpec) -> Result<String, OcrError>;

    /// Version and installed languages. Fails with `Unavailable` when the
    /// engine cannot be started.
    fn probe(&self) -> Result<EngineInfo, OcrError>;
}

/// Runs the `tesseract` command line tool, one process per image.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    page_seg_mode: u32,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, page_seg_mode: u32) -> Self {
        Self {
            command: command.into(),
            page_seg_mode,
        }
    }

    fn run(&self, args: &[&str]) -> Result<std::process::Output, OcrError> {
        Command::new(&self.command).args(args).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                OcrError::Unavailable(format!("'{}' not found on PATH", self.command))
            } else {
                OcrError::Unavailable(format!("could not run '{}': {}", self.command, e))
            }
        })
    }
}

impl OcrBackend for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage, languages: &LanguageSpec) -> Result<String, OcrError> {
        let input = tempfile::Builder::new().suffix(".png").tempfile()?;
        image.save_with_format(input.path(), ImageFormat::Png)?;

        let path = input.path().to_string_lossy().into_owned();
        let lang = languages.to_string();
        let psm = self.page_seg_mode.to_string();
        let output = self.run(&[&path, "stdout", "-l", &lang, "--psm", &psm])?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn probe(&self) -> Result<EngineInfo, OcrError> {
        let version = self.run(&["--version"])?;
        // Older releases print the version on stderr.
        let banner = if version.stdout.is_empty() {
            version.stderr
        } else {
            version.stdout
        };
        let version = String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let langs = self.run(&["--list-langs"])?;
        let listing = if langs.stdout.is_empty() {
            langs.stderr
        } else {
            langs.stdout
        };
        Ok(EngineInfo {
            name: self.name().to_string(),
            version,
            languages: parse_language_listing(&String::from_utf8_lossy(&listing)),
        })
    }
}

/// `List of available languages in "/usr/share/tessdata/" (3):` then one code per line.
fn parse_language_listing(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

/// OCR with a fixed language set and the sentinel output contract.
pub struct OcrEngine {
    backend: Box<dyn OcrBackend>,
    languages: LanguageSpec,
}

impl OcrEngine {
    pub fn new(backend: Box<dyn OcrBackend>, languages: LanguageSpec) -> Self {
        Self { backend, languages }
    }

    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        Ok(Self::new(
            Box::new(TesseractCli::new(config.tesseract_cmd.clone(), config.page_seg_mode)),
            LanguageSpec::parse(&config.languages)?,
        ))
    }

    pub fn languages(&self) -> &LanguageSpec {
        &self.languages
    }

    /// Check the engine can run and has the configured languages.
    ///
    /// Missing languages are only warned about; a missing engine is an error.
    pub fn probe(&self) -> Result<EngineInfo, OcrError> {
        let info = self.backend.probe()?;
        let missing: Vec<&str> = self
            .languages
            .codes()
            .iter()
            .filter(|code| !info.languages.iter().any(|l| l == *code))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!(engine = %info.name, missing = ?missing, "OCR languages not installed");
        }
        info!(engine = %info.name, version = %info.version, languages = %self.languages, "OCR engine ready");
        Ok(info)
    }

    pub fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        self.recognize_with(image, &self.languages)
    }

    /// Trimmed text, or [`sentinel::IMAGE_NO_TEXT`] when nothing was read.
    pub fn recognize_with(
        &self,
        image: &DynamicImage,
        languages: &LanguageSpec,
    ) -> Result<String, OcrError> {
        match self.backend.recognize(image, languages) {
            Ok(text) => {
                let text = text.trim();
                debug!(chars = text.len(), "OCR done");
                if text.is_empty() {
                    Ok(sentinel::IMAGE_NO_TEXT.to_string())
                } else {
                    Ok(text.to_string())
                }
            }
            Err(e @ OcrError::Unavailable(_)) => Err(e),
            Err(e) => {
                warn!(engine = %self.backend.name(), error = %e, "OCR failed on image");
                Ok(sentinel::IMAGE_NO_TEXT.to_string())
            }
        }
    }
}

impl fmt::Debug for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrEngine")
            .field("backend", &self.backend.name())
            .field("languages", &self.languages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Returns scripted results and remembers the languages it was asked for.
    struct FakeOcr {
        result: fn() -> Result<String, OcrError>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FakeOcr {
        fn new(result: fn() -> Result<String, OcrError>) -> Self {
            Self {
                result,
                seen: Arc::default(),
            }
        }
    }

    impl OcrBackend for FakeOcr {
        fn name(&self) -> &str {
            "fake"
        }

        fn recognize(&self, _image: &DynamicImage, languages: &LanguageSpec) -> Result<String, OcrError> {
            self.seen.lock().unwrap().push(languages.to_string());
            (self.result)()
        }

        fn probe(&self) -> Result<EngineInfo, OcrError> {
            Ok(EngineInfo {
                name: "fake".into(),
                version: "1.0".into(),
                languages: vec!["eng".into()],
            })
        }
    }

    fn blank() -> DynamicImage {
        DynamicImage::new_luma8(4, 4)
    }

    #[test]
    fn language_specs() {
        assert_eq!(LanguageSpec::parse("por+eng").unwrap().codes(), ["por", "eng"]);
        assert_eq!(LanguageSpec::parse("POR-eng").unwrap().to_string(), "por+eng");
        assert_eq!(LanguageSpec::parse("spa").unwrap().codes(), ["spa"]);
        assert!(LanguageSpec::parse(" + ").is_err());
    }

    #[test]
    fn output_is_trimmed() {
        let engine = OcrEngine::new(
            Box::new(FakeOcr::new(|| Ok("  Guia Rápido\n\n".into()))),
            LanguageSpec::default(),
        );
        assert_eq!(engine.recognize(&blank()).unwrap(), "Guia Rápido");
    }

    #[test]
    fn empty_result_becomes_sentinel() {
        let engine = OcrEngine::new(
            Box::new(FakeOcr::new(|| Ok(" \n\x0c".into()))),
            LanguageSpec::default(),
        );
        assert_eq!(engine.recognize(&blank()).unwrap(), sentinel::IMAGE_NO_TEXT);
    }

    #[test]
    fn failure_on_one_image_is_not_an_error() {
        let engine = OcrEngine::new(
            Box::new(FakeOcr::new(|| Err(OcrError::Failed("bad image".into())))),
            LanguageSpec::default(),
        );
        assert_eq!(engine.recognize(&blank()).unwrap(), sentinel::IMAGE_NO_TEXT);
    }

    #[test]
    fn missing_engine_is_an_error() {
        let engine = OcrEngine::new(
            Box::new(FakeOcr::new(|| Err(OcrError::Unavailable("gone".into())))),
            LanguageSpec::default(),
        );
        assert!(matches!(engine.recognize(&blank()), Err(OcrError::Unavailable(_))));
    }

    #[test]
    fn languages_are_passed_through() {
        let fake = FakeOcr::new(|| Ok("x".into()));
        let seen = fake.seen.clone();
        let engine = OcrEngine::new(Box::new(fake), LanguageSpec::parse("por").unwrap());
        engine.recognize(&blank()).unwrap();
        engine
            .recognize_with(&blank(), &LanguageSpec::parse("deu+fra").unwrap())
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["por", "deu+fra"]);
        assert_eq!(engine.probe().unwrap().version, "1.0");
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let cli = TesseractCli::new("definitely-not-an-ocr-binary-4711", 3);
        assert!(matches!(cli.probe(), Err(OcrError::Unavailable(_))));
    }

    #[test]
    fn language_listing() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\npor\n";
        assert_eq!(parse_language_listing(listing), vec!["eng", "osd", "por"]);
    }
}
