//! Pure-Rust text layer (`pdf-extract`) plus `pdftoppm` for rasterizing.
//! When the text layer cannot be parsed, `pdfinfo` supplies the page count
//! and every page goes through OCR.

use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::process::Command;

use image::DynamicImage;
use tempfile::NamedTempFile;
use tracing::warn;

use super::{PdfBackend, PdfError, PdfPages};

pub struct PopplerBackend {
    pdftoppm: String,
    pdfinfo: String,
}

impl PopplerBackend {
    pub fn new(pdftoppm: impl Into<String>) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            pdfinfo: "pdfinfo".into(),
        }
    }

    pub fn with_pdfinfo(mut self, pdfinfo: impl Into<String>) -> Self {
        self.pdfinfo = pdfinfo.into();
        self
    }

    /// Page count from `pdfinfo`, for files pdf-extract cannot parse.
    fn count_pages(&self, file: &NamedTempFile) -> Result<usize, PdfError> {
        let output = Command::new(&self.pdfinfo)
            .arg(file.path())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PdfError::Unavailable(format!("'{}' not found on PATH", self.pdfinfo)),
                _ => PdfError::Io(e),
            })?;
        if !output.status.success() {
            return Err(PdfError::Open(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        parse_pdfinfo_pages(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| PdfError::Open("pdfinfo reported no page count".into()))
    }

    /// Whether `pdftoppm` can be started; without it pages cannot be rasterized.
    pub fn can_render(&self) -> bool {
        Command::new(&self.pdftoppm)
            .arg("-v")
            .output()
            .is_ok()
    }
}

/// Text of every page. pdf-extract panics on some malformed files, so a
/// panic counts as a failure to open.
fn text_by_pages(bytes: &[u8]) -> Result<Vec<String>, PdfError> {
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem_by_pages(bytes))) {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(PdfError::Open(e.to_string())),
        Err(_) => Err(PdfError::Open("pdf-extract panicked while parsing".into())),
    }
}

/// The `Pages:` line of `pdfinfo` output.
fn parse_pdfinfo_pages(output: &str) -> Option<usize> {
    output.lines().find_map(|line| {
        let value = line.strip_prefix("Pages:")?;
        value.trim().parse().ok()
    })
}

fn spool_bytes(bytes: &[u8]) -> Result<NamedTempFile, PdfError> {
    let file = tempfile::Builder::new().suffix(".pdf").tempfile()?;
    std::fs::write(file.path(), bytes)?;
    Ok(file)
}

struct PopplerPages<'a> {
    bytes: &'a [u8],
    texts: Vec<String>,
    pdftoppm: &'a str,
    /// Written on first render and reused for later pages.
    spool: Option<NamedTempFile>,
}

impl PopplerPages<'_> {
    fn spool(&mut self) -> Result<&NamedTempFile, PdfError> {
        if self.spool.is_none() {
            self.spool = Some(spool_bytes(self.bytes)?);
        }
        self.spool
            .as_ref()
            .ok_or_else(|| PdfError::Open("spool file missing".into()))
    }
}

impl PdfPages for PopplerPages<'_> {
    fn page_count(&self) -> usize {
        self.texts.len()
    }

    fn page_text(&mut self, index: usize) -> Result<String, PdfError> {
        self.texts.get(index).cloned().ok_or(PdfError::Page {
            page: index + 1,
            message: "no such page".into(),
        })
    }

    fn render_page(&mut self, index: usize, dpi: u32) -> Result<DynamicImage, PdfError> {
        let pdftoppm = self.pdftoppm.to_string();
        let input = self.spool()?.path().to_path_buf();
        let out_dir = tempfile::tempdir()?;
        let prefix = out_dir.path().join("page");
        let page = (index + 1).to_string();

        let output = Command::new(&pdftoppm)
            .args(["-r", &dpi.to_string(), "-f", &page, "-l", &page, "-png", "-singlefile"])
            .arg(&input)
            .arg(&prefix)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PdfError::Unavailable(format!("'{}' not found on PATH", pdftoppm)),
                _ => PdfError::Io(e),
            })?;
        if !output.status.success() {
            return Err(PdfError::Page {
                page: index + 1,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(image::open(prefix.with_extension("png"))?)
    }
}

impl PdfBackend for PopplerBackend {
    fn name(&self) -> &'static str {
        "poppler"
    }

    fn open(
        &self,
        bytes: &[u8],
        visit: &mut dyn FnMut(&mut dyn PdfPages) -> Result<(), PdfError>,
    ) -> Result<(), PdfError> {
        let (texts, spool) = match text_by_pages(bytes) {
            Ok(texts) => (texts, None),
            Err(open_err) => {
                // Scans and odd encoders often break the text parser while
                // pdftoppm can still draw them.
                let file = spool_bytes(bytes)?;
                match self.count_pages(&file) {
                    Ok(count) => {
                        warn!(pages = count, error = %open_err, "text layer unreadable, rasterizing every page");
                        (vec![String::new(); count], Some(file))
                    }
                    Err(_) => return Err(open_err),
                }
            }
        };
        let mut pages = PopplerPages {
            bytes,
            texts,
            pdftoppm: &self.pdftoppm,
            spool,
        };
        visit(&mut pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_does_not_open() {
        let backend = PopplerBackend::new("pdftoppm").with_pdfinfo("no-such-pdfinfo-4711");
        let err = backend.open(b"not a pdf at all", &mut |_| Ok(())).unwrap_err();
        assert!(matches!(err, PdfError::Open(_)));
    }

    #[test]
    fn missing_rasterizer_is_reported() {
        let backend = PopplerBackend::new("no-such-pdftoppm-4711");
        assert!(!backend.can_render());
    }

    #[test]
    fn pdfinfo_page_count_is_read() {
        let output = "Producer:       Scanner 3000\nTagged:         no\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_pages(output), Some(12));
        assert_eq!(parse_pdfinfo_pages("Title: Pages: 3\n"), None);
        assert_eq!(parse_pdfinfo_pages("Pages: many\n"), None);
    }

    #[cfg(unix)]
    #[test]
    fn unparseable_text_layer_falls_back_to_pdfinfo() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-pdfinfo");
        std::fs::write(&script, "#!/bin/sh\necho 'Pages:          3'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = PopplerBackend::new("pdftoppm").with_pdfinfo(script.to_string_lossy());
        let mut seen = Vec::new();
        backend
            .open(b"%PDF-1.4 truncated", &mut |pages| {
                for i in 0..pages.page_count() {
                    seen.push(pages.page_text(i)?);
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![String::new(); 3]);
    }
}
