//! Content sniffing from leading bytes.

use std::io::Cursor;

use arbor_core::DocumentKind;
use image::ImageReader;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Readers accept the PDF header anywhere in the first kilobyte.
const PDF_HEADER_WINDOW: usize = 1024;

/// Format family decided from the bytes alone, `None` when they say nothing.
pub fn sniff(bytes: &[u8]) -> Option<DocumentKind> {
    if bytes.is_empty() {
        return None;
    }
    if is_pdf(bytes) {
        return Some(DocumentKind::Pdf);
    }
    let image_magic = image::guess_format(bytes).is_ok();
    if image_magic && image_header_decodes(bytes) {
        return Some(DocumentKind::Image);
    }
    // Some image signatures are two ASCII letters (`BM`, `P1`..`P6`), so
    // text wins unless the header really decodes.
    if looks_like_text(bytes) {
        return Some(DocumentKind::Text);
    }
    image_magic.then_some(DocumentKind::Image)
}

fn image_header_decodes(bytes: &[u8]) -> bool {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .is_ok_and(|reader| reader.into_dimensions().is_ok())
}

fn is_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

/// Valid UTF-8 without NUL bytes. A multi-byte sequence cut off at the end
/// of the buffer still counts.
fn looks_like_text(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return false;
    }
    match std::str::from_utf8(bytes) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && bytes.len() - e.valid_up_to() < 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};

    fn png() -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::new_rgb8(2, 2)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn recognizes_families() {
        assert_eq!(sniff(&png()), Some(DocumentKind::Image));
        assert_eq!(sniff(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n"), Some(DocumentKind::Pdf));
        assert_eq!(sniff("Olá, mundo".as_bytes()), Some(DocumentKind::Text));
        assert_eq!(sniff(b"\x00\x01\x02\xff\xfe"), None);
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn pdf_header_after_junk() {
        let mut bytes = b"\r\n\r\ngarbage".to_vec();
        bytes.extend_from_slice(b"%PDF-1.4");
        assert_eq!(sniff(&bytes), Some(DocumentKind::Pdf));
    }

    #[test]
    fn truncated_utf8_is_still_text() {
        // "aç" followed by the first byte of "ã"
        let bytes = &"ação".as_bytes()[..4];
        assert_eq!(sniff(bytes), Some(DocumentKind::Text));
    }

    #[test]
    fn text_with_image_like_prefix_stays_text() {
        assert_eq!(sniff(b"BMW Seguros: procedimento de reembolso"), Some(DocumentKind::Text));
        assert_eq!(sniff(b"P1 - Atendimento"), Some(DocumentKind::Text));

        let mut bmp = Vec::new();
        DynamicImage::new_rgb8(3, 2)
            .write_to(&mut Cursor::new(&mut bmp), ImageFormat::Bmp)
            .unwrap();
        assert_eq!(sniff(&bmp), Some(DocumentKind::Image));
    }

    #[test]
    fn damaged_binary_image_is_still_an_image() {
        let mut bytes = png();
        bytes.truncate(12);
        assert_eq!(sniff(&bytes), Some(DocumentKind::Image));
    }
}
