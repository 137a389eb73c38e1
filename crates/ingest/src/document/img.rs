use image::DynamicImage;

use tracing::debug;

use super::elements;
use crate::ocr::{OcrEngine, OcrError};
use crate::preprocess::ImagePreprocessor;

/// Decode any raster format the `image` crate knows.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Preprocess and recognize; the sentinel when nothing is legible.
///
/// With `detect_elements`, highlighted buttons are found on the original
/// colours and their labels appended.
pub fn extract_image(
    image: &DynamicImage,
    preprocessor: &ImagePreprocessor,
    ocr: &OcrEngine,
    detect_elements: bool,
) -> Result<String, OcrError> {
    let cleaned = preprocessor.apply(image);
    let text = ocr.recognize(&cleaned)?;
    if !detect_elements {
        return Ok(text);
    }
    let found = elements::detect(image, ocr)?;
    debug!(elements = found.len(), "interface elements");
    Ok(elements::append_elements(&text, &found))
}
