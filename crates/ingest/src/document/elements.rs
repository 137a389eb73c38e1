//! Highlighted interface elements in screenshots.
//!
//! Help-desk guides mark buttons and menu tabs in yellow. Each yellow region
//! large enough to hold a label is cropped and recognized on its own, and the
//! labels are listed after the page text.

use std::collections::VecDeque;

use image::{DynamicImage, RgbImage};

use arbor_core::sentinel;

use crate::ocr::{OcrEngine, OcrError};

/// Regions must be wider and taller than this to count as a button.
pub const MIN_WIDTH: u32 = 50;
pub const MIN_HEIGHT: u32 = 20;

/// Hue window for yellow, in degrees.
const HUE_RANGE: (f32, f32) = (40.0, 80.0);
/// Saturation and value floor on a 0..=255 scale.
const MIN_SATURATION: u8 = 100;
const MIN_VALUE: u8 = 100;

pub const ELEMENTS_HEADER: &str = "Detected interface elements:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiElement {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Bounding box of a connected highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

fn is_highlight(rgb: [u8; 3]) -> bool {
    let [r, g, b] = rgb.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if max < MIN_VALUE as f32 || delta == 0.0 {
        return false;
    }
    if delta * 255.0 < MIN_SATURATION as f32 * max {
        return false;
    }
    let hue = if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    (HUE_RANGE.0..=HUE_RANGE.1).contains(&hue)
}

/// Bounding boxes of 8-connected yellow areas above the size floor, top to
/// bottom then left to right.
pub fn find_regions(image: &DynamicImage) -> Vec<Region> {
    let rgb: RgbImage = image.to_rgb8();
    let (w, h) = rgb.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let mut mask: Vec<bool> = rgb.pixels().map(|p| is_highlight(p.0)).collect();

    let mut regions = Vec::new();
    let mut queue = VecDeque::new();
    for start in 0..mask.len() {
        if !mask[start] {
            continue;
        }
        mask[start] = false;
        queue.push_back(start);
        let (mut x0, mut y0, mut x1, mut y1) = (wu, hu, 0, 0);
        while let Some(i) = queue.pop_front() {
            let (x, y) = (i % wu, i / wu);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
            for ny in y.saturating_sub(1)..=(y + 1).min(hu - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(wu - 1) {
                    let j = ny * wu + nx;
                    if mask[j] {
                        mask[j] = false;
                        queue.push_back(j);
                    }
                }
            }
        }
        let region = Region {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0 + 1) as u32,
            height: (y1 - y0 + 1) as u32,
        };
        if region.width > MIN_WIDTH && region.height > MIN_HEIGHT {
            regions.push(region);
        }
    }
    regions.sort_by_key(|r| (r.y, r.x));
    regions
}

/// Recognize every highlighted region; regions without legible text are
/// dropped.
pub fn detect(image: &DynamicImage, ocr: &OcrEngine) -> Result<Vec<UiElement>, OcrError> {
    let mut elements = Vec::new();
    for region in find_regions(image) {
        let crop = image.crop_imm(region.x, region.y, region.width, region.height);
        let text = ocr.recognize(&crop)?;
        if sentinel::is_sentinel(&text) {
            continue;
        }
        elements.push(UiElement {
            text,
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
        });
    }
    Ok(elements)
}

/// `text` followed by a numbered list of the element labels. When the page
/// itself had nothing legible, the list stands alone.
pub fn append_elements(text: &str, elements: &[UiElement]) -> String {
    if elements.is_empty() {
        return text.to_string();
    }
    let mut out = String::new();
    if text != sentinel::IMAGE_NO_TEXT {
        out.push_str(text);
        out.push_str("\n\n");
    }
    out.push_str(ELEMENTS_HEADER);
    for (i, element) in elements.iter().enumerate() {
        out.push_str(&format!("\n- Button {}: '{}'", i + 1, element.text));
    }
    out
}
