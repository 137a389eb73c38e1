//! Image clean-up before OCR.
//!
//! Transforms run in a fixed order whatever subset is enabled:
//! alpha-strip, grayscale, contrast, denoise, sharpen, binarize.
//! Denoise comes before sharpen so noise is not amplified, and binarize is
//! last because it throws information away.

use image::{imageops, DynamicImage, GrayImage, RgbImage};

use arbor_core::PreprocessingConfig;

/// Contrast multiplier applied around the mean luminance.
pub const CONTRAST_FACTOR: f32 = 2.0;

/// Luminance above which a pixel becomes white when binarizing.
pub const BINARIZE_THRESHOLD: u8 = 128;

/// Classic 3x3 sharpen kernel; `filter3x3` normalizes it by its sum of 16.
const SHARPEN_KERNEL: [f32; 9] = [-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0];

#[derive(Debug, Clone, Copy, Default)]
pub struct ImagePreprocessor {
    config: PreprocessingConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PreprocessingConfig {
        self.config
    }

    /// Return a cleaned-up copy of `image`; the input is never modified.
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        let c = self.config;

        // Re-binarizing a black and white image must not change it.
        if c.binarize && is_bilevel(image) {
            return image.clone();
        }

        let mut raster = Raster::without_alpha(image);
        if c.grayscale {
            raster = raster.into_gray();
        }
        if c.contrast_boost {
            raster.boost_contrast(CONTRAST_FACTOR);
        }
        if c.denoise {
            raster.map_neighbourhood(median);
        }
        if c.sharpen {
            raster = raster.sharpen();
        }
        if c.binarize {
            raster = raster.into_gray();
            raster.threshold(BINARIZE_THRESHOLD);
        }
        raster.into_dynamic()
    }
}

/// Single-channel image holding only pure black and pure white.
fn is_bilevel(image: &DynamicImage) -> bool {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.as_raw().iter().all(|&v| v == 0 || v == 255),
        _ => false,
    }
}

/// Interleaved 8-bit pixels with one (gray) or three (RGB) channels.
struct Raster {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
}

impl Raster {
    fn without_alpha(image: &DynamicImage) -> Self {
        let gray_source = matches!(
            image,
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_)
        );
        if gray_source {
            let gray = image.to_luma8();
            Self::gray(gray)
        } else {
            Self::rgb(image.to_rgb8())
        }
    }

    fn rgb(rgb: RgbImage) -> Self {
        Self {
            width: rgb.width(),
            height: rgb.height(),
            channels: 3,
            data: rgb.into_raw(),
        }
    }

    fn gray(gray: GrayImage) -> Self {
        Self {
            width: gray.width(),
            height: gray.height(),
            channels: 1,
            data: gray.into_raw(),
        }
    }

    fn into_gray(self) -> Self {
        if self.channels == 1 {
            return self;
        }
        Self::gray(self.into_dynamic().to_luma8())
    }

    fn into_dynamic(self) -> DynamicImage {
        let (w, h) = (self.width, self.height);
        if self.channels == 1 {
            GrayImage::from_raw(w, h, self.data)
                .map(DynamicImage::ImageLuma8)
                .unwrap_or_else(|| DynamicImage::new_luma8(w, h))
        } else {
            RgbImage::from_raw(w, h, self.data)
                .map(DynamicImage::ImageRgb8)
                .unwrap_or_else(|| DynamicImage::new_rgb8(w, h))
        }
    }

    /// Mean luminance, rounded to the nearest level.
    fn mean_luma(&self) -> f32 {
        let pixels = self.data.len() / self.channels;
        if pixels == 0 {
            return 0.0;
        }
        let sum: f64 = self
            .data
            .chunks_exact(self.channels)
            .map(|px| match px {
                [v] => *v as f64,
                [r, g, b] => 0.299 * *r as f64 + 0.587 * *g as f64 + 0.114 * *b as f64,
                _ => 0.0,
            })
            .sum();
        (sum / pixels as f64 + 0.5).floor() as f32
    }

    fn boost_contrast(&mut self, factor: f32) {
        let mean = self.mean_luma();
        for v in &mut self.data {
            *v = clamp_u8(mean + factor * (*v as f32 - mean));
        }
    }

    fn sharpen(self) -> Self {
        match self.into_dynamic() {
            DynamicImage::ImageLuma8(gray) => Self::gray(imageops::filter3x3(&gray, &SHARPEN_KERNEL)),
            other => Self::rgb(imageops::filter3x3(&other.to_rgb8(), &SHARPEN_KERNEL)),
        }
    }

    fn threshold(&mut self, level: u8) {
        for v in &mut self.data {
            *v = if *v > level { 255 } else { 0 };
        }
    }

    /// Replace every sample with `f` of its 3x3 neighbourhood in the same
    /// channel. Borders repeat the edge pixels. Only the median needs this;
    /// linear kernels go through `imageops::filter3x3`.
    fn map_neighbourhood(&mut self, f: fn(&[u8; 9]) -> u8) {
        let (w, h, c) = (self.width as i64, self.height as i64, self.channels);
        if w == 0 || h == 0 {
            return;
        }
        let src = &self.data;
        let mut out = vec![0u8; src.len()];
        let mut window = [0u8; 9];
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    let mut k = 0;
                    for dy in -1..=1 {
                        let yy = (y + dy).clamp(0, h - 1);
                        for dx in -1..=1 {
                            let xx = (x + dx).clamp(0, w - 1);
                            window[k] = src[((yy * w + xx) as usize) * c + ch];
                            k += 1;
                        }
                    }
                    out[((y * w + x) as usize) * c + ch] = f(&window);
                }
            }
        }
        self.data = out;
    }
}

fn median(window: &[u8; 9]) -> u8 {
    let mut sorted = *window;
    sorted.sort_unstable();
    sorted[4]
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
