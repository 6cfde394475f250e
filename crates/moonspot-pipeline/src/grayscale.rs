//! Luminance conversion.
//!
//! Reduces the normalized RGB working copy to a single intensity channel
//! with the Rec. 601 weights `0.299*R + 0.587*G + 0.114*B`, computed in
//! integer arithmetic so the result is identical on every platform.

use image::{GrayImage, Luma, RgbImage};

/// Convert an RGB image to grayscale luminance.
#[must_use = "returns the grayscale image"]
pub fn luminance(rgb: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(rgb.width(), rgb.height());
    for (dst, src) in gray.pixels_mut().zip(rgb.pixels()) {
        *dst = Luma([luma_of(src.0)]);
    }
    gray
}

/// Rec. 601 luma of one RGB pixel, rounded to the nearest integer.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn luma_of([r, g, b]: [u8; 3]) -> u8 {
    let weighted = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
    // Max is 255_000, so the rounded quotient always fits in u8.
    ((weighted + 500) / 1000) as u8
}

/// Mean intensity of a grayscale image.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_intensity(gray: &GrayImage) -> f64 {
    let count = u64::from(gray.width()) * u64::from(gray.height());
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| u64::from(p.0[0])).sum();
    sum as f64 / count as f64
}
