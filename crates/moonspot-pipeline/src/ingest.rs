//! Image ingest and normalization.
//!
//! Validates the caller's image and produces the working copy every later
//! stage reads: 8-bit RGB with alpha composited over black. Transparent
//! pixels carry no light, so they read as dark sky.
//!
//! No resizing happens here. Thresholding and contour tracing work at any
//! resolution.

use image::{DynamicImage, Rgb, RgbImage};

use crate::types::{DetectError, Dimensions};

/// Decode encoded image bytes (PNG, JPEG, BMP, WebP).
///
/// # Errors
///
/// Returns [`DetectError::InvalidInput`] if `bytes` is empty.
/// Returns [`DetectError::ImageDecode`] if the format is unrecognized or
/// the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::InvalidInput(
            "input image data is empty".to_string(),
        ));
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Check that `image` has non-zero area and return its dimensions.
///
/// # Errors
///
/// Returns [`DetectError::InvalidInput`] for a zero-width or
/// zero-height image.
pub fn validate(image: &DynamicImage) -> Result<Dimensions, DetectError> {
    let dimensions = Dimensions::new(image.width(), image.height());
    if dimensions.is_empty() {
        return Err(DetectError::InvalidInput(format!(
            "zero-area image ({}x{})",
            dimensions.width, dimensions.height
        )));
    }
    Ok(dimensions)
}

/// Produce the normalized 8-bit RGB working copy of `image`.
///
/// Higher bit depths are reduced to 8 bits and alpha is premultiplied
/// into the colour channels (composited over black).
///
/// # Errors
///
/// Returns [`DetectError::InvalidInput`] for a zero-area image.
#[allow(clippy::cast_possible_truncation)]
pub fn normalize(image: &DynamicImage) -> Result<RgbImage, DetectError> {
    let dimensions = validate(image)?;

    if !image.color().has_alpha() {
        return Ok(image.to_rgb8());
    }

    let rgba = image.to_rgba8();
    let mut out = RgbImage::new(dimensions.width, dimensions.height);
    for (dst, src) in out.pixels_mut().zip(rgba.pixels()) {
        let [r, g, b, a] = src.0;
        let over_black = |c: u8| ((u16::from(c) * u16::from(a) + 127) / 255) as u8;
        *dst = Rgb([over_black(r), over_black(g), over_black(b)]);
    }
    Ok(out)
}
