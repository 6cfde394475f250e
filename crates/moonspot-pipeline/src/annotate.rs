//! Annotation: draw the fitted circle onto the output image, or crop
//! around it.
//!
//! The outline is rasterised by `tiny-skia` into a coverage pixmap and
//! then painted into a copy of the input in its own colour type, so a
//! 16-bit or float image comes back 16-bit or float. Anti-aliasing is
//! off: every covered pixel is set to the stroke colour exactly, which
//! keeps the overlay recoverable by colour matching.

use std::fmt;

use image::{DynamicImage, ImageBuffer, Pixel, RgbaImage};
use serde::{Deserialize, Serialize};
use tiny_skia::{Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::types::{Circle, DetectConfig, Dimensions};

/// What the pipeline returns when a disk is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// The full input with the circle outline drawn on it.
    #[default]
    Overlay,
    /// The circle's bounding box plus a margin, cut from the input.
    Crop,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlay => write!(f, "overlay"),
            Self::Crop => write!(f, "crop"),
        }
    }
}

/// Produce the output image for a found disk under `config.output_mode`.
#[must_use = "returns the annotated image"]
pub fn render(image: &DynamicImage, circle: &Circle, config: &DetectConfig) -> DynamicImage {
    match config.output_mode {
        OutputMode::Overlay => overlay(image, circle, config),
        OutputMode::Crop => crop(image, circle, config.crop_margin),
    }
}

/// Copy `image` and stroke `circle` onto the copy.
///
/// Pixels under the stroke are replaced by `config.stroke_color`
/// converted to the image's colour type. A circle of zero radius, or an
/// image too large for a pixmap, yields an unmodified copy.
#[must_use = "returns the annotated image"]
pub fn overlay(image: &DynamicImage, circle: &Circle, config: &DetectConfig) -> DynamicImage {
    let mut out = image.clone();
    let Some(coverage) = stroke_coverage(image.width(), image.height(), circle, config.stroke_width)
    else {
        log::warn!(
            "overlay skipped: cannot rasterise r={:.1} on {}x{}",
            circle.radius,
            image.width(),
            image.height()
        );
        return out;
    };

    let ink = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, config.stroke_rgba()));
    match &mut out {
        DynamicImage::ImageLuma8(buf) => paint(buf, &coverage, first_pixel(&ink.to_luma8())),
        DynamicImage::ImageLumaA8(buf) => {
            paint(buf, &coverage, first_pixel(&ink.to_luma_alpha8()));
        }
        DynamicImage::ImageRgb8(buf) => paint(buf, &coverage, first_pixel(&ink.to_rgb8())),
        DynamicImage::ImageRgba8(buf) => paint(buf, &coverage, first_pixel(&ink.to_rgba8())),
        DynamicImage::ImageLuma16(buf) => paint(buf, &coverage, first_pixel(&ink.to_luma16())),
        DynamicImage::ImageLumaA16(buf) => {
            paint(buf, &coverage, first_pixel(&ink.to_luma_alpha16()));
        }
        DynamicImage::ImageRgb16(buf) => paint(buf, &coverage, first_pixel(&ink.to_rgb16())),
        DynamicImage::ImageRgba16(buf) => paint(buf, &coverage, first_pixel(&ink.to_rgba16())),
        DynamicImage::ImageRgb32F(buf) => paint(buf, &coverage, first_pixel(&ink.to_rgb32f())),
        DynamicImage::ImageRgba32F(buf) => {
            paint(buf, &coverage, first_pixel(&ink.to_rgba32f()));
        }
        other => {
            let mut rgba = other.to_rgba8();
            paint(&mut rgba, &coverage, first_pixel(&ink.to_rgba8()));
            *other = DynamicImage::ImageRgba8(rgba);
        }
    }
    out
}

/// Cut the circle's bounding box, grown by `margin`, from `image`.
#[must_use = "returns the cropped image"]
pub fn crop(image: &DynamicImage, circle: &Circle, margin: u32) -> DynamicImage {
    let dims = Dimensions::new(image.width(), image.height());
    let r = circle.bounds(dims, f64::from(margin));
    image.crop_imm(r.x, r.y, r.width, r.height)
}

/// Rasterise the circle outline into an alpha-only coverage pixmap.
///
/// Image pixel centres sit on integer coordinates; `tiny-skia` pixels
/// span `[x, x + 1)`, hence the half-pixel shift.
#[allow(clippy::cast_possible_truncation)]
fn stroke_coverage(width: u32, height: u32, circle: &Circle, stroke_width: f32) -> Option<Pixmap> {
    let path = PathBuilder::from_circle(
        (circle.center.x + 0.5) as f32,
        (circle.center.y + 0.5) as f32,
        circle.radius as f32,
    )?;

    let stroke = Stroke {
        width: stroke_width,
        ..Stroke::default()
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    paint.anti_alias = false;

    let mut pixmap = Pixmap::new(width, height)?;
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    Some(pixmap)
}

fn first_pixel<P: Pixel>(buf: &ImageBuffer<P, Vec<P::Subpixel>>) -> P {
    *buf.get_pixel(0, 0)
}

/// Set every pixel the coverage pixmap touches to `ink`.
fn paint<P: Pixel>(buf: &mut ImageBuffer<P, Vec<P::Subpixel>>, coverage: &Pixmap, ink: P) {
    for (px, cov) in buf.pixels_mut().zip(coverage.pixels()) {
        if cov.alpha() > 0 {
            *px = ink;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{GenericImageView, ImageBuffer, Luma, Rgb, RgbImage, Rgba};

    use super::*;
    use crate::types::Point;

    fn circle() -> Circle {
        Circle::new(Point::new(40.0, 30.0), 15.0)
    }

    #[test]
    fn overlay_preserves_dimensions_and_type() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        let out = overlay(&input, &circle(), &DetectConfig::default());
        assert_eq!(out.dimensions(), (80, 60));
        assert_eq!(out.color(), input.color());
    }

    #[test]
    fn overlay_draws_on_the_circle_only() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        let out = overlay(&input, &circle(), &DetectConfig::default()).to_rgb8();
        assert_eq!(*out.get_pixel(55, 30), Rgb([0, 255, 0]));
        assert_eq!(*out.get_pixel(40, 15), Rgb([0, 255, 0]));
        assert_eq!(*out.get_pixel(40, 30), Rgb([0, 0, 0]));
        assert_eq!(*out.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn overlay_leaves_input_untouched() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        let before = input.clone();
        let _ = overlay(&input, &circle(), &DetectConfig::default());
        assert_eq!(input, before);
    }

    #[test]
    fn overlay_keeps_sixteen_bit_depth() {
        let input = DynamicImage::ImageLuma16(ImageBuffer::from_pixel(80, 60, Luma([1000u16])));
        let out = overlay(&input, &circle(), &DetectConfig::default());
        assert_eq!(out.color(), image::ColorType::L16);
        let buf = out.as_luma16().unwrap();
        // Green converts to a bright 16-bit luma, distinct from the sky.
        assert!(buf.get_pixel(55, 30).0[0] > 30_000);
        assert_eq!(buf.get_pixel(40, 30).0[0], 1000);
    }

    #[test]
    fn overlay_uses_configured_colour() {
        let input = DynamicImage::ImageRgba8(RgbaImage::new(80, 60));
        let config = DetectConfig {
            stroke_color: [255, 0, 0, 255],
            ..DetectConfig::default()
        };
        let out = overlay(&input, &circle(), &config).to_rgba8();
        assert_eq!(*out.get_pixel(25, 30), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn zero_radius_is_a_plain_copy() {
        let input = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([9, 9, 9])));
        let c = Circle::new(Point::new(5.0, 5.0), 0.0);
        assert_eq!(overlay(&input, &c, &DetectConfig::default()), input);
    }

    #[test]
    fn crop_includes_margin_and_clamps() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        let out = crop(&input, &circle(), 4);
        // x: 40 - 19 = 21 ..= 59, y: 30 - 19 = 11 ..= 49.
        assert_eq!(out.dimensions(), (39, 39));

        let edge = Circle::new(Point::new(3.0, 3.0), 10.0);
        let out = crop(&input, &edge, 16);
        assert_eq!(out.dimensions(), (30, 30));
    }

    #[test]
    fn render_follows_output_mode() {
        let input = DynamicImage::ImageRgb8(RgbImage::new(80, 60));
        let config = DetectConfig {
            output_mode: OutputMode::Crop,
            crop_margin: 0,
            ..DetectConfig::default()
        };
        assert_eq!(render(&input, &circle(), &config).dimensions(), (31, 31));
        let config = DetectConfig::default();
        assert_eq!(render(&input, &circle(), &config).dimensions(), (80, 60));
    }
}
