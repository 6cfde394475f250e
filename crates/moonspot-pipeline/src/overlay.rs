//! Overlay recovery: find the drawn circle in an annotated image.
//!
//! A host that only receives the output image (and not the [`Detection`]
//! alongside it) can still steer a camera toward the moon: match the
//! stroke colour, take the bounding box of the matching pixels, and use
//! its normalized centre as the focus and exposure point of interest.
//!
//! [`Detection`]: crate::types::Detection

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::types::{DetectConfig, Rect};

/// An inclusive per-channel RGB range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBand {
    /// Lowest accepted value per channel.
    pub min: [u8; 3],
    /// Highest accepted value per channel.
    pub max: [u8; 3],
}

impl ColorBand {
    /// Default per-channel tolerance around a stroke colour.
    ///
    /// Wide enough to survive JPEG re-encoding of the output.
    pub const DEFAULT_TOLERANCE: u8 = 40;

    /// Band of colours within `tolerance` of `color` on every channel.
    #[must_use]
    pub const fn around(color: [u8; 3], tolerance: u8) -> Self {
        let [r, g, b] = color;
        Self {
            min: [
                r.saturating_sub(tolerance),
                g.saturating_sub(tolerance),
                b.saturating_sub(tolerance),
            ],
            max: [
                r.saturating_add(tolerance),
                g.saturating_add(tolerance),
                b.saturating_add(tolerance),
            ],
        }
    }

    /// Band around the overlay colour `config` draws with.
    #[must_use]
    pub const fn for_stroke(config: &DetectConfig, tolerance: u8) -> Self {
        let [r, g, b, _] = config.stroke_color;
        Self::around([r, g, b], tolerance)
    }

    /// Whether `rgb` lies inside the band.
    #[must_use]
    pub fn contains(&self, rgb: [u8; 3]) -> bool {
        rgb.iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .all(|(&c, (&lo, &hi))| lo <= c && c <= hi)
    }
}

impl Default for ColorBand {
    fn default() -> Self {
        let [r, g, b, _] = DetectConfig::DEFAULT_STROKE_COLOR;
        Self::around([r, g, b], Self::DEFAULT_TOLERANCE)
    }
}

/// Bounding box of every pixel of `image` whose colour lies in `band`.
///
/// Returns `None` when no pixel matches.
#[must_use]
pub fn locate_overlay(image: &DynamicImage, band: ColorBand) -> Option<Rect> {
    let rgb = image.to_rgb8();
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in rgb.enumerate_pixels() {
        if !band.contains(p.0) {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    let (x0, y0, x1, y1) = bounds?;
    let rect = Rect::new(x0, y0, x1 - x0 + 1, y1 - y0 + 1);
    log::debug!("overlay: {rect:?}");
    Some(rect)
}
