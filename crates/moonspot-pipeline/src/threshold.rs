//! Adaptive thresholding: separate bright-disk pixels from the sky.
//!
//! Sky brightness varies from near-black to twilight blue, so the cutoff
//! is derived from each image's own histogram:
//!
//! 1. Otsu's method picks the level that maximizes between-class
//!    variance.
//! 2. The histogram counts as bimodal only when the separability
//!    `eta = sigma_between^2 / sigma_total^2` at that level reaches
//!    [`DetectConfig::min_separability`].
//! 3. Otherwise (overexposed, fully dark, or a smooth gradient) the
//!    percentile fallback keeps the brightest
//!    [`DetectConfig::fallback_top_fraction`] of pixels.
//!
//! Foreground is always *strictly* above the chosen level.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::types::{DetectConfig, Dimensions, Miss};

/// Which rule produced the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdSource {
    /// Otsu's bimodal split.
    Otsu,
    /// Top-fraction percentile fallback.
    Percentile,
}

impl std::fmt::Display for ThresholdSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Otsu => write!(f, "otsu"),
            Self::Percentile => write!(f, "percentile"),
        }
    }
}

/// Otsu split of a histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtsuSplit {
    /// Highest intensity in the dark class.
    pub threshold: u8,
    /// Between-class variance over total variance, in `0.0..=1.0`.
    pub separability: f64,
}

/// Per-pixel foreground/background classification.
///
/// Stored as a `GrayImage` holding 255 for foreground and 0 for
/// background, the layout `imageproc`'s contour tracer expects.
#[derive(Debug, Clone)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// Mark every pixel of `gray` strictly brighter than `threshold`.
    #[must_use]
    pub fn from_threshold(gray: &GrayImage, threshold: u8) -> Self {
        let mut mask = GrayImage::new(gray.width(), gray.height());
        mask.par_iter_mut()
            .zip(gray.as_raw().par_iter())
            .for_each(|(m, &v)| *m = if v > threshold { 255 } else { 0 });
        Self(mask)
    }

    /// Whether the pixel at `(x, y)` is foreground.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the mask.
    #[must_use]
    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] != 0
    }

    /// Number of foreground pixels.
    #[must_use]
    pub fn foreground_count(&self) -> u64 {
        self.0.as_raw().par_iter().filter(|&&v| v != 0).count() as u64
    }

    /// Mask dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.0.width(), self.0.height())
    }

    /// The underlying 0/255 image.
    #[must_use]
    pub const fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Output of the segmentation stage.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Foreground is intensity strictly above this level.
    pub threshold: u8,
    /// Rule that produced `threshold`.
    pub source: ThresholdSource,
    /// Otsu separability of the histogram (0 when it has no variance).
    pub separability: f64,
    /// The thresholded mask.
    pub mask: BinaryMask,
    /// Number of foreground pixels in `mask`.
    pub foreground: u64,
}

/// 256-bin intensity histogram.
#[must_use]
pub fn histogram(gray: &GrayImage) -> [u32; 256] {
    let hist = imageproc::stats::histogram(gray);
    hist.channels[0]
}

/// Otsu's threshold and the histogram's separability at that threshold.
///
/// Returns `None` when the histogram has zero variance (a uniform image
/// or no pixels at all), since no split exists.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn otsu(hist: &[u32; 256]) -> Option<OtsuSplit> {
    let total: f64 = hist.iter().map(|&c| f64::from(c)).sum();
    if total <= 0.0 {
        return None;
    }

    let sum: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * f64::from(c))
        .sum();
    let mean = sum / total;
    let total_variance: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let d = i as f64 - mean;
            f64::from(c) * d * d
        })
        .sum::<f64>()
        / total;
    if total_variance <= f64::EPSILON {
        return None;
    }

    let mut weight_dark = 0.0;
    let mut sum_dark = 0.0;
    let mut best_variance = 0.0;
    let mut best_level = 0usize;

    for (level, &count) in hist.iter().enumerate() {
        let count = f64::from(count);
        weight_dark += count;
        if weight_dark <= 0.0 {
            continue;
        }
        let weight_bright = total - weight_dark;
        if weight_bright <= 0.0 {
            break;
        }
        sum_dark += level as f64 * count;
        let mean_dark = sum_dark / weight_dark;
        let mean_bright = (sum - sum_dark) / weight_bright;
        let gap = mean_dark - mean_bright;
        let between = weight_dark * weight_bright * gap * gap / (total * total);
        if between > best_variance {
            best_variance = between;
            best_level = level;
        }
    }

    Some(OtsuSplit {
        // `level` iterates 0..256, so this never truncates.
        threshold: best_level as u8,
        separability: (best_variance / total_variance).clamp(0.0, 1.0),
    })
}

/// The smallest level with at most `top_fraction` of pixels above it.
///
/// When the brightest populated level alone holds more than
/// `top_fraction` of the pixels, that level would leave nothing above
/// it. The next lower populated level is returned instead, so the
/// brightest plateau is kept as foreground. A histogram with a single
/// populated level has no such level and keeps its own.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn percentile_threshold(hist: &[u32; 256], top_fraction: f64) -> u8 {
    let total: u64 = hist.iter().map(|&c| u64::from(c)).sum();
    let allowed = total as f64 * top_fraction;

    let mut above = total;
    for (level, &count) in hist.iter().enumerate() {
        above -= u64::from(count);
        if above as f64 <= allowed {
            if above == 0
                && let Some(lower) = hist[..level].iter().rposition(|&c| c > 0)
            {
                return lower as u8;
            }
            return level as u8;
        }
    }
    u8::MAX
}

/// Pick the threshold for `hist` under `config`'s policy.
#[must_use]
pub fn choose_threshold(hist: &[u32; 256], config: &DetectConfig) -> (u8, ThresholdSource, f64) {
    match otsu(hist) {
        Some(split) if split.separability >= config.min_separability => {
            (split.threshold, ThresholdSource::Otsu, split.separability)
        }
        split => (
            percentile_threshold(hist, config.fallback_top_fraction),
            ThresholdSource::Percentile,
            split.map_or(0.0, |s| s.separability),
        ),
    }
}

impl Segmentation {
    /// Pass the segmentation on only if it found foreground.
    ///
    /// # Errors
    ///
    /// Returns [`Miss::NoBrightRegion`] if no pixel is above the threshold.
    pub fn require_foreground(self) -> Result<Self, Miss> {
        if self.foreground == 0 {
            return Err(Miss::NoBrightRegion);
        }
        Ok(self)
    }
}

/// Threshold `gray` into a [`BinaryMask`].
#[must_use = "returns the segmentation"]
pub fn segment(gray: &GrayImage, config: &DetectConfig) -> Segmentation {
    let hist = histogram(gray);
    let (threshold, source, separability) = choose_threshold(&hist, config);
    let mask = BinaryMask::from_threshold(gray, threshold);
    let foreground = mask.foreground_count();

    log::debug!(
        "segmentation: threshold={threshold} ({source}, eta={separability:.3}), foreground={foreground}"
    );

    Segmentation {
        threshold,
        source,
        separability,
        mask,
        foreground,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Luma;

    use super::*;

    fn two_level(dark: u8, bright: u8, bright_pixels: u32, size: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(size, size, Luma([dark]));
        for i in 0..bright_pixels {
            img.put_pixel(i % size, i / size, Luma([bright]));
        }
        img
    }

    #[test]
    fn otsu_splits_two_levels_between_them() {
        let img = two_level(20, 220, 500, 40);
        let split = otsu(&histogram(&img)).unwrap();
        assert!(split.threshold >= 20 && split.threshold < 220);
        assert!(split.separability > 0.99);
    }

    #[test]
    fn otsu_uniform_image_has_no_split() {
        let img = GrayImage::from_pixel(8, 8, Luma([77]));
        assert!(otsu(&histogram(&img)).is_none());
    }

    #[test]
    fn otsu_flat_histogram_is_not_bimodal() {
        // A uniform distribution over all levels has eta = 0.75.
        let mut hist = [0u32; 256];
        hist.iter_mut().for_each(|c| *c = 10);
        let split = otsu(&hist).unwrap();
        assert!((split.separability - 0.75).abs() < 0.01);
        assert!(split.separability < DetectConfig::DEFAULT_MIN_SEPARABILITY);
    }

    #[test]
    fn percentile_keeps_top_fraction() {
        let mut hist = [0u32; 256];
        // 100 pixels, one per level 0..100.
        for c in hist.iter_mut().take(100) {
            *c = 1;
        }
        // At most 2 pixels strictly above: levels 98 and 99.
        assert_eq!(percentile_threshold(&hist, 0.02), 97);
    }

    #[test]
    fn percentile_of_black_image_is_zero() {
        let mut hist = [0u32; 256];
        hist[0] = 1000;
        assert_eq!(percentile_threshold(&hist, 0.02), 0);
    }

    #[test]
    fn percentile_keeps_an_oversized_top_plateau() {
        let mut hist = [0u32; 256];
        // Noisy sky over 0..60, plus a bright plateau holding 5% of pixels.
        for c in hist.iter_mut().take(60) {
            *c = 95;
        }
        hist[230] = 300;
        assert_eq!(percentile_threshold(&hist, 0.02), 59);
    }

    #[test]
    fn percentile_of_uniform_bright_image_keeps_its_level() {
        let mut hist = [0u32; 256];
        hist[255] = 400;
        assert_eq!(percentile_threshold(&hist, 0.02), 255);
    }

    #[test]
    fn noisy_sky_with_large_disk_segments_the_disk() {
        // Sky noise spread over 0..60 keeps eta under the default cutoff
        // while the disk covers well over the fallback fraction.
        let mut img = GrayImage::from_fn(100, 100, |x, y| {
            Luma([u8::try_from((x * 7 + y * 13) % 60).unwrap()])
        });
        let mut disk = 0;
        for y in 0..100u32 {
            for x in 0..100u32 {
                let (dx, dy) = (f64::from(x) - 50.0, f64::from(y) - 50.0);
                if dx.hypot(dy) <= 9.0 {
                    img.put_pixel(x, y, Luma([230]));
                    disk += 1;
                }
            }
        }
        let seg = segment(&img, &DetectConfig::default())
            .require_foreground()
            .unwrap();
        assert_eq!(seg.source, ThresholdSource::Percentile);
        assert_eq!(seg.threshold, 59);
        assert_eq!(seg.foreground, disk);
    }

    #[test]
    fn flat_histogram_falls_back_to_percentile() {
        let mut hist = [0u32; 256];
        hist.iter_mut().for_each(|c| *c = 10);
        let (_, source, _) = choose_threshold(&hist, &DetectConfig::default());
        assert_eq!(source, ThresholdSource::Percentile);
    }

    #[test]
    fn mask_foreground_is_strictly_above_threshold() {
        let mut img = GrayImage::new(3, 1);
        img.put_pixel(0, 0, Luma([99]));
        img.put_pixel(1, 0, Luma([100]));
        img.put_pixel(2, 0, Luma([101]));
        let mask = BinaryMask::from_threshold(&img, 100);
        assert!(!mask.is_foreground(0, 0));
        assert!(!mask.is_foreground(1, 0));
        assert!(mask.is_foreground(2, 0));
        assert_eq!(mask.foreground_count(), 1);
        assert_eq!(mask.dimensions(), Dimensions::new(3, 1));
    }

    #[test]
    fn black_image_has_no_bright_region() {
        let img = GrayImage::new(32, 32);
        let result = segment(&img, &DetectConfig::default()).require_foreground();
        assert!(matches!(result, Err(Miss::NoBrightRegion)));
    }

    #[test]
    fn uniform_bright_image_has_no_bright_region() {
        let img = GrayImage::from_pixel(32, 32, Luma([255]));
        let result = segment(&img, &DetectConfig::default()).require_foreground();
        assert!(matches!(result, Err(Miss::NoBrightRegion)));
    }

    #[test]
    fn bimodal_image_segments_bright_pixels() {
        let img = two_level(10, 240, 300, 50);
        let seg = segment(&img, &DetectConfig::default())
            .require_foreground()
            .unwrap();
        assert_eq!(seg.source, ThresholdSource::Otsu);
        assert_eq!(seg.foreground, 300);
    }
}
