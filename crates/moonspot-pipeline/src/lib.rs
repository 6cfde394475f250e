//! moonspot-pipeline: locate the moon in a photograph (sans-IO).
//!
//! Finds a bright, roughly circular disk against a dark, noisy sky and
//! returns an annotated copy of the input:
//! ingest -> grayscale -> threshold -> contour tracing ->
//! candidate ranking -> minimal enclosing circle -> overlay.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! images and returns structured data. File and terminal handling lives
//! in the `moonspot` CLI.
//!
//! Not finding a moon is a normal outcome, not an error. The output is
//! then the input unchanged, and [`Detection::outcome`] says why.

pub mod annotate;
pub mod candidate;
pub mod contour;
pub mod diagnostics;
pub mod edges;
pub mod enclosing;
pub mod grayscale;
pub mod hough;
pub mod ingest;
pub mod locate;
pub mod overlay;
pub mod pipeline;
pub mod threshold;
pub mod types;

pub use annotate::OutputMode;
pub use diagnostics::{PipelineDiagnostics, StageDiagnostics, StageMetrics};
pub use locate::{DetectorKind, DiskLocator};
pub use overlay::{ColorBand, locate_overlay};
pub use pipeline::Pipeline;
pub use types::{
    Circle, DetectConfig, DetectError, Detection, Dimensions, DiskFit, HoughConfig, Miss, Outcome,
    Point, Rect,
};

use image::DynamicImage;

/// Detect the moon in `image` and return the annotated image.
///
/// Runs with [`DetectConfig::default`]: threshold locator, green
/// 3-pixel outline, same dimensions and colour type as the input. When
/// no moon is found the returned image is a pixel-identical copy.
///
/// # Errors
///
/// Returns [`DetectError::InvalidInput`] for a zero-width or
/// zero-height image.
pub fn detect_moon(image: &DynamicImage) -> Result<DynamicImage, DetectError> {
    detect(image, &DetectConfig::default()).map(Detection::into_image)
}

/// Detect the moon in `image` under `config`.
///
/// # Errors
///
/// Returns [`DetectError::InvalidConfig`] if `config` fails
/// [`DetectConfig::validate`], and [`DetectError::InvalidInput`] for a
/// zero-area image.
pub fn detect(image: &DynamicImage, config: &DetectConfig) -> Result<Detection, DetectError> {
    detect_with_diagnostics(image, config).map(|(detection, _)| detection)
}

/// Like [`detect`], also returning per-stage timings and metrics.
///
/// # Errors
///
/// Same as [`detect`].
pub fn detect_with_diagnostics(
    image: &DynamicImage,
    config: &DetectConfig,
) -> Result<(Detection, PipelineDiagnostics), DetectError> {
    config.validate()?;

    let grayscale = Pipeline::new(image, config.clone())
        .ingest()?
        .grayscale();

    Ok(match grayscale.locate() {
        Ok(located) => located.annotate().into_parts(),
        Err(missed) => missed.into_parts(),
    })
}
