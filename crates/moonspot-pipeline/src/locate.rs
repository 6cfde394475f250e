//! Disk location strategies.
//!
//! This module defines the [`DiskLocator`] trait and the
//! [`DetectorKind`] enum that selects an implementation at runtime.
//!
//! # Strategy pattern
//!
//! Both strategies take the same grayscale image and produce the same
//! [`DiskFit`], so everything downstream (annotation, diagnostics,
//! overlay recovery) is shared. Adding a strategy means adding a variant
//! here and nothing in `DetectConfig` changes shape.

use std::fmt;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::diagnostics::{StageLog, StageMetrics};
use crate::types::{DetectConfig, Dimensions, DiskFit, Miss};

/// Selects which disk location algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Adaptive threshold, outer contours, circularity ranking, minimal
    /// enclosing circle.
    ///
    /// Robust on overexposed disks and partial phases, since it only
    /// needs the lit region to be brighter than the sky.
    #[default]
    Threshold,

    /// Gradient-direction Hough transform over Canny-style edges.
    ///
    /// Tolerates thin cloud that smears the brightness threshold, as long
    /// as the limb still produces an edge.
    HoughGradient,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold => write!(f, "threshold"),
            Self::HoughGradient => write!(f, "hough_gradient"),
        }
    }
}

/// Trait for disk location strategies.
///
/// Input: the luminance image. Output: the fitted disk, or the reason
/// none was found. Implementations record their sub-stages in `log`.
pub trait DiskLocator {
    /// Locate the brightest plausible disk in `gray`.
    ///
    /// # Errors
    ///
    /// Returns a [`Miss`] when no disk is found. This is an ordinary
    /// outcome, not a failure of the call.
    fn locate(
        &self,
        gray: &GrayImage,
        config: &DetectConfig,
        log: &mut StageLog,
    ) -> Result<DiskFit, Miss>;
}

impl DiskLocator for DetectorKind {
    fn locate(
        &self,
        gray: &GrayImage,
        config: &DetectConfig,
        log: &mut StageLog,
    ) -> Result<DiskFit, Miss> {
        match *self {
            Self::Threshold => locate_by_threshold(gray, config, log),
            Self::HoughGradient => locate_by_hough(gray, config, log),
        }
    }
}

fn dimensions_of(gray: &GrayImage) -> Dimensions {
    Dimensions::new(gray.width(), gray.height())
}

/// Threshold, trace, filter, rank, fit.
fn locate_by_threshold(
    gray: &GrayImage,
    config: &DetectConfig,
    log: &mut StageLog,
) -> Result<DiskFit, Miss> {
    let dimensions = dimensions_of(gray);

    let start = Instant::now();
    let segmentation = crate::threshold::segment(gray, config);
    log.record(
        "Segmentation",
        start,
        StageMetrics::Segmentation {
            threshold: segmentation.threshold,
            source: segmentation.source,
            separability: segmentation.separability,
            foreground_pixels: segmentation.foreground,
            total_pixels: dimensions.pixel_count(),
        },
    );
    let segmentation = segmentation.require_foreground()?;

    let start = Instant::now();
    let contours = crate::contour::trace_outer(&segmentation.mask);
    log.record(
        "Contour Tracing",
        start,
        StageMetrics::ContourTracing {
            contour_count: contours.len(),
            total_point_count: contours.iter().map(crate::types::Contour::len).sum(),
        },
    );

    let start = Instant::now();
    let (ranked, stats) = crate::candidate::extract(contours, dimensions, config);
    log.record(
        "Candidate Extraction",
        start,
        StageMetrics::CandidateExtraction {
            contours: stats.contours,
            too_small: stats.too_small,
            edge_streaks: stats.edge_streaks,
            survivors: stats.survivors,
            best_circularity: ranked
                .as_ref()
                .ok()
                .and_then(|r| r.first())
                .map(|c| c.circularity),
        },
    );

    let start = Instant::now();
    let best = ranked?.into_iter().next().ok_or(Miss::NoPlausibleDisk)?;
    let circle = best.enclosing;
    log.record(
        "Fit",
        start,
        StageMetrics::Fit {
            center_x: circle.center.x,
            center_y: circle.center.y,
            radius: circle.radius,
        },
    );

    Ok(DiskFit {
        circle,
        region: circle.bounds(dimensions, 0.0),
        circularity: best.circularity,
        detector: DetectorKind::Threshold,
    })
}

/// Edge map, vote, radius search.
fn locate_by_hough(
    gray: &GrayImage,
    config: &DetectConfig,
    log: &mut StageLog,
) -> Result<DiskFit, Miss> {
    let dimensions = dimensions_of(gray);
    let hough = &config.hough;

    let start = Instant::now();
    let edges = crate::hough::edge_map(gray, hough);
    log.record(
        "Edge Detection",
        start,
        StageMetrics::EdgeDetection {
            low_threshold: hough.canny_low,
            high_threshold: hough.canny_high,
            edge_pixel_count: edges.points.len() as u64,
            total_pixel_count: dimensions.pixel_count(),
        },
    );

    let start = Instant::now();
    let (result, stats) = crate::hough::locate_in_edges(&edges, dimensions, hough);
    log.record(
        "Hough Vote",
        start,
        StageMetrics::HoughVote {
            min_radius: stats.min_radius,
            max_radius: stats.max_radius,
            peak_votes: stats.peak_votes,
            support: stats.support,
        },
    );
    let fit = result?;

    Ok(DiskFit {
        circle: fit.circle,
        region: fit.circle.bounds(dimensions, 0.0),
        circularity: fit.support,
        detector: DetectorKind::HoughGradient,
    })
}
