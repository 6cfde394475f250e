//! Pipeline diagnostics: timing and metrics for each stage.
//!
//! Every detection run collects these alongside its result. They are
//! meant for tuning the detector's thresholds against real photographs,
//! and are cheap enough to collect unconditionally.
//!
//! Timestamps come from `web-time`, which is `std::time::Instant` on
//! native targets and `performance.now()` on WASM. Durations are
//! serialized as fractional seconds (`f64`) since
//! `std::time::Duration` has no serde support.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::annotate::OutputMode;
use crate::threshold::ThresholdSource;
use crate::types::{Dimensions, Outcome};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Human-readable stage name.
    pub name: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Input validation and RGB normalization.
    Ingest {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Colour type of the input, e.g. `Rgba8`.
        color_type: String,
        /// Whether alpha was composited over black.
        had_alpha: bool,
    },
    /// Luminance conversion.
    Grayscale {
        /// Mean intensity, `0.0..=255.0`.
        mean_intensity: f64,
    },
    /// Thresholding into a binary mask.
    Segmentation {
        /// Foreground is intensity strictly above this.
        threshold: u8,
        /// Rule that produced the threshold.
        source: ThresholdSource,
        /// Otsu separability of the histogram.
        separability: f64,
        /// Foreground pixel count.
        foreground_pixels: u64,
        /// Total pixel count.
        total_pixels: u64,
    },
    /// Outer boundary tracing.
    ContourTracing {
        /// Number of contours found.
        contour_count: usize,
        /// Total number of points across all contours.
        total_point_count: usize,
    },
    /// Filtering and circularity ranking.
    CandidateExtraction {
        /// Contours examined.
        contours: usize,
        /// Rejected as too small.
        too_small: usize,
        /// Rejected as border-touching streaks.
        edge_streaks: usize,
        /// Contours that passed both filters.
        survivors: usize,
        /// Circularity of the best survivor.
        best_circularity: Option<f64>,
    },
    /// Minimal enclosing circle of the winning contour.
    Fit {
        /// Centre column.
        center_x: f64,
        /// Centre row.
        center_y: f64,
        /// Radius in pixels.
        radius: f64,
    },
    /// Gradient edge detection for the Hough locator.
    EdgeDetection {
        /// Low hysteresis threshold.
        low_threshold: f32,
        /// High hysteresis threshold.
        high_threshold: f32,
        /// Number of edge pixels.
        edge_pixel_count: u64,
        /// Total pixel count.
        total_pixel_count: u64,
    },
    /// Hough accumulator voting and radius search.
    HoughVote {
        /// Smallest radius searched.
        min_radius: u32,
        /// Largest radius searched.
        max_radius: u32,
        /// Votes at the accumulator peak.
        peak_votes: u32,
        /// Circumference support at the chosen radius.
        support: f64,
    },
    /// Overlay drawing or cropping.
    Annotate {
        /// Output mode used.
        mode: OutputMode,
        /// Output width in pixels.
        width: u32,
        /// Output height in pixels.
        height: u32,
    },
}

/// Ordered record of the stages run so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageLog {
    stages: Vec<StageDiagnostics>,
}

impl StageLog {
    /// An empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a finished stage that started at `start`.
    pub fn record(&mut self, name: &str, start: Instant, metrics: StageMetrics) {
        let duration = start.elapsed();
        log::debug!("stage {name}: {:.3}ms", duration_ms(duration));
        self.stages.push(StageDiagnostics {
            name: name.to_string(),
            duration,
            metrics,
        });
    }

    /// Stages recorded so far, in order.
    #[must_use]
    pub fn stages(&self) -> &[StageDiagnostics] {
        &self.stages
    }

    /// Consume the log and return its stages.
    #[must_use]
    pub fn into_stages(self) -> Vec<StageDiagnostics> {
        self.stages
    }
}

/// Diagnostics collected from one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Input dimensions.
    pub dimensions: Dimensions,
    /// Stages in execution order. Stages after an early exit are absent.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// How the run ended.
    pub outcome: Outcome,
}

impl PipelineDiagnostics {
    /// Look up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageDiagnostics> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Moon Detection Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.dimensions.width,
            self.dimensions.height,
            self.dimensions.pixel_count(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for stage in &self.stages {
            let ms = duration_ms(stage.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&stage.metrics);
            lines.push(format!(
                "{:<24} {ms:>8.3}ms {pct:>9.1}%  {details}",
                stage.name
            ));
        }

        lines.push(String::new());
        lines.push(match &self.outcome {
            Outcome::Found(fit) => format!(
                "Moon: centre ({:.1}, {:.1}) radius {:.1}px, score {:.3} [{}]",
                fit.circle.center.x,
                fit.circle.center.y,
                fit.circle.radius,
                fit.circularity,
                fit.detector,
            ),
            Outcome::Missed(miss) => format!("No moon: {miss}"),
        });

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Ingest {
            width,
            height,
            color_type,
            had_alpha,
        } => {
            let alpha = if *had_alpha { " (alpha over black)" } else { "" };
            format!("{width}x{height} {color_type}{alpha}")
        }
        StageMetrics::Grayscale { mean_intensity } => format!("mean={mean_intensity:.1}"),
        StageMetrics::Segmentation {
            threshold,
            source,
            separability,
            foreground_pixels,
            total_pixels,
        } => format!(
            "t={threshold} ({source}, eta={separability:.3}) fg={foreground_pixels} ({:.2}%)",
            percent(*foreground_pixels, *total_pixels),
        ),
        StageMetrics::ContourTracing {
            contour_count,
            total_point_count,
        } => format!("{contour_count} contours, {total_point_count} pts"),
        StageMetrics::CandidateExtraction {
            contours,
            too_small,
            edge_streaks,
            survivors,
            best_circularity,
        } => {
            let best = best_circularity.map_or_else(|| "-".to_string(), |c| format!("{c:.3}"));
            format!(
                "{contours} in, {too_small} small, {edge_streaks} streaks, {survivors} kept, best={best}"
            )
        }
        StageMetrics::Fit {
            center_x,
            center_y,
            radius,
        } => format!("c=({center_x:.1}, {center_y:.1}) r={radius:.1}"),
        StageMetrics::EdgeDetection {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => format!(
            "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({:.1}%)",
            percent(*edge_pixel_count, *total_pixel_count),
        ),
        StageMetrics::HoughVote {
            min_radius,
            max_radius,
            peak_votes,
            support,
        } => format!("r={min_radius}..={max_radius} peak={peak_votes} support={support:.3}"),
        StageMetrics::Annotate {
            mode,
            width,
            height,
        } => format!("{mode} -> {width}x{height}"),
    }
}
