//! Shared types for the moonspot detection pipeline.

use serde::{Deserialize, Serialize};

use crate::annotate::OutputMode;
use crate::locate::DetectorKind;

/// Re-export the `image` raster types so downstream crates can hand
/// images to the pipeline without depending on `image` directly.
pub use image::{DynamicImage, GrayImage, RgbImage, Rgba};

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// An integer pixel position on the image grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl GridPoint {
    /// Create a new grid point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The pixel centre as a floating-point [`Point`].
    #[must_use]
    pub fn to_point(self) -> Point {
        Point::new(f64::from(self.x), f64::from(self.y))
    }
}

/// Closed boundary of one connected foreground region, as an ordered
/// sequence of grid points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<GridPoint>);

impl Contour {
    /// Create a contour from its boundary points, in tracing order.
    #[must_use]
    pub const fn new(points: Vec<GridPoint>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of boundary points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all boundary points.
    #[must_use]
    pub fn points(&self) -> &[GridPoint] {
        &self.0
    }

    /// Area enclosed by the boundary polygon (shoelace formula).
    ///
    /// Boundary points are pixel centres, so a lone pixel or a one-pixel
    /// wide line encloses zero area.
    #[must_use]
    pub fn enclosed_area(&self) -> f64 {
        use geo::Area;

        if self.0.len() < 3 {
            return 0.0;
        }
        let ring: Vec<(f64, f64)> = self
            .0
            .iter()
            .map(|p| (f64::from(p.x), f64::from(p.y)))
            .collect();
        geo::Polygon::new(geo::LineString::from(ring), vec![]).unsigned_area()
    }

    /// Pixel-inclusive bounding box of the boundary points.
    ///
    /// Returns `None` for an empty contour or one with negative
    /// coordinates (which the tracer never produces).
    #[must_use]
    pub fn bounding_box(&self) -> Option<Rect> {
        let first = self.0.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.0[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let x = u32::try_from(min_x).ok()?;
        let y = u32::try_from(min_y).ok()?;
        let width = u32::try_from(max_x - min_x + 1).ok()?;
        let height = u32::try_from(max_y - min_y + 1).ok()?;
        Some(Rect::new(x, y, width, height))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The shorter of width and height.
    #[must_use]
    pub fn shorter_dim(self) -> f64 {
        f64::from(self.width.min(self.height))
    }

    /// Returns `true` if either dimension is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An axis-aligned pixel rectangle.
///
/// `x`/`y` address the top-left pixel; the rectangle covers
/// `x..x + width` and `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Last column covered by the rectangle.
    #[must_use]
    pub const fn right(self) -> u32 {
        self.x + self.width.saturating_sub(1)
    }

    /// Last row covered by the rectangle.
    #[must_use]
    pub const fn bottom(self) -> u32 {
        self.y + self.height.saturating_sub(1)
    }

    /// Ratio of the longer side to the shorter side (>= 1).
    #[must_use]
    pub fn elongation(self) -> f64 {
        let long = self.width.max(self.height);
        let short = self.width.min(self.height).max(1);
        f64::from(long) / f64::from(short)
    }

    /// How many of the four image borders this rectangle touches.
    #[must_use]
    pub fn touched_edges(self, dimensions: Dimensions) -> u8 {
        let touches = [
            self.x == 0,
            self.y == 0,
            self.right() + 1 >= dimensions.width,
            self.bottom() + 1 >= dimensions.height,
        ];
        touches.iter().map(|&t| u8::from(t)).sum()
    }

    /// Centre of the rectangle in pixel coordinates.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(
            f64::from(self.x) + f64::from(self.width.saturating_sub(1)) / 2.0,
            f64::from(self.y) + f64::from(self.height.saturating_sub(1)) / 2.0,
        )
    }

    /// Centre of the rectangle normalized to `0.0..=1.0` on each axis.
    ///
    /// This is the point-of-interest convention camera APIs use for
    /// focus and exposure metering.
    #[must_use]
    pub fn focus_point(self, dimensions: Dimensions) -> Point {
        let c = self.center();
        let w = f64::from(dimensions.width.saturating_sub(1).max(1));
        let h = f64::from(dimensions.height.saturating_sub(1).max(1));
        Point::new((c.x / w).clamp(0.0, 1.0), (c.y / h).clamp(0.0, 1.0))
    }
}

/// A circle in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Centre position.
    pub center: Point,
    /// Radius in pixels (never negative).
    pub radius: f64,
}

impl Circle {
    /// Create a new circle. Negative radii are clamped to zero.
    #[must_use]
    pub fn new(center: Point, radius: f64) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
        }
    }

    /// Area of the disk.
    #[must_use]
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }

    /// Whether `p` lies inside or on the circle, within `tolerance`.
    #[must_use]
    pub fn contains(&self, p: Point, tolerance: f64) -> bool {
        p.distance(self.center) <= self.radius + tolerance
    }

    /// Pixel bounding box of the circle grown by `margin` on every side
    /// and clamped to the image.
    ///
    /// Always returns a rectangle of at least one pixel, even when the
    /// circle lies entirely outside the image.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn bounds(&self, dimensions: Dimensions, margin: f64) -> Rect {
        let w = f64::from(dimensions.width);
        let h = f64::from(dimensions.height);
        let reach = self.radius + margin.max(0.0);

        let x0 = (self.center.x - reach).floor().clamp(0.0, (w - 1.0).max(0.0));
        let y0 = (self.center.y - reach).floor().clamp(0.0, (h - 1.0).max(0.0));
        let x1 = ((self.center.x + reach).floor() + 1.0).clamp(x0 + 1.0, w.max(x0 + 1.0));
        let y1 = ((self.center.y + reach).floor() + 1.0).clamp(y0 + 1.0, h.max(y0 + 1.0));

        Rect::new(x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32)
    }
}

/// Parameters of the Hough-gradient disk locator.
///
/// Only consulted when [`DetectConfig::detector`] is
/// [`DetectorKind::HoughGradient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughConfig {
    /// Gaussian blur sigma applied before edge detection.
    pub blur_sigma: f32,
    /// Canny low threshold.
    pub canny_low: f32,
    /// Canny high threshold.
    pub canny_high: f32,
    /// Smallest radius searched, as a fraction of the shorter image side.
    pub min_radius_fraction: f64,
    /// Largest radius searched, as a fraction of the shorter image side.
    pub max_radius_fraction: f64,
    /// Minimum accumulator votes for a centre to count as a disk.
    pub min_center_votes: u32,
    /// Minimum fraction of the circumference that must be backed by edge
    /// pixels at the chosen radius.
    pub min_support: f64,
}

impl HoughConfig {
    /// Default blur sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.5;
    /// Default Canny low threshold.
    pub const DEFAULT_CANNY_LOW: f32 = 30.0;
    /// Default Canny high threshold.
    pub const DEFAULT_CANNY_HIGH: f32 = 90.0;
    /// Default smallest radius fraction.
    pub const DEFAULT_MIN_RADIUS_FRACTION: f64 = 0.02;
    /// Default largest radius fraction.
    pub const DEFAULT_MAX_RADIUS_FRACTION: f64 = 0.5;
    /// Default vote floor for a centre.
    pub const DEFAULT_MIN_CENTER_VOTES: u32 = 20;
    /// Default circumference support floor.
    pub const DEFAULT_MIN_SUPPORT: f64 = 0.3;
}

impl Default for HoughConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            canny_low: Self::DEFAULT_CANNY_LOW,
            canny_high: Self::DEFAULT_CANNY_HIGH,
            min_radius_fraction: Self::DEFAULT_MIN_RADIUS_FRACTION,
            max_radius_fraction: Self::DEFAULT_MAX_RADIUS_FRACTION,
            min_center_votes: Self::DEFAULT_MIN_CENTER_VOTES,
            min_support: Self::DEFAULT_MIN_SUPPORT,
        }
    }
}

/// Configuration for the detection pipeline.
///
/// Nothing about the tuning of the bright-disk detector is fixed by its
/// public interface, so every threshold lives here with a documented
/// default. Call [`validate`](Self::validate) before use; [`crate::detect`]
/// does so automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    /// Which disk location strategy to run.
    pub detector: DetectorKind,

    /// Minimum Otsu separability (between-class over total variance) for
    /// the histogram to count as bimodal. Below this the percentile
    /// fallback threshold is used.
    pub min_separability: f64,

    /// Fraction of brightest pixels kept as foreground by the percentile
    /// fallback threshold.
    pub fallback_top_fraction: f64,

    /// Contours enclosing less than this fraction of the image area are
    /// discarded as speckles, hot pixels or stray lights.
    pub min_area_fraction: f64,

    /// Contours touching two or more image borders are discarded when the
    /// long side of their bounding box exceeds the short side by more
    /// than this factor (horizon strips, light streaks).
    pub max_edge_elongation: f64,

    /// Whether to draw the circle onto the image or crop around it.
    pub output_mode: OutputMode,

    /// Extra pixels around the circle's bounding box in crop mode.
    pub crop_margin: u32,

    /// Overlay stroke width in pixels.
    pub stroke_width: f32,

    /// Overlay stroke colour (straight RGBA).
    pub stroke_color: [u8; 4],

    /// Hough-gradient locator parameters.
    pub hough: HoughConfig,
}

impl DetectConfig {
    /// Default minimum separability for a bimodal histogram.
    ///
    /// A flat histogram already scores 0.75, so the cutoff has to sit
    /// above that. Noisy skies with a small moon also land below it; the
    /// percentile fallback segments those, keeping the brightest plateau
    /// even when it exceeds the fallback fraction.
    pub const DEFAULT_MIN_SEPARABILITY: f64 = 0.8;
    /// Default fallback foreground fraction (top 2%).
    pub const DEFAULT_FALLBACK_TOP_FRACTION: f64 = 0.02;
    /// Default minimum contour area as a fraction of the image.
    pub const DEFAULT_MIN_AREA_FRACTION: f64 = 0.0005;
    /// Default elongation limit for border-touching contours.
    pub const DEFAULT_MAX_EDGE_ELONGATION: f64 = 3.0;
    /// Default crop margin in pixels.
    pub const DEFAULT_CROP_MARGIN: u32 = 16;
    /// Default overlay stroke width in pixels.
    pub const DEFAULT_STROKE_WIDTH: f32 = 3.0;
    /// Default overlay colour: opaque green.
    pub const DEFAULT_STROKE_COLOR: [u8; 4] = [0, 255, 0, 255];

    /// Check every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`DetectError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), DetectError> {
        let invalid = |msg: String| Err(DetectError::InvalidConfig(msg));

        if !(0.0..=1.0).contains(&self.min_separability) {
            return invalid(format!(
                "min_separability must be in 0..=1, got {}",
                self.min_separability
            ));
        }
        if !(self.fallback_top_fraction > 0.0 && self.fallback_top_fraction < 1.0) {
            return invalid(format!(
                "fallback_top_fraction must be in (0, 1), got {}",
                self.fallback_top_fraction
            ));
        }
        if !(0.0..1.0).contains(&self.min_area_fraction) {
            return invalid(format!(
                "min_area_fraction must be in 0..1, got {}",
                self.min_area_fraction
            ));
        }
        if !(self.max_edge_elongation >= 1.0) {
            return invalid(format!(
                "max_edge_elongation must be at least 1, got {}",
                self.max_edge_elongation
            ));
        }
        if !(self.stroke_width.is_finite() && self.stroke_width > 0.0) {
            return invalid(format!(
                "stroke_width must be positive, got {}",
                self.stroke_width
            ));
        }

        let hough = &self.hough;
        if !(hough.blur_sigma > 0.0) {
            return invalid(format!(
                "hough.blur_sigma must be positive, got {}",
                hough.blur_sigma
            ));
        }
        if !(hough.canny_low >= 1.0 && hough.canny_low <= hough.canny_high) {
            return invalid(format!(
                "hough canny thresholds must satisfy 1 <= low <= high, got {}..{}",
                hough.canny_low, hough.canny_high
            ));
        }
        if !(hough.min_radius_fraction > 0.0
            && hough.min_radius_fraction <= hough.max_radius_fraction)
        {
            return invalid(format!(
                "hough radius fractions must satisfy 0 < min <= max, got {}..{}",
                hough.min_radius_fraction, hough.max_radius_fraction
            ));
        }
        if !(0.0..=1.0).contains(&hough.min_support) {
            return invalid(format!(
                "hough.min_support must be in 0..=1, got {}",
                hough.min_support
            ));
        }
        Ok(())
    }

    /// The overlay colour as an `image` pixel.
    #[must_use]
    pub const fn stroke_rgba(&self) -> Rgba<u8> {
        Rgba(self.stroke_color)
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            min_separability: Self::DEFAULT_MIN_SEPARABILITY,
            fallback_top_fraction: Self::DEFAULT_FALLBACK_TOP_FRACTION,
            min_area_fraction: Self::DEFAULT_MIN_AREA_FRACTION,
            max_edge_elongation: Self::DEFAULT_MAX_EDGE_ELONGATION,
            output_mode: OutputMode::default(),
            crop_margin: Self::DEFAULT_CROP_MARGIN,
            stroke_width: Self::DEFAULT_STROKE_WIDTH,
            stroke_color: Self::DEFAULT_STROKE_COLOR,
            hough: HoughConfig::default(),
        }
    }
}

/// Why a detection attempt ended without a disk.
///
/// These are recovered inside the pipeline: the caller receives the
/// input image unchanged alongside the reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Miss {
    /// No pixel rose above the intensity threshold.
    #[error("no pixels above the brightness threshold")]
    NoBrightRegion,

    /// Bright regions existed but none passed the shape and size filters.
    #[error("no bright region is plausibly a disk")]
    NoPlausibleDisk,
}

/// A located disk and how it was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskFit {
    /// The fitted circle.
    pub circle: Circle,
    /// Bounding box of the circle, clamped to the image.
    pub region: Rect,
    /// Shape score in `0.0..=1.0`: area over enclosing-circle area for
    /// the threshold locator, circumference support for Hough.
    pub circularity: f64,
    /// Strategy that produced the fit.
    pub detector: DetectorKind,
}

/// Terminal state of one detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// A disk was found and the output image is annotated.
    Found(DiskFit),
    /// Detection stopped early; the output image is the input unchanged.
    Missed(Miss),
}

/// Result of a detection call: the output image plus what happened.
#[derive(Debug, Clone)]
pub struct Detection {
    /// The output image. Caller owns it.
    pub image: DynamicImage,
    /// Whether (and where) a disk was found.
    pub outcome: Outcome,
    /// Dimensions of the input image.
    pub dimensions: Dimensions,
}

impl Detection {
    /// The fitted disk, if one was found.
    #[must_use]
    pub const fn fit(&self) -> Option<&DiskFit> {
        match &self.outcome {
            Outcome::Found(fit) => Some(fit),
            Outcome::Missed(_) => None,
        }
    }

    /// The early-exit reason, if detection missed.
    #[must_use]
    pub const fn miss(&self) -> Option<Miss> {
        match self.outcome {
            Outcome::Found(_) => None,
            Outcome::Missed(miss) => Some(miss),
        }
    }

    /// Consume the detection and return only the output image.
    #[must_use]
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Errors that abort a detection call.
///
/// Failing to find the moon is not one of them; see [`Miss`].
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The input image is empty, zero-area, or otherwise malformed.
    #[error("invalid input image: {0}")]
    InvalidInput(String),

    /// Failed to decode encoded image bytes.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// Configuration is out of range.
    #[error("invalid detection configuration: {0}")]
    InvalidConfig(String),
}
