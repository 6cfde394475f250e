//! Disk candidate extraction: filter traced contours and rank survivors.
//!
//! Two filters remove regions that cannot be the moon:
//!
//! - **Too small**: enclosed area below
//!   [`DetectConfig::min_area_fraction`] of the frame. Speckles, hot
//!   pixels, stars and distant lights.
//! - **Edge streak**: bounding box touches two or more image borders and
//!   is elongated past [`DetectConfig::max_edge_elongation`]. Lit horizon
//!   strips and light streaks.
//!
//! Survivors are ranked by circularity, the ratio of enclosed area to the
//! area of the minimal enclosing circle. Ties go to the larger region.
//! Scoring is independent per contour and runs on the rayon pool;
//! ranking is a stable sort over the results in tracing order, so the
//! outcome matches a sequential run.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::enclosing;
use crate::types::{Circle, Contour, DetectConfig, Dimensions, Miss, Rect};

/// Circularities closer than this are considered equal.
pub const CIRCULARITY_TIE_EPSILON: f64 = 1e-9;

/// A contour that passed filtering, with its shape measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The region's outer boundary.
    pub contour: Contour,
    /// Shoelace area enclosed by the boundary.
    pub area: f64,
    /// Pixel bounding box of the boundary.
    pub bbox: Rect,
    /// Minimal enclosing circle of the boundary.
    pub enclosing: Circle,
    /// `area / enclosing.area()`, in `0.0..=1.0`.
    pub circularity: f64,
}

/// Why a contour was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Enclosed area below the minimum fraction of the image.
    TooSmall,
    /// Border-touching, elongated region.
    EdgeStreak,
}

/// Counts from one extraction run, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Contours examined.
    pub contours: usize,
    /// Contours rejected as too small.
    pub too_small: usize,
    /// Contours rejected as edge streaks.
    pub edge_streaks: usize,
    /// Contours that survived filtering.
    pub survivors: usize,
}

/// Measure one contour and decide whether it can be the disk.
///
/// # Errors
///
/// Returns the [`Rejection`] reason for contours that fail a filter.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(
    contour: Contour,
    dimensions: Dimensions,
    config: &DetectConfig,
) -> Result<Candidate, Rejection> {
    let area = contour.enclosed_area();
    let min_area = dimensions.pixel_count() as f64 * config.min_area_fraction;
    if area < min_area || area <= 0.0 {
        return Err(Rejection::TooSmall);
    }

    let (Some(bbox), Some(enclosing)) = (contour.bounding_box(), enclosing::fit_disk(&contour))
    else {
        return Err(Rejection::TooSmall);
    };

    if bbox.touched_edges(dimensions) > 1 && bbox.elongation() > config.max_edge_elongation {
        return Err(Rejection::EdgeStreak);
    }

    let circle_area = enclosing.area();
    let circularity = if circle_area > 0.0 {
        (area / circle_area).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(Candidate {
        contour,
        area,
        bbox,
        enclosing,
        circularity,
    })
}

/// Ordering that puts the better candidate first.
#[must_use]
pub fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    if (a.circularity - b.circularity).abs() <= CIRCULARITY_TIE_EPSILON {
        b.area.total_cmp(&a.area)
    } else {
        b.circularity.total_cmp(&a.circularity)
    }
}

/// Filter `contours` and return survivors, best first.
///
/// The result is [`Miss::NoPlausibleDisk`] when no contour survives.
/// Stats are returned either way.
#[must_use]
pub fn extract(
    contours: Vec<Contour>,
    dimensions: Dimensions,
    config: &DetectConfig,
) -> (Result<Vec<Candidate>, Miss>, ExtractionStats) {
    let mut stats = ExtractionStats {
        contours: contours.len(),
        ..ExtractionStats::default()
    };

    let evaluated: Vec<Result<Candidate, Rejection>> = contours
        .into_par_iter()
        .map(|c| evaluate(c, dimensions, config))
        .collect();

    let mut survivors = Vec::new();
    for result in evaluated {
        match result {
            Ok(candidate) => survivors.push(candidate),
            Err(Rejection::TooSmall) => stats.too_small += 1,
            Err(Rejection::EdgeStreak) => stats.edge_streaks += 1,
        }
    }
    stats.survivors = survivors.len();

    log::debug!(
        "candidates: {} contours, {} too small, {} edge streaks, {} survivors",
        stats.contours,
        stats.too_small,
        stats.edge_streaks,
        stats.survivors
    );

    if survivors.is_empty() {
        return (Err(Miss::NoPlausibleDisk), stats);
    }
    survivors.sort_by(rank);
    for c in &survivors {
        log::trace!(
            "candidate: area={:.1} circularity={:.4} bbox={:?}",
            c.area,
            c.circularity,
            c.bbox
        );
    }
    (Ok(survivors), stats)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::GridPoint;

    fn rect_contour(x0: i32, y0: i32, w: i32, h: i32) -> Contour {
        let mut pts = Vec::new();
        for x in x0..x0 + w {
            pts.push(GridPoint::new(x, y0));
        }
        for y in y0 + 1..y0 + h {
            pts.push(GridPoint::new(x0 + w - 1, y));
        }
        for x in (x0..x0 + w - 1).rev() {
            pts.push(GridPoint::new(x, y0 + h - 1));
        }
        for y in (y0 + 1..y0 + h - 1).rev() {
            pts.push(GridPoint::new(x0, y));
        }
        Contour::new(pts)
    }

    /// Approximate a disk boundary with a dense polygon on integer points.
    #[allow(clippy::cast_possible_truncation)]
    fn disk_contour(cx: f64, cy: f64, r: f64) -> Contour {
        let pts = (0..360)
            .map(|deg| {
                let t = f64::from(deg).to_radians();
                GridPoint::new(
                    r.mul_add(t.cos(), cx).round() as i32,
                    r.mul_add(t.sin(), cy).round() as i32,
                )
            })
            .collect();
        Contour::new(pts)
    }

    fn dims() -> Dimensions {
        Dimensions::new(200, 200)
    }

    #[test]
    fn small_contour_is_rejected() {
        // 3x3 block encloses 4 px^2, well under 0.0005 * 40_000 = 20.
        let result = evaluate(rect_contour(10, 10, 3, 3), dims(), &DetectConfig::default());
        assert_eq!(result, Err(Rejection::TooSmall));
    }

    #[test]
    fn horizon_strip_is_rejected() {
        // Full-width strip along the bottom edge touches three borders.
        let result = evaluate(
            rect_contour(0, 180, 200, 20),
            dims(),
            &DetectConfig::default(),
        );
        assert_eq!(result, Err(Rejection::EdgeStreak));
    }

    #[test]
    fn corner_square_is_kept() {
        // Touches two borders but is not elongated.
        let result = evaluate(rect_contour(0, 0, 30, 30), dims(), &DetectConfig::default());
        assert!(result.is_ok());
    }

    #[test]
    fn disk_scores_higher_than_square() {
        let disk = evaluate(disk_contour(100.0, 100.0, 30.0), dims(), &DetectConfig::default())
            .unwrap();
        let square = evaluate(rect_contour(20, 20, 40, 40), dims(), &DetectConfig::default())
            .unwrap();
        assert!(disk.circularity > 0.95, "disk circularity {}", disk.circularity);
        assert!((square.circularity - 2.0 / std::f64::consts::PI).abs() < 0.01);
        assert_eq!(rank(&disk, &square), Ordering::Less);
    }

    #[test]
    fn ties_break_by_larger_area() {
        let small = evaluate(rect_contour(10, 10, 20, 20), dims(), &DetectConfig::default())
            .unwrap();
        let large = evaluate(rect_contour(100, 100, 60, 60), dims(), &DetectConfig::default())
            .unwrap();
        assert!((small.circularity - large.circularity).abs() <= CIRCULARITY_TIE_EPSILON);
        assert_eq!(rank(&large, &small), Ordering::Less);
    }

    #[test]
    fn extract_ranks_disk_first() {
        let contours = vec![
            rect_contour(5, 5, 30, 30),
            disk_contour(120.0, 120.0, 25.0),
            rect_contour(150, 10, 2, 2),
        ];
        let (survivors, stats) = extract(contours, dims(), &DetectConfig::default());
        let survivors = survivors.unwrap();
        assert_eq!(stats.contours, 3);
        assert_eq!(stats.too_small, 1);
        assert_eq!(stats.survivors, 2);
        assert!(survivors[0].circularity > survivors[1].circularity);
        assert!((survivors[0].enclosing.center.x - 120.0).abs() < 1.5);
    }

    #[test]
    fn only_speckles_is_no_plausible_disk() {
        let contours = vec![rect_contour(5, 5, 3, 3), rect_contour(50, 50, 2, 2)];
        let (result, stats) = extract(contours, dims(), &DetectConfig::default());
        assert!(matches!(result, Err(Miss::NoPlausibleDisk)));
        assert_eq!(stats.too_small, 2);
    }
}
