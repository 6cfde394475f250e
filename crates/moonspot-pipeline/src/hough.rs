//! Hough-gradient disk locator.
//!
//! Each edge pixel votes for the centres that lie along its gradient
//! direction (both senses, so dark-on-bright and bright-on-dark disks both
//! work) at every radius in the search range. The accumulator peak is
//! the centre. The radius is the mode of the edge-to-centre distance
//! histogram, accepted only if enough of the circumference is backed by
//! edge pixels.
//!
//! Voting is split across the rayon pool into one shared accumulator of
//! atomic counters, so memory stays at a single `width * height` grid
//! however many workers run. Integer increments commute, which makes the
//! result independent of scheduling.

use std::sync::atomic::{AtomicU32, Ordering};

use image::GrayImage;
use rayon::prelude::*;

use crate::edges::{self, EdgeMap, EdgePoint};
use crate::types::{Circle, Dimensions, HoughConfig, Miss, Point};

/// Result of a successful Hough search.
#[derive(Debug, Clone, PartialEq)]
pub struct HoughFit {
    /// Centre and radius.
    pub circle: Circle,
    /// Accumulator votes at the peak cell.
    pub peak_votes: u32,
    /// Fraction of the circumference backed by edge pixels.
    pub support: f64,
}

/// Counts from one Hough run, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HoughStats {
    /// Edge pixels that voted.
    pub edge_pixels: usize,
    /// Smallest radius searched.
    pub min_radius: u32,
    /// Largest radius searched.
    pub max_radius: u32,
    /// Votes at the accumulator peak.
    pub peak_votes: u32,
    /// Circumference support at the chosen radius.
    pub support: f64,
}

/// Radius search range in pixels for an image of `dimensions`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn radius_range(dimensions: Dimensions, config: &HoughConfig) -> (u32, u32) {
    let shorter = dimensions.shorter_dim();
    let min = (shorter * config.min_radius_fraction).floor().max(1.0) as u32;
    let max = (shorter * config.max_radius_fraction).ceil().max(1.0) as u32;
    (min, max.max(min))
}

/// Run edge detection on `gray`.
#[must_use = "returns the edge map"]
pub fn edge_map(gray: &GrayImage, config: &HoughConfig) -> EdgeMap {
    edges::detect(gray, config.blur_sigma, config.canny_low, config.canny_high)
}

/// Locate a disk from a precomputed edge map.
///
/// The search misses with [`Miss::NoBrightRegion`] when there are no
/// edges at all and with [`Miss::NoPlausibleDisk`] when the votes or the
/// circumference support fall short. Stats are returned either way.
#[must_use]
pub fn locate_in_edges(
    map: &EdgeMap,
    dimensions: Dimensions,
    config: &HoughConfig,
) -> (Result<HoughFit, Miss>, HoughStats) {
    let (min_radius, max_radius) = radius_range(dimensions, config);
    let mut stats = HoughStats {
        edge_pixels: map.points.len(),
        min_radius,
        max_radius,
        ..HoughStats::default()
    };

    if map.points.is_empty() {
        return (Err(Miss::NoBrightRegion), stats);
    }

    let accumulator = vote(&map.points, dimensions, min_radius, max_radius);
    let Some((peak_index, peak_votes)) = peak(&accumulator) else {
        return (Err(Miss::NoPlausibleDisk), stats);
    };
    stats.peak_votes = peak_votes;
    log::debug!(
        "hough: {} edge pixels, radii {min_radius}..={max_radius}, peak {peak_votes} votes",
        map.points.len()
    );
    if peak_votes < config.min_center_votes {
        return (Err(Miss::NoPlausibleDisk), stats);
    }

    let center = refine_center(&accumulator, peak_index, dimensions);
    let Some((radius, support)) = fit_radius(&map.points, center, min_radius, max_radius) else {
        return (Err(Miss::NoPlausibleDisk), stats);
    };
    stats.support = support;
    log::debug!(
        "hough: centre ({:.1}, {:.1}) radius {radius:.1} support {support:.3}",
        center.x,
        center.y
    );
    if support < config.min_support {
        return (Err(Miss::NoPlausibleDisk), stats);
    }

    let fit = HoughFit {
        circle: Circle::new(center, radius),
        peak_votes,
        support,
    };
    (Ok(fit), stats)
}

/// Cast every edge pixel's votes into a `width * height` accumulator.
fn vote(points: &[EdgePoint], dimensions: Dimensions, min_r: u32, max_r: u32) -> Vec<u32> {
    let cells = dimensions.width as usize * dimensions.height as usize;
    let acc: Vec<AtomicU32> = (0..cells).map(|_| AtomicU32::new(0)).collect();

    points
        .par_iter()
        .for_each(|p| cast_votes(&acc, p, dimensions, min_r, max_r));

    acc.into_iter().map(AtomicU32::into_inner).collect()
}

/// Vote along both senses of `p`'s gradient for every radius.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn cast_votes(
    acc: &[AtomicU32],
    p: &EdgePoint,
    dimensions: Dimensions,
    min_r: u32,
    max_r: u32,
) {
    let Some((dx, dy)) = p.direction() else {
        return;
    };
    let w = f64::from(dimensions.width);
    let h = f64::from(dimensions.height);
    let (x, y) = (f64::from(p.x), f64::from(p.y));
    for r in min_r..=max_r {
        let r = f64::from(r);
        for sign in [1.0, -1.0] {
            let cx = (sign * r).mul_add(dx, x).round();
            let cy = (sign * r).mul_add(dy, y).round();
            if cx < 0.0 || cy < 0.0 || cx >= w || cy >= h {
                continue;
            }
            acc[cy as usize * dimensions.width as usize + cx as usize]
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Index and count of the highest cell; the lowest index wins ties.
fn peak(accumulator: &[u32]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, &v) in accumulator.iter().enumerate() {
        if v > 0 && best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best
}

/// Vote-weighted centroid of the 3x3 neighbourhood around the peak.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn refine_center(accumulator: &[u32], peak_index: usize, dimensions: Dimensions) -> Point {
    let w = dimensions.width as usize;
    let h = dimensions.height as usize;
    let (px, py) = (peak_index % w, peak_index / w);

    let mut total = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    for y in py.saturating_sub(1)..=(py + 1).min(h - 1) {
        for x in px.saturating_sub(1)..=(px + 1).min(w - 1) {
            let v = f64::from(accumulator[y * w + x]);
            total += v;
            sx += v * x as f64;
            sy += v * y as f64;
        }
    }
    if total <= 0.0 {
        return Point::new(px as f64, py as f64);
    }
    Point::new(sx / total, sy / total)
}

/// Radius with the most edge pixels within one pixel of it, and the
/// fraction of the circumference those pixels cover.
///
/// The radius is refined to the mean distance of the supporting pixels.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn fit_radius(points: &[EdgePoint], center: Point, min_r: u32, max_r: u32) -> Option<(f64, f64)> {
    let distances: Vec<f64> = points
        .iter()
        .map(|p| Point::new(f64::from(p.x), f64::from(p.y)).distance(center))
        .collect();

    let mut histogram = vec![0u32; max_r as usize + 2];
    for &d in &distances {
        let bin = d.round();
        if bin >= f64::from(min_r) && bin <= f64::from(max_r) {
            histogram[bin as usize] += 1;
        }
    }

    let window = |r: usize| {
        histogram[r.saturating_sub(1)..=(r + 1).min(histogram.len() - 1)]
            .iter()
            .sum::<u32>()
    };
    let mut best: Option<(usize, u32)> = None;
    for r in min_r as usize..=max_r as usize {
        let count = window(r);
        if count > 0 && best.is_none_or(|(_, b)| count > b) {
            best = Some((r, count));
        }
    }
    let (mode, count) = best?;

    let lo = mode as f64 - 1.5;
    let hi = mode as f64 + 1.5;
    let supporting: Vec<f64> = distances
        .into_iter()
        .filter(|&d| d >= lo && d < hi)
        .collect();
    let radius = if supporting.is_empty() {
        mode as f64
    } else {
        supporting.iter().sum::<f64>() / supporting.len() as f64
    };

    let circumference = std::f64::consts::TAU * radius.max(1.0);
    let support = (f64::from(count) / circumference).min(1.0);
    Some((radius, support))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    use super::*;

    fn disk_image(w: u32, h: u32, cx: i32, cy: i32, r: i32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([12]));
        draw_filled_circle_mut(&mut img, (cx, cy), r, Luma([230]));
        img
    }

    fn run(img: &GrayImage) -> (Result<HoughFit, Miss>, HoughStats) {
        let config = HoughConfig::default();
        let dims = Dimensions::new(img.width(), img.height());
        locate_in_edges(&edge_map(img, &config), dims, &config)
    }

    #[test]
    fn radius_range_scales_with_shorter_side() {
        let (lo, hi) = radius_range(Dimensions::new(400, 200), &HoughConfig::default());
        assert_eq!(lo, 4);
        assert_eq!(hi, 100);
    }

    #[test]
    fn radius_range_never_below_one() {
        let (lo, hi) = radius_range(Dimensions::new(3, 3), &HoughConfig::default());
        assert_eq!(lo, 1);
        assert!(hi >= lo);
    }

    #[test]
    fn finds_synthetic_disk() {
        let img = disk_image(200, 160, 90, 70, 35);
        let (result, stats) = run(&img);
        let fit = result.unwrap();
        assert!((fit.circle.center.x - 90.0).abs() <= 3.0, "{fit:?}");
        assert!((fit.circle.center.y - 70.0).abs() <= 3.0, "{fit:?}");
        assert!((fit.circle.radius - 35.0).abs() <= 3.0, "{fit:?}");
        assert!(fit.support >= HoughConfig::DEFAULT_MIN_SUPPORT);
        assert_eq!(stats.peak_votes, fit.peak_votes);
    }

    #[test]
    fn flat_image_is_no_bright_region() {
        let img = GrayImage::from_pixel(64, 64, Luma([40]));
        let (result, stats) = run(&img);
        assert_eq!(result, Err(Miss::NoBrightRegion));
        assert_eq!(stats.edge_pixels, 0);
    }

    #[test]
    fn straight_edge_is_not_a_disk() {
        // A horizon: bright lower half. Votes spread along lines, and no
        // radius gathers enough circumference support.
        let img = GrayImage::from_fn(120, 120, |_, y| if y < 60 { Luma([5]) } else { Luma([200]) });
        let (result, _) = run(&img);
        assert_eq!(result, Err(Miss::NoPlausibleDisk));
    }

    #[test]
    fn votes_from_every_worker_land_in_one_accumulator() {
        // Outward gradients on a radius-5 circle around (10, 10).
        let ring = [
            EdgePoint { x: 15, y: 10, gx: 1.0, gy: 0.0 },
            EdgePoint { x: 5, y: 10, gx: -1.0, gy: 0.0 },
            EdgePoint { x: 10, y: 15, gx: 0.0, gy: 1.0 },
            EdgePoint { x: 10, y: 5, gx: 0.0, gy: -1.0 },
        ];
        let points: Vec<EdgePoint> = ring.iter().copied().cycle().take(4 * 250).collect();
        let dims = Dimensions::new(30, 30);
        let acc = vote(&points, dims, 5, 5);

        assert_eq!(acc.len(), 900);
        assert_eq!(acc[10 * 30 + 10], 1000);
        // Each point also votes once outward, every such cell in bounds.
        assert_eq!(acc.iter().map(|&v| u64::from(v)).sum::<u64>(), 2000);
        assert_eq!(peak(&acc), Some((10 * 30 + 10, 1000)));
    }

    #[test]
    fn peak_prefers_lowest_index_on_ties() {
        assert_eq!(peak(&[0, 3, 1, 3]), Some((1, 3)));
        assert_eq!(peak(&[0, 0]), None);
    }
}
