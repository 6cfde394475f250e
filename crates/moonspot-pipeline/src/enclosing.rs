//! Minimal enclosing circle.
//!
//! Welzl's algorithm in its iterative (move-to-front free) form, run on
//! the convex hull of the input since only hull vertices can lie on the
//! enclosing circle. Expected linear time needs the points in random
//! order; a fixed-seed shuffle keeps that and makes every call on the
//! same input bit-for-bit identical.

use geo::ConvexHull;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::types::{Circle, Contour, Point};

/// Seed for the point shuffle.
const SHUFFLE_SEED: u64 = 0x6d6f_6f6e;

/// Relative slack when testing whether a point lies inside a circle.
const CONTAINS_EPSILON: f64 = 1e-9;

/// Fit the minimal enclosing circle to a contour's boundary points.
///
/// Returns `None` for an empty contour.
#[must_use]
pub fn fit_disk(contour: &Contour) -> Option<Circle> {
    let points: Vec<Point> = contour.points().iter().map(|p| p.to_point()).collect();
    minimal_enclosing_circle(&points)
}

/// Smallest circle containing every point in `points`.
///
/// Returns `None` when `points` is empty.
#[must_use]
pub fn minimal_enclosing_circle(points: &[Point]) -> Option<Circle> {
    let first = *points.first()?;

    let mut candidates = hull_vertices(points);
    if candidates.is_empty() {
        candidates.push(first);
    }
    let mut rng = StdRng::seed_from_u64(SHUFFLE_SEED);
    candidates.shuffle(&mut rng);

    let mut circle = Circle::new(candidates[0], 0.0);
    for i in 1..candidates.len() {
        let pi = candidates[i];
        if encloses(&circle, pi) {
            continue;
        }
        circle = Circle::new(pi, 0.0);
        for j in 0..i {
            let pj = candidates[j];
            if encloses(&circle, pj) {
                continue;
            }
            circle = diametral(pi, pj);
            for &pk in &candidates[..j] {
                if !encloses(&circle, pk) {
                    circle = circumscribed(pi, pj, pk);
                }
            }
        }
    }
    Some(circle)
}

/// Convex hull vertices, without the closing duplicate.
///
/// Small inputs are returned as-is: the hull of one or two points is
/// degenerate and the full scan is already cheap.
fn hull_vertices(points: &[Point]) -> Vec<Point> {
    if points.len() <= 3 {
        return points.to_vec();
    }
    let multi: geo::MultiPoint<f64> = points
        .iter()
        .map(|p| geo::Point::new(p.x, p.y))
        .collect();
    let hull = multi.convex_hull();
    let mut vertices: Vec<Point> = hull
        .exterior()
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect();
    if vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}

fn encloses(circle: &Circle, p: Point) -> bool {
    let slack = CONTAINS_EPSILON * circle.radius.max(1.0);
    p.distance(circle.center) <= circle.radius + slack
}

/// Circle with segment `a`-`b` as its diameter.
fn diametral(a: Point, b: Point) -> Circle {
    let center = Point::new(f64::midpoint(a.x, b.x), f64::midpoint(a.y, b.y));
    Circle::new(center, a.distance(b) / 2.0)
}

/// Smallest circle through or around three points.
///
/// Collinear triples fall back to the diametral circle of the farthest
/// pair, which then also contains the middle point.
fn circumscribed(a: Point, b: Point, c: Point) -> Circle {
    let bx = b.x - a.x;
    let by = b.y - a.y;
    let cx = c.x - a.x;
    let cy = c.y - a.y;
    let d = 2.0 * bx.mul_add(cy, -(by * cx));

    if d.abs() <= f64::EPSILON {
        return [diametral(a, b), diametral(a, c), diametral(b, c)]
            .into_iter()
            .max_by(|l, r| l.radius.total_cmp(&r.radius))
            .unwrap_or_else(|| diametral(a, b));
    }

    let b_sq = bx.mul_add(bx, by * by);
    let c_sq = cx.mul_add(cx, cy * cy);
    let ux = cy.mul_add(b_sq, -(by * c_sq)) / d;
    let uy = bx.mul_add(c_sq, -(cx * b_sq)) / d;
    let center = Point::new(a.x + ux, a.y + uy);
    Circle::new(center, ux.hypot(uy))
}
