//! Gradient edge map for the Hough-gradient locator.
//!
//! Canny-style edge detection (Gaussian blur, Sobel gradients,
//! non-maximum suppression, hysteresis) that also keeps the Sobel
//! gradient vectors, since the locator votes along gradient directions.
//!
//! `imageproc::edges::canny` is not used directly: its 0.26 hysteresis
//! underflows at the image border and skips two of the eight
//! neighbours (image-rs/imageproc#705). The hysteresis here bounds-checks
//! every neighbour and visits all eight.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::{filter_clamped, gaussian_blur_f32};
use imageproc::kernel;

/// An edge pixel with its gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgePoint {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Horizontal Sobel response.
    pub gx: f32,
    /// Vertical Sobel response.
    pub gy: f32,
}

impl EdgePoint {
    /// Unit vector along the gradient, or `None` where it vanishes.
    #[must_use]
    pub fn direction(&self) -> Option<(f64, f64)> {
        let gx = f64::from(self.gx);
        let gy = f64::from(self.gy);
        let norm = gx.hypot(gy);
        (norm > f64::EPSILON).then(|| (gx / norm, gy / norm))
    }
}

/// Thinned binary edges plus the gradient at each edge pixel.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    /// 255 on edge pixels, 0 elsewhere.
    pub edges: GrayImage,
    /// Edge pixels in raster order.
    pub points: Vec<EdgePoint>,
}

/// Detect edges in `gray`.
///
/// `sigma <= 0` skips the blur. Gradient magnitudes are raw 3x3 Sobel
/// responses (up to about 1442 for 8-bit input), and the thresholds
/// apply to that scale.
#[must_use = "returns the edge map"]
pub fn detect(gray: &GrayImage, sigma: f32, low: f32, high: f32) -> EdgeMap {
    let (w, h) = gray.dimensions();
    let blurred = if sigma > 0.0 {
        gaussian_blur_f32(gray, sigma)
    } else {
        gray.clone()
    };

    let gx: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_VERTICAL_3X3);

    let magnitude: Vec<f32> = gx
        .as_raw()
        .iter()
        .zip(gy.as_raw().iter())
        .map(|(&a, &b)| f32::from(a).hypot(f32::from(b)))
        .collect();

    let thinned = suppress_non_maxima(&magnitude, gx.as_raw(), gy.as_raw(), w, h);
    let edges = hysteresis(&thinned, w, h, low, high);

    let points = edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] != 0)
        .map(|(x, y, _)| EdgePoint {
            x,
            y,
            gx: f32::from(gx.get_pixel(x, y).0[0]),
            gy: f32::from(gy.get_pixel(x, y).0[0]),
        })
        .collect();

    EdgeMap { edges, points }
}

fn index(x: u32, y: u32, w: u32) -> usize {
    y as usize * w as usize + x as usize
}

/// Zero every gradient magnitude that is not a local maximum across the
/// edge. The one-pixel border is always zero.
fn suppress_non_maxima(magnitude: &[f32], gx: &[i16], gy: &[i16], w: u32, h: u32) -> Vec<f32> {
    let mut out = vec![0.0; magnitude.len()];
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = index(x, y, w);
            let m = magnitude[i];
            if m <= 0.0 {
                continue;
            }
            let mut angle = f32::from(gy[i]).atan2(f32::from(gx[i])).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }
            let (a, b) = if !(22.5..157.5).contains(&angle) {
                (index(x - 1, y, w), index(x + 1, y, w))
            } else if angle < 67.5 {
                (index(x + 1, y + 1, w), index(x - 1, y - 1, w))
            } else if angle < 112.5 {
                (index(x, y - 1, w), index(x, y + 1, w))
            } else {
                (index(x - 1, y + 1, w), index(x + 1, y - 1, w))
            };
            if m >= magnitude[a] && m >= magnitude[b] {
                out[i] = m;
            }
        }
    }
    out
}

/// Keep strong edges and the weak edges 8-connected to them.
fn hysteresis(thinned: &[f32], w: u32, h: u32, low: f32, high: f32) -> GrayImage {
    let mut out = GrayImage::new(w, h);
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if thinned[index(x, y, w)] < high || out.get_pixel(x, y).0[0] != 0 {
                continue;
            }
            out.put_pixel(x, y, Luma([255]));
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBOURS {
                    let (Some(nx), Some(ny)) =
                        (cx.checked_add_signed(dx), cy.checked_add_signed(dy))
                    else {
                        continue;
                    };
                    if nx >= w || ny >= h {
                        continue;
                    }
                    if thinned[index(nx, ny, w)] >= low && out.get_pixel(nx, ny).0[0] == 0 {
                        out.put_pixel(nx, ny, Luma([255]));
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    out
}

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
