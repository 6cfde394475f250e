//! Contour tracing: outer boundaries of connected foreground regions.
//!
//! Uses Suzuki-Abe border following via `imageproc::contours::find_contours`.
//! Only outer borders are kept. Hole borders (dark maria, craters that
//! fall below the threshold) belong to the region around them and would
//! otherwise show up as extra, overlapping candidates.
//!
//! The tracer only opens an outer border at a foreground pixel with a
//! background pixel to its left, so a region starting in column 0 would
//! be reported as a hole. The mask is traced inside a 1-pixel background
//! frame and the points are shifted back.

use image::GrayImage;
use image::imageops;
use imageproc::contours::BorderType;

use crate::threshold::BinaryMask;
use crate::types::{Contour, GridPoint};

/// Trace the outer boundary of every connected region in `mask`.
///
/// Regions are 8-connected, including regions cut off by the image
/// border. Contours come back in tracing (raster discovery) order.
#[must_use = "returns the traced contours"]
pub fn trace_outer(mask: &BinaryMask) -> Vec<Contour> {
    let framed = framed(mask.as_image());
    let contours: Vec<imageproc::contours::Contour<i32>> =
        imageproc::contours::find_contours(&framed);

    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && !c.points.is_empty())
        .map(|c| {
            Contour::new(
                c.points
                    .into_iter()
                    .map(|p| GridPoint::new(p.x - 1, p.y - 1))
                    .collect(),
            )
        })
        .collect()
}

/// Copy of `image` surrounded by one pixel of background.
fn framed(image: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(image.width() + 2, image.height() + 2);
    imageops::replace(&mut out, image, 1, 1);
    out
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    fn mask_from(img: &GrayImage) -> BinaryMask {
        BinaryMask::from_threshold(img, 127)
    }

    #[test]
    fn empty_mask_has_no_contours() {
        let img = GrayImage::new(10, 10);
        assert!(trace_outer(&mask_from(&img)).is_empty());
    }

    #[test]
    fn single_pixel_contour_stays_on_the_pixel() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(5, 5, Luma([255]));
        let contours = trace_outer(&mask_from(&img));
        assert_eq!(contours.len(), 1);
        assert!(!contours[0].is_empty());
        assert!(contours[0].points().iter().all(|&p| p == GridPoint::new(5, 5)));
    }

    #[test]
    fn rectangle_boundary_spans_its_extent() {
        let mut img = GrayImage::new(20, 20);
        for y in 5..15 {
            for x in 4..16 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = trace_outer(&mask_from(&img));
        assert_eq!(contours.len(), 1);
        let bbox = contours[0].bounding_box();
        assert_eq!(bbox, Some(crate::types::Rect::new(4, 5, 12, 10)));
    }

    #[test]
    fn ring_yields_only_outer_border() {
        // A filled square with a hole punched in the middle.
        let mut img = GrayImage::new(30, 30);
        for y in 5..25 {
            for x in 5..25 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 12..18 {
            for x in 12..18 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let contours = trace_outer(&mask_from(&img));
        assert_eq!(contours.len(), 1);
        assert_eq!(
            contours[0].bounding_box(),
            Some(crate::types::Rect::new(5, 5, 20, 20))
        );
    }

    #[test]
    fn region_on_the_left_border_is_outer() {
        let mut img = GrayImage::new(20, 20);
        for y in 6..14 {
            for x in 0..5 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = trace_outer(&mask_from(&img));
        assert_eq!(contours.len(), 1);
        assert_eq!(
            contours[0].bounding_box(),
            Some(crate::types::Rect::new(0, 6, 5, 8))
        );
    }

    #[test]
    fn region_in_the_top_left_corner_is_outer() {
        let mut img = GrayImage::new(20, 20);
        for y in 0..7 {
            for x in 0..9 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = trace_outer(&mask_from(&img));
        assert_eq!(contours.len(), 1);
        assert_eq!(
            contours[0].bounding_box(),
            Some(crate::types::Rect::new(0, 0, 9, 7))
        );
    }

    #[test]
    fn full_frame_region_keeps_image_coordinates() {
        let img = GrayImage::from_pixel(6, 4, Luma([255]));
        let contours = trace_outer(&mask_from(&img));
        assert_eq!(contours.len(), 1);
        assert!(
            contours[0]
                .points()
                .iter()
                .all(|p| (0..6).contains(&p.x) && (0..4).contains(&p.y))
        );
        assert_eq!(
            contours[0].bounding_box(),
            Some(crate::types::Rect::new(0, 0, 6, 4))
        );
    }

    #[test]
    fn separate_blobs_yield_separate_contours() {
        let mut img = GrayImage::new(30, 10);
        for y in 2..6 {
            for x in 2..6 {
                img.put_pixel(x, y, Luma([255]));
                img.put_pixel(x + 20, y, Luma([255]));
            }
        }
        assert_eq!(trace_outer(&mask_from(&img)).len(), 2);
    }
}
