//! External contour extraction for motion blobs.
//!
//! Any non-zero mask pixel is foreground. Contours come from `imageproc`'s
//! border following; only outer borders without a parent are kept, so blobs
//! sitting inside the hole of another blob are skipped. The mask is padded
//! with one background pixel on every side first, otherwise blobs touching
//! the image edge would have no traceable outer border.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::contour_area;
use imageproc::point::Point;

use crate::frame::{BoundingBox, MotionMask, MASK_BACKGROUND};

/// Outer boundary of one blob.
#[derive(Clone, Debug, PartialEq)]
pub struct Contour {
    points: Vec<(u32, u32)>,
    area: f64,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl Contour {
    pub fn points(&self) -> &[(u32, u32)] {
        &self.points
    }

    /// Area enclosed by the boundary polygon through the pixel centres.
    pub fn area(&self) -> f64 {
        self.area
    }

    /// Upright bounding rectangle as `(x, y, w, h)`.
    pub fn bounding_rect(&self) -> (u32, u32, u32, u32) {
        (self.x, self.y, self.w, self.h)
    }

    /// `(x, y, x + w, y + h)` clamped into the mask.
    pub fn bounding_box(&self, width: u32, height: u32) -> BoundingBox {
        BoundingBox::new(self.x, self.y, self.x + self.w, self.y + self.h).clamped(width, height)
    }

    fn from_padded(points: &[Point<i32>]) -> Option<Self> {
        let area = contour_area(points).abs();
        let points: Vec<(u32, u32)> = points
            .iter()
            .map(|p| ((p.x - 1).max(0) as u32, (p.y - 1).max(0) as u32))
            .collect();
        let min_x = points.iter().map(|p| p.0).min()?;
        let min_y = points.iter().map(|p| p.1).min()?;
        let max_x = points.iter().map(|p| p.0).max()?;
        let max_y = points.iter().map(|p| p.1).max()?;
        Some(Self {
            points,
            area,
            x: min_x,
            y: min_y,
            w: max_x - min_x + 1,
            h: max_y - min_y + 1,
        })
    }
}

/// Find the outer contour of every external blob, in raster order of their
/// top-left pixel.
pub fn find_external_contours(mask: &MotionMask) -> Vec<Contour> {
    let (width, height) = (mask.width(), mask.height());
    let padded = GrayImage::from_fn(width + 2, height + 2, |x, y| {
        if x == 0 || y == 0 || x > width || y > height {
            Luma([MASK_BACKGROUND])
        } else {
            Luma([mask.get(x - 1, y - 1)])
        }
    });

    find_contours::<i32>(&padded)
        .iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| Contour::from_padded(&c.points))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MASK_FOREGROUND, MASK_SHADOW};
    use anyhow::Result;

    fn mask_with(boxes: &[BoundingBox], width: u32, height: u32) -> Result<MotionMask> {
        let mut mask = MotionMask::empty(width, height)?;
        for bbox in boxes {
            mask.fill_box(*bbox, MASK_FOREGROUND);
        }
        Ok(mask)
    }

    #[test]
    fn square_blob_area_and_rect() -> Result<()> {
        let mask = mask_with(&[BoundingBox::new(3, 4, 13, 14)], 20, 20)?;
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 100.0);
        assert_eq!(contours[0].bounding_rect(), (3, 4, 11, 11));
        assert_eq!(contours[0].bounding_box(20, 20), BoundingBox::new(3, 4, 14, 15));
        Ok(())
    }

    #[test]
    fn separate_blobs_are_separate_contours() -> Result<()> {
        let mask = mask_with(
            &[BoundingBox::new(1, 1, 4, 4), BoundingBox::new(10, 10, 15, 12)],
            20,
            20,
        )?;
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[0].area(), 9.0);
        assert_eq!(contours[1].area(), 10.0);
        Ok(())
    }

    #[test]
    fn diagonal_pixels_join_one_blob() -> Result<()> {
        let mut mask = MotionMask::empty(6, 6)?;
        mask.set(1, 1, MASK_FOREGROUND);
        mask.set(2, 2, MASK_FOREGROUND);
        mask.set(3, 3, MASK_FOREGROUND);
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].area(), 0.0);
        assert_eq!(contours[0].bounding_rect(), (1, 1, 3, 3));
        Ok(())
    }

    #[test]
    fn blob_inside_a_hole_is_not_external() -> Result<()> {
        let mut mask = mask_with(&[BoundingBox::new(2, 2, 16, 16)], 20, 20)?;
        mask.fill_box(BoundingBox::new(4, 4, 14, 14), 0);
        mask.fill_box(BoundingBox::new(8, 8, 10, 10), MASK_FOREGROUND);

        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_rect(), (2, 2, 15, 15));
        assert_eq!(contours[0].area(), 14.0 * 14.0);
        Ok(())
    }

    #[test]
    fn blob_on_border_is_clamped() -> Result<()> {
        let mask = mask_with(&[BoundingBox::new(5, 5, 9, 9)], 10, 10)?;
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_box(10, 10), BoundingBox::new(5, 5, 9, 9));
        Ok(())
    }

    #[test]
    fn full_frame_and_shadow_pixels_are_foreground() -> Result<()> {
        let mut mask = MotionMask::empty(8, 6)?;
        mask.fill_box(BoundingBox::new(0, 0, 7, 5), MASK_SHADOW);
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].bounding_rect(), (0, 0, 8, 6));
        assert_eq!(contours[0].area(), 7.0 * 5.0);
        assert!(contours[0].points().iter().all(|&(x, y)| x < 8 && y < 6));
        Ok(())
    }
}
