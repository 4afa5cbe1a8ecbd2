//! Background-subtraction motion detection.
//!
//! `MotionDetector` owns the running background model. Each call updates the
//! model, cleans the raw mask (opening then dilation) and turns the external
//! blobs whose contour area reaches `area_threshold` into motion boxes.

mod background;
mod contours;

pub use background::{BackgroundModel, MogParams};
pub use contours::{find_external_contours, Contour};

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_open, Mask};

use crate::frame::{BoundingBox, Frame, MotionMask, MASK_FOREGROUND};

/// Largest structuring element side `imageproc` masks can centre.
pub const MAX_KERNEL_SIZE: usize = 255;

/// Motion detector settings.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionParams {
    /// Minimum contour area for a blob to become a motion box.
    pub area_threshold: f64,
    /// Side of the elliptical structuring element (forced odd, at most 255).
    pub kernel_size: usize,
    pub dilate_iterations: u32,
    pub background: MogParams,
}

impl Default for MotionParams {
    fn default() -> Self {
        Self {
            area_threshold: 500.0,
            kernel_size: 3,
            dilate_iterations: 2,
            background: MogParams::default(),
        }
    }
}

/// Output of one `MotionDetector::detect` call.
#[derive(Clone, Debug)]
pub struct MotionResult {
    /// Cleaned foreground mask (0 / shadow / foreground levels).
    pub mask: MotionMask,
    pub found: bool,
    pub boxes: Vec<BoundingBox>,
}

pub struct MotionDetector {
    model: BackgroundModel,
    kernel: Mask,
    area_threshold: f64,
    dilate_iterations: u32,
}

impl MotionDetector {
    pub fn new(params: MotionParams) -> Self {
        Self {
            kernel: ellipse_kernel(params.kernel_size),
            model: BackgroundModel::new(params.background),
            area_threshold: params.area_threshold,
            dilate_iterations: params.dilate_iterations,
        }
    }

    /// Update the background with `frame` and report the moving regions.
    pub fn detect(&mut self, frame: &Frame) -> MotionResult {
        let raw = self.model.apply(frame).into_gray_image();
        let mask = clean_mask(&raw, &self.kernel, self.dilate_iterations);
        let mask = MotionMask::from_raw_parts(frame.width(), frame.height(), mask.into_raw());
        let boxes = extract_motion_boxes(&mask, self.area_threshold);
        log::debug!(
            "motion: {} foreground px, {} boxes",
            mask.count_nonzero(),
            boxes.len()
        );
        MotionResult {
            found: !boxes.is_empty(),
            mask,
            boxes,
        }
    }
}

/// Elliptical structuring element inscribed in a `size x size` square.
///
/// Size 3 is the 4-connected cross. Even sizes round up to the next odd one.
pub fn ellipse_kernel(size: usize) -> Mask {
    let size = (size.clamp(1, MAX_KERNEL_SIZE) | 1) as u32;
    let r = (size / 2) as i32;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
    let mut image = GrayImage::new(size, size);
    for row in 0..size as i32 {
        let dy = row - r;
        let dx = (r as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as i32;
        for col in (r - dx).max(0)..(r + dx + 1).min(size as i32) {
            image.put_pixel(col as u32, row as u32, Luma([MASK_FOREGROUND]));
        }
    }
    Mask::from_image(&image, r as u8, r as u8)
}

/// Opening removes specks smaller than the kernel, then each dilation closes
/// small gaps inside blobs.
fn clean_mask(raw: &GrayImage, kernel: &Mask, dilate_iterations: u32) -> GrayImage {
    let mut mask = grayscale_open(raw, kernel);
    for _ in 0..dilate_iterations {
        mask = grayscale_dilate(&mask, kernel);
    }
    mask
}

/// Boxes for every external blob in `mask` whose area is at least `area_threshold`.
pub fn extract_motion_boxes(mask: &MotionMask, area_threshold: f64) -> Vec<BoundingBox> {
    find_external_contours(mask)
        .into_iter()
        .filter(|contour| contour.area() >= area_threshold)
        .map(|contour| contour.bounding_box(mask.width(), mask.height()))
        .collect()
}
