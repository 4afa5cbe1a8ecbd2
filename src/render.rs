//! Detection compositor: fuses detections with the motion mask and draws
//! the annotated overlay.
//!
//! Everything is drawn on a scratch copy of the frame, which is then blended
//! back with `overlay_alpha` so highlights stay slightly translucent.

use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::font;
use crate::frame::{BoundingBox, Frame, MotionMask};

/// BGR colours used by the compositor.
pub const DEFAULT_COLOR: [u8; 3] = [0, 255, 0];
pub const PERSON_COLOR: [u8; 3] = [0, 128, 255];
pub const MOVING_COLOR: [u8; 3] = [255, 0, 0];
pub const TEXT_COLOR: [u8; 3] = [255, 255, 255];
/// Colour of the raw motion-box overlay drawn by the loop.
pub const MOTION_BOX_COLOR: [u8; 3] = [0, 0, 255];

#[derive(Clone, Debug, PartialEq)]
pub struct RenderStyle {
    pub default_color: [u8; 3],
    pub person_color: [u8; 3],
    pub moving_color: [u8; 3],
    pub text_color: [u8; 3],
    pub thickness: u32,
    pub moving_thickness: u32,
    /// Mean mask value a box must exceed to count as moving.
    pub motion_threshold: f64,
    /// Weight of the overlay in the final blend.
    pub overlay_alpha: f32,
    /// Extra space around the caption inside its background.
    pub label_padding: u32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            default_color: DEFAULT_COLOR,
            person_color: PERSON_COLOR,
            moving_color: MOVING_COLOR,
            text_color: TEXT_COLOR,
            thickness: 2,
            moving_thickness: 3,
            motion_threshold: 10.0,
            overlay_alpha: 0.9,
            label_padding: 6,
        }
    }
}

/// What the compositor drew for one detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub caption: String,
    pub moving: bool,
    pub color: [u8; 3],
    pub thickness: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Compositor {
    style: RenderStyle,
}

impl Compositor {
    pub fn new(style: RenderStyle) -> Self {
        Self { style }
    }

    /// Annotate `frame` in place and return what was drawn.
    ///
    /// An absent frame draws nothing. A mask whose size differs from the frame
    /// is ignored, so no detection is marked moving.
    pub fn render(
        &self,
        frame: Option<&mut Frame>,
        detections: &[Detection],
        motion_mask: Option<&MotionMask>,
    ) -> Vec<Annotation> {
        let Some(frame) = frame else {
            return Vec::new();
        };
        let (width, height) = (frame.width(), frame.height());

        let mask = motion_mask.filter(|mask| {
            let matches = mask.width() == width && mask.height() == height;
            if !matches {
                log::warn!(
                    "motion mask {}x{} does not match frame {}x{}; ignoring",
                    mask.width(),
                    mask.height(),
                    width,
                    height
                );
            }
            matches
        });

        let annotations: Vec<Annotation> = detections
            .iter()
            .map(|det| self.annotate(det, mask, width, height))
            .collect();
        if annotations.is_empty() {
            return annotations;
        }

        let Some(mut overlay) = scratch_copy(frame) else {
            return annotations;
        };
        for annotation in &annotations {
            self.draw_annotation(&mut overlay, annotation);
        }
        blend(frame, overlay.as_raw(), self.style.overlay_alpha);
        annotations
    }

    fn annotate(
        &self,
        det: &Detection,
        mask: Option<&MotionMask>,
        width: u32,
        height: u32,
    ) -> Annotation {
        let bbox = det.bbox.clamped(width, height);
        let moving = mask.is_some_and(|m| m.mean_in(bbox) > self.style.motion_threshold);
        let color = if moving {
            self.style.moving_color
        } else if det.label.eq_ignore_ascii_case("person") {
            self.style.person_color
        } else {
            self.style.default_color
        };
        Annotation {
            bbox,
            caption: det.caption(),
            moving,
            color,
            thickness: if moving {
                self.style.moving_thickness
            } else {
                self.style.thickness
            },
        }
    }

    fn draw_annotation(&self, image: &mut RgbImage, annotation: &Annotation) {
        draw_box(image, annotation.bbox, annotation.color, annotation.thickness);

        let (text_w, text_h) = font::text_size(&annotation.caption);
        let pad = self.style.label_padding;
        let label_h = text_h + pad;
        let top = annotation.bbox.y1.saturating_sub(label_h);
        let left = annotation.bbox.x1;
        let label_w = (text_w + pad).min(image.width() - left);
        let label_h = label_h.min(image.height() - top);
        if label_w > 0 && label_h > 0 {
            let rect = Rect::at(left as i32, top as i32).of_size(label_w, label_h);
            draw_filled_rect_mut(image, rect, Rgb(annotation.color));
        }
        font::draw_text(
            image,
            (left + pad / 2) as i64,
            (top + pad / 2) as i64,
            &annotation.caption,
            self.style.text_color,
        );
    }
}

/// Draw thin motion rectangles straight onto the frame (no blending).
pub fn draw_motion_boxes(frame: &mut Frame, boxes: &[BoundingBox], color: [u8; 3]) {
    if boxes.is_empty() {
        return;
    }
    let Some(mut image) = scratch_copy(frame) else {
        return;
    };
    for bbox in boxes {
        draw_box(&mut image, bbox.clamped(frame.width(), frame.height()), color, 1);
    }
    frame.as_bytes_mut().copy_from_slice(image.as_raw());
}

/// `thickness` nested one-pixel outlines growing inwards from `bbox`.
fn draw_box(image: &mut RgbImage, bbox: BoundingBox, color: [u8; 3], thickness: u32) {
    for inset in 0..thickness {
        if bbox.width() <= 2 * inset || bbox.height() <= 2 * inset {
            break;
        }
        let rect = Rect::at((bbox.x1 + inset) as i32, (bbox.y1 + inset) as i32)
            .of_size(bbox.width() - 2 * inset, bbox.height() - 2 * inset);
        draw_hollow_rect_mut(image, rect, Rgb(color));
    }
}

/// The frame's BGR bytes viewed as a 3-channel image; drawing is channel-agnostic.
fn scratch_copy(frame: &Frame) -> Option<RgbImage> {
    ImageBuffer::from_raw(frame.width(), frame.height(), frame.as_bytes().to_vec())
}

/// `frame = alpha * overlay + (1 - alpha) * frame`, rounded per channel.
fn blend(frame: &mut Frame, overlay: &[u8], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for (dst, &src) in frame.as_bytes_mut().iter_mut().zip(overlay) {
        let mixed = alpha * src as f32 + (1.0 - alpha) * *dst as f32;
        *dst = mixed.round().clamp(0.0, 255.0) as u8;
    }
}
