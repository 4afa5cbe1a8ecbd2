//! The single boundary between backend output and `Detection`.
//!
//! Whatever a backend produces, only boxes that satisfy the frame invariants
//! leave this module: corners ordered, every coordinate inside
//! `[0, width-1] x [0, height-1]`, confidence inside `[0, 1]`.

use crate::detect::backend::RawDetection;
use crate::detect::labels::ClassTable;
use crate::detect::result::Detection;
use crate::frame::BoundingBox;

/// Convert raw backend results for a `width x height` frame.
///
/// Results with a non-finite coordinate or confidence are dropped; everything
/// else survives in backend order.
pub fn normalize(
    raw: &[RawDetection],
    width: u32,
    height: u32,
    classes: &ClassTable,
) -> Vec<Detection> {
    if width == 0 || height == 0 {
        return Vec::new();
    }
    raw.iter()
        .filter_map(|det| normalize_one(det, width, height, classes))
        .collect()
}

fn normalize_one(
    det: &RawDetection,
    width: u32,
    height: u32,
    classes: &ClassTable,
) -> Option<Detection> {
    if !det.confidence.is_finite() || det.xyxy.iter().any(|v| !v.is_finite()) {
        log::debug!("dropping non-finite detection {:?}", det);
        return None;
    }
    let [x1, y1, x2, y2] = det.xyxy;
    let (lo_x, hi_x) = (x1.min(x2), x1.max(x2));
    let (lo_y, hi_y) = (y1.min(y2), y1.max(y2));

    let bbox = BoundingBox::new(
        floor_clamp(lo_x, width),
        floor_clamp(lo_y, height),
        ceil_clamp(hi_x, width),
        ceil_clamp(hi_y, height),
    );

    Some(Detection {
        bbox,
        confidence: det.confidence.clamp(0.0, 1.0),
        class_id: det.class_id,
        label: classes.label(det.class_id),
    })
}

fn floor_clamp(v: f32, dim: u32) -> u32 {
    v.floor().clamp(0.0, (dim - 1) as f32) as u32
}

fn ceil_clamp(v: f32, dim: u32) -> u32 {
    v.ceil().clamp(0.0, (dim - 1) as f32) as u32
}
