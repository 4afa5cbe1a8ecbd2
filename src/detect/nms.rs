//! Greedy, class-aware non-maximum suppression over raw results.

use crate::detect::backend::RawDetection;

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix1 = a[0].max(b[0]);
    let iy1 = a[1].max(b[1]);
    let ix2 = a[2].min(b[2]);
    let iy2 = a[3].min(b[3]);
    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area = |r: &[f32; 4]| (r[2] - r[0]).max(0.0) * (r[3] - r[1]).max(0.0);
    let union = area(a) + area(b) - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Keep the highest-confidence box of every overlapping same-class group.
///
/// Output is sorted by descending confidence.
pub fn nms(mut boxes: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(boxes[i]);
        for j in (i + 1)..boxes.len() {
            if boxes[j].class_id == boxes[i].class_id
                && iou(&boxes[i].xyxy, &boxes[j].xyxy) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(xyxy: [f32; 4], confidence: f32, class_id: usize) -> RawDetection {
        RawDetection {
            xyxy,
            confidence,
            class_id,
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    }

    #[test]
    fn overlapping_same_class_is_suppressed() {
        let kept = nms(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0.6, 0),
                det([1.0, 1.0, 11.0, 11.0], 0.9, 0),
                det([1.0, 1.0, 11.0, 11.0], 0.5, 2),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class_id, 2);
    }
}
