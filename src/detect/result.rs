use crate::frame::BoundingBox;

/// A labelled, scored box clamped to the frame it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub class_id: usize,
    pub label: String,
}

impl Detection {
    /// Caption drawn above the box, e.g. `person 0.87`.
    pub fn caption(&self) -> String {
        format!("{} {:.2}", self.label, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_uses_two_decimals() {
        let det = Detection {
            bbox: BoundingBox::new(0, 0, 1, 1),
            confidence: 0.875,
            class_id: 0,
            label: "person".to_string(),
        };
        assert_eq!(det.caption(), "person 0.88");
    }
}
