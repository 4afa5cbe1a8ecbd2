use anyhow::Result;
use image::RgbImage;

/// Thresholds and input geometry handed to a backend on every call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InferenceParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// Side of the square network input.
    pub input_size: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            conf_threshold: 0.35,
            iou_threshold: 0.45,
            input_size: 640,
        }
    }
}

/// One unnormalized backend result, in source-image pixel coordinates.
///
/// Values may be fractional, out of bounds, inverted or non-finite; the
/// adapter is responsible for turning them into valid detections.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawDetection {
    pub xyxy: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

/// Inference backend trait.
///
/// Backends receive an RGB copy of the frame and own everything between
/// that image and the raw box list: resizing, tensor layout, confidence
/// filtering and overlap suppression.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run inference on one image.
    fn infer(&mut self, image: &RgbImage, params: &InferenceParams) -> Result<Vec<RawDetection>>;

    /// Class table shipped with the model, if any.
    fn class_names(&self) -> Option<&[String]> {
        None
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
