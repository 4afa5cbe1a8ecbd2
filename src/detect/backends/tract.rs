#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, InferenceParams, RawDetection};
use crate::detect::nms::nms;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model takes a `[1, 3, S, S]` float input in `[0, 1]` and yields
/// `[1, 4 + classes, candidates]` where the first four rows are centre x,
/// centre y, width and height in input pixels.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for `input_size` square inputs.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.input_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

/// Decode a YOLOv8 `[1, 4 + classes, candidates]` output into boxes in source
/// image pixels, keeping the best class per candidate, then suppress overlaps.
pub(crate) fn decode_yolo(
    view: tract_ndarray::ArrayViewD<'_, f32>,
    image_size: (u32, u32),
    input_size: u32,
    params: &InferenceParams,
) -> Result<Vec<RawDetection>> {
    let shape = view.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] < 5 {
        return Err(anyhow!("unexpected model output shape {:?}", shape));
    }
    let rows = shape[1];
    let candidates = shape[2];

    let sx = image_size.0 as f32 / input_size as f32;
    let sy = image_size.1 as f32 / input_size as f32;

    let mut found = Vec::new();
    for i in 0..candidates {
        let mut best = (0usize, f32::NEG_INFINITY);
        for row in 4..rows {
            let score = view[[0, row, i]];
            if score > best.1 {
                best = (row - 4, score);
            }
        }
        let (class_id, confidence) = best;
        if confidence.is_nan() || confidence < params.conf_threshold {
            continue;
        }
        let cx = view[[0, 0, i]];
        let cy = view[[0, 1, i]];
        let w = view[[0, 2, i]];
        let h = view[[0, 3, i]];
        found.push(RawDetection {
            xyxy: [
                (cx - w / 2.0) * sx,
                (cy - h / 2.0) * sy,
                (cx + w / 2.0) * sx,
                (cy + h / 2.0) * sy,
            ],
            confidence,
            class_id,
        });
    }
    Ok(nms(found, params.iou_threshold))
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, image: &RgbImage, params: &InferenceParams) -> Result<Vec<RawDetection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        decode_yolo(view, image.dimensions(), self.input_size, params)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.infer(&blank, &InferenceParams::default()).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two classes, two candidates; rows are cx, cy, w, h, score0, score1.
    fn output(columns: [[f32; 6]; 2]) -> tract_ndarray::ArrayD<f32> {
        tract_ndarray::Array3::from_shape_fn((1, 6, 2), |(_, row, i)| columns[i][row]).into_dyn()
    }

    #[test]
    fn decodes_best_class_and_drops_low_scores() -> Result<()> {
        let out = output([
            [100.0, 50.0, 40.0, 20.0, 0.1, 0.8],
            [300.0, 300.0, 10.0, 10.0, 0.2, 0.1],
        ]);
        let found = decode_yolo(out.view(), (640, 640), 640, &InferenceParams::default())?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 1);
        assert_eq!(found[0].confidence, 0.8);
        assert_eq!(found[0].xyxy, [80.0, 40.0, 120.0, 60.0]);
        Ok(())
    }

    #[test]
    fn rescales_to_non_square_image() -> Result<()> {
        let out = output([
            [100.0, 50.0, 40.0, 20.0, 0.9, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ]);
        let found = decode_yolo(out.view(), (1280, 320), 640, &InferenceParams::default())?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 0);
        assert_eq!(found[0].xyxy, [160.0, 20.0, 240.0, 30.0]);
        Ok(())
    }

    #[test]
    fn rejects_unexpected_shape() {
        let out = tract_ndarray::Array2::<f32>::zeros((6, 2)).into_dyn();
        assert!(decode_yolo(out.view(), (640, 640), 640, &InferenceParams::default()).is_err());
    }
}
