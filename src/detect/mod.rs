//! Object detection behind a fail-open wrapper.
//!
//! `ObjectDetector::predict` is the only entry point the loop uses. It hands
//! an RGB copy of the frame to the configured `InferenceBackend`, catches
//! errors and panics, and normalizes the raw output through
//! `adapter::normalize`.

pub mod adapter;
mod backend;
mod backends;
mod labels;
pub mod nms;
mod result;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use anyhow::Result;

pub use backend::{InferenceBackend, InferenceParams, RawDetection};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{ClassTable, COCO_CLASSES};
pub use result::Detection;

use crate::frame::Frame;

/// Model identifier that selects the stub backend.
pub const STUB_MODEL: &str = "stub";

pub struct ObjectDetector {
    backend: Box<dyn InferenceBackend>,
    params: InferenceParams,
    classes: ClassTable,
}

impl ObjectDetector {
    pub fn new(backend: Box<dyn InferenceBackend>, params: InferenceParams) -> Self {
        let classes = backend
            .class_names()
            .map(|names| ClassTable::new(names.to_vec()))
            .unwrap_or_default();
        Self {
            backend,
            params,
            classes,
        }
    }

    /// Replace the class table used for labels.
    pub fn with_classes(mut self, classes: ClassTable) -> Self {
        self.classes = classes;
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Detect objects in `frame`. Never fails: an absent frame, a backend
    /// error or a backend panic all yield an empty list.
    pub fn predict(&mut self, frame: Option<&Frame>) -> Vec<Detection> {
        let Some(frame) = frame else {
            return Vec::new();
        };
        let rgb = frame.to_rgb_image();
        let params = self.params;
        let backend = &mut self.backend;

        let raw = match catch_unwind(AssertUnwindSafe(|| backend.infer(&rgb, &params))) {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                log::warn!("inference failed ({}): {:#}", self.backend.name(), err);
                return Vec::new();
            }
            Err(_) => {
                log::warn!("inference panicked ({})", self.backend.name());
                return Vec::new();
            }
        };
        adapter::normalize(&raw, frame.width(), frame.height(), &self.classes)
    }
}

/// Build the backend named by `model`.
///
/// `"stub"` selects the stub backend; anything else is treated as an ONNX
/// model path and needs the `backend-tract` feature.
pub fn backend_from_model(model: &str, input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    if model == STUB_MODEL {
        return Ok(Box::new(StubBackend::new()));
    }
    load_model(Path::new(model), input_size)
}

#[cfg(feature = "backend-tract")]
fn load_model(path: &Path, input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    let mut backend = TractBackend::new(path, input_size)?;
    backend.warm_up()?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_model(path: &Path, _input_size: u32) -> Result<Box<dyn InferenceBackend>> {
    Err(anyhow::anyhow!(
        "model {} needs the backend-tract feature; use model = \"stub\" otherwise",
        path.display()
    ))
}
