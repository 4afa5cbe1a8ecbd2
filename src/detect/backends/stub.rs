use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::detect::backend::{InferenceBackend, InferenceParams, RawDetection};

/// Stub backend for testing and model-less runs.
///
/// Returns a fixed list of raw results, filtered by the confidence threshold,
/// on every call. It can also be told to fail so the fail-open path of the
/// detector can be exercised.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    results: Vec<RawDetection>,
    fail: bool,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: Vec<RawDetection>) -> Self {
        Self {
            results,
            ..Self::default()
        }
    }

    /// Backend whose every `infer` call returns an error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(&mut self, _image: &RgbImage, params: &InferenceParams) -> Result<Vec<RawDetection>> {
        self.calls += 1;
        if self.fail {
            return Err(anyhow!("stub backend configured to fail"));
        }
        Ok(self
            .results
            .iter()
            .filter(|det| det.confidence >= params.conf_threshold)
            .copied()
            .collect())
    }
}
