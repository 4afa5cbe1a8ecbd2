//! Motion-fusion detector
//!
//! Fuses per-pixel background subtraction with a single-shot object detector:
//! every detection is drawn on the frame, and detections sitting on a moving
//! region of the scene are emphasised.
//!
//! # Module Structure
//!
//! - `frame`: BGR frames, motion masks and bounding boxes
//! - `ingest`: Frame sources (synthetic scenes, image directories, V4L2)
//! - `motion`: Background model, mask cleanup, blob extraction
//! - `detect`: Inference backends, output normalization, class labels
//! - `render`: Box/label compositing and the motion overlay
//! - `snapshot`: Timestamped PNG snapshots
//! - `control`: Display sink and keyboard commands
//! - `pipeline`: The frame-synchronous loop tying the above together
//! - `status`: Standalone HTTP run-flag service
//! - `config`: TOML configuration with environment overrides

pub mod config;
pub mod control;
pub mod detect;
pub mod font;
pub mod frame;
pub mod ingest;
pub mod motion;
pub mod pipeline;
pub mod render;
pub mod snapshot;
pub mod status;

pub use config::FusionConfig;
pub use control::{ConsoleDisplay, DisplaySink, Key};
pub use detect::{Detection, InferenceBackend, ObjectDetector};
pub use frame::{BoundingBox, Frame, MotionMask};
pub use ingest::{CaptureConfig, CaptureSource, FrameSource};
pub use motion::{MotionDetector, MotionResult};
pub use pipeline::{Pipeline, RunSummary, StopReason, TickOutput};
pub use render::{Annotation, Compositor, RenderStyle};
pub use snapshot::SnapshotWriter;
pub use status::{RunState, StatusConfig, StatusHandle, StatusServer};
