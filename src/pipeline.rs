//! The frame-synchronous fusion loop.
//!
//! One tick: capture, motion detection, object detection, compositing, the
//! motion-box overlay, then presentation and one key poll. Nothing is queued;
//! a slow tick simply delays the next capture.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::FusionConfig;
use crate::control::{DisplaySink, Key};
use crate::detect::{backend_from_model, ClassTable, Detection, ObjectDetector};
use crate::frame::{BoundingBox, Frame};
use crate::ingest::FrameSource;
use crate::motion::MotionDetector;
use crate::render::{draw_motion_boxes, Annotation, Compositor, MOTION_BOX_COLOR};
use crate::snapshot::SnapshotWriter;

/// Everything one tick produced.
#[derive(Clone, Debug)]
pub struct TickOutput {
    /// Annotated frame, ready to present.
    pub frame: Frame,
    pub detections: Vec<Detection>,
    pub annotations: Vec<Annotation>,
    pub motion_found: bool,
    pub motion_boxes: Vec<BoundingBox>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The source reported end of stream.
    EndOfStream,
    /// The source failed; the message is the error chain.
    CaptureFailed(String),
    Quit,
    /// The shutdown flag was raised (e.g. Ctrl-C).
    Shutdown,
    FrameLimit,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub frames: u64,
    pub motion_frames: u64,
    pub detections: u64,
    pub snapshots: Vec<PathBuf>,
    pub stop: StopReason,
}

pub struct Pipeline {
    motion: MotionDetector,
    detector: ObjectDetector,
    compositor: Compositor,
    snapshots: SnapshotWriter,
}

impl Pipeline {
    pub fn new(
        motion: MotionDetector,
        detector: ObjectDetector,
        compositor: Compositor,
        snapshots: SnapshotWriter,
    ) -> Self {
        Self {
            motion,
            detector,
            compositor,
            snapshots,
        }
    }

    /// Build every component from a resolved config.
    pub fn from_config(cfg: &FusionConfig) -> Result<Self> {
        let backend = backend_from_model(&cfg.model, cfg.detector.input_size)
            .with_context(|| format!("failed to load model {}", cfg.model))?;
        let mut detector = ObjectDetector::new(backend, cfg.inference_params());
        if let Some(path) = &cfg.detector.labels {
            detector = detector.with_classes(ClassTable::from_file(path)?);
        }
        if cfg.motion_history != cfg.motion.model_history {
            log::info!(
                "motion_history = {} noted; background model history is {}",
                cfg.motion_history,
                cfg.motion.model_history
            );
        }
        log::info!(
            "pipeline: backend={} conf={} iou={} input={} area>={}",
            detector.backend_name(),
            cfg.conf_threshold,
            cfg.iou_threshold,
            cfg.detector.input_size,
            cfg.motion_area_threshold
        );
        Ok(Self::new(
            MotionDetector::new(cfg.motion_params()),
            detector,
            Compositor::new(cfg.render_style()),
            SnapshotWriter::new(cfg.snapshot_dir.clone()),
        ))
    }

    /// Run one tick on `frame`.
    pub fn process(&mut self, frame: Frame) -> TickOutput {
        let started = Instant::now();
        let motion = self.motion.detect(&frame);
        let detections = self.detector.predict(Some(&frame));

        let mut frame = frame;
        let annotations = self
            .compositor
            .render(Some(&mut frame), &detections, Some(&motion.mask));
        if motion.found {
            draw_motion_boxes(&mut frame, &motion.boxes, MOTION_BOX_COLOR);
        }

        log::debug!(
            "tick: {} motion boxes, {} detections ({} moving) in {:?}",
            motion.boxes.len(),
            detections.len(),
            annotations.iter().filter(|a| a.moving).count(),
            started.elapsed()
        );
        TickOutput {
            frame,
            detections,
            annotations,
            motion_found: motion.found,
            motion_boxes: motion.boxes,
        }
    }

    /// Drive the loop until the source ends, a quit is requested, `shutdown`
    /// is raised or `max_frames` ticks have run. The source is always released.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        display: &mut dyn DisplaySink,
        shutdown: &AtomicBool,
        max_frames: Option<u64>,
    ) -> RunSummary {
        let mut summary = RunSummary {
            frames: 0,
            motion_frames: 0,
            detections: 0,
            snapshots: Vec::new(),
            stop: StopReason::EndOfStream,
        };

        let stop = loop {
            if shutdown.load(Ordering::SeqCst) {
                break StopReason::Shutdown;
            }
            if max_frames.is_some_and(|max| summary.frames >= max) {
                break StopReason::FrameLimit;
            }

            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(err) => {
                    log::warn!("capture failed: {:#}", err);
                    break StopReason::CaptureFailed(format!("{:#}", err));
                }
            };

            let tick = self.process(frame);
            summary.frames += 1;
            summary.detections += tick.detections.len() as u64;
            if tick.motion_found {
                summary.motion_frames += 1;
            }

            if let Err(err) = display.present(&tick.frame) {
                log::warn!("display failed: {:#}", err);
            }

            match display.poll_key() {
                Some(Key::Quit) => break StopReason::Quit,
                Some(Key::Snapshot) => match self.snapshots.save(&tick.frame) {
                    Ok(path) => summary.snapshots.push(path),
                    Err(err) => log::warn!("snapshot failed: {:#}", err),
                },
                None => {}
            }
        };
        summary.stop = stop;

        source.release();
        log::info!(
            "run finished ({:?}): {} frames, {} with motion, {} detections, {} snapshots",
            summary.stop,
            summary.frames,
            summary.motion_frames,
            summary.detections,
            summary.snapshots.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{InferenceParams, RawDetection, StubBackend};
    use crate::ingest::{Scene, SyntheticSource};
    use crate::motion::MotionParams;
    use crate::render::RenderStyle;
    use std::collections::VecDeque;

    struct ScriptedDisplay {
        keys: VecDeque<Option<Key>>,
        presented: Vec<Frame>,
    }

    impl ScriptedDisplay {
        fn new(keys: Vec<Option<Key>>) -> Self {
            Self {
                keys: keys.into(),
                presented: Vec::new(),
            }
        }
    }

    impl DisplaySink for ScriptedDisplay {
        fn present(&mut self, frame: &Frame) -> Result<()> {
            self.presented.push(frame.clone());
            Ok(())
        }

        fn poll_key(&mut self) -> Option<Key> {
            self.keys.pop_front().flatten()
        }
    }

    fn pipeline(dir: PathBuf, results: Vec<RawDetection>) -> Pipeline {
        let params = MotionParams {
            area_threshold: 50.0,
            ..MotionParams::default()
        };
        Pipeline::new(
            MotionDetector::new(params),
            ObjectDetector::new(
                Box::new(StubBackend::with_results(results)),
                InferenceParams::default(),
            ),
            Compositor::new(RenderStyle::default()),
            SnapshotWriter::new(dir),
        )
    }

    #[test]
    fn quit_key_stops_the_loop() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pipeline = pipeline(tmp.path().to_path_buf(), Vec::new());
        let mut source = SyntheticSource::new(Scene::Static, 32, 32)?;
        let mut display = ScriptedDisplay::new(vec![None, None, Some(Key::Quit)]);
        let summary = pipeline.run(&mut source, &mut display, &AtomicBool::new(false), None);
        assert_eq!(summary.stop, StopReason::Quit);
        assert_eq!(summary.frames, 3);
        assert_eq!(display.presented.len(), 3);
        Ok(())
    }

    #[test]
    fn shutdown_flag_wins_before_capture() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pipeline = pipeline(tmp.path().to_path_buf(), Vec::new());
        let mut source = SyntheticSource::new(Scene::Static, 8, 8)?;
        let mut display = ScriptedDisplay::new(Vec::new());
        let summary = pipeline.run(&mut source, &mut display, &AtomicBool::new(true), None);
        assert_eq!(summary.stop, StopReason::Shutdown);
        assert_eq!(summary.frames, 0);
        assert_eq!(source.frames_produced(), 0);
        Ok(())
    }

    #[test]
    fn snapshot_key_saves_annotated_frame() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let person = RawDetection {
            xyxy: [4.0, 10.0, 20.0, 28.0],
            confidence: 0.9,
            class_id: 0,
        };
        let mut pipeline = pipeline(tmp.path().to_path_buf(), vec![person]);
        let mut source = SyntheticSource::new(Scene::Static, 32, 32)?.with_limit(2);
        let mut display = ScriptedDisplay::new(vec![None, Some(Key::Snapshot)]);
        let summary = pipeline.run(&mut source, &mut display, &AtomicBool::new(false), None);

        assert_eq!(summary.stop, StopReason::EndOfStream);
        assert_eq!(summary.detections, 2);
        assert_eq!(summary.snapshots.len(), 1);
        let saved = crate::snapshot::load(&summary.snapshots[0])?;
        assert_eq!(&saved, &display.presented[1]);
        Ok(())
    }

    #[test]
    fn corrupt_image_ends_run_as_capture_failure() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let frames = tmp.path().join("frames");
        std::fs::create_dir(&frames)?;
        std::fs::write(frames.join("a.png"), b"not a png")?;
        let mut pipeline = pipeline(tmp.path().join("shots"), Vec::new());
        let mut source = crate::ingest::DirectorySource::open(&frames)?;
        let mut display = ScriptedDisplay::new(Vec::new());
        let summary = pipeline.run(&mut source, &mut display, &AtomicBool::new(false), None);
        assert!(matches!(summary.stop, StopReason::CaptureFailed(_)));
        assert_eq!(summary.frames, 0);
        assert!(display.presented.is_empty());
        Ok(())
    }

    #[test]
    fn failed_snapshot_does_not_stop_the_run() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let blocker = tmp.path().join("not_a_dir");
        std::fs::write(&blocker, b"")?;
        let mut pipeline = pipeline(blocker, Vec::new());
        let mut source = SyntheticSource::new(Scene::Static, 16, 16)?.with_limit(2);
        let mut display = ScriptedDisplay::new(vec![Some(Key::Snapshot), None]);
        let summary = pipeline.run(&mut source, &mut display, &AtomicBool::new(false), None);
        assert_eq!(summary.stop, StopReason::EndOfStream);
        assert_eq!(summary.frames, 2);
        assert!(summary.snapshots.is_empty());
        Ok(())
    }

    #[test]
    fn moving_square_is_flagged_after_warmup() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pipeline = pipeline(tmp.path().to_path_buf(), Vec::new());
        let mut source = SyntheticSource::new(Scene::Static, 80, 60)?;
        for _ in 0..5 {
            let frame = source.read()?.context("frame")?;
            pipeline.process(frame);
        }
        let mut moving = SyntheticSource::new(Scene::Moving, 80, 60)?;
        let tick = pipeline.process(moving.read()?.context("frame")?);
        assert!(tick.motion_found);
        assert!(!tick.motion_boxes.is_empty());
        Ok(())
    }
}
