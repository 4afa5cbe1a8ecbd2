//! Frame capture sources.
//!
//! This module provides different sources for BGR frames:
//! - Synthetic scenes (`stub://static`, `stub://moving`) for tests and demos
//! - A directory of still images, played back in file-name order
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source hands out validated `Frame`s through `FrameSource::read`.
//! `Ok(None)` means the stream ended; errors end the loop as well.

mod directory;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use std::path::Path;

use anyhow::Result;

pub use directory::DirectorySource;
pub use synthetic::{Scene, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use crate::frame::Frame;

/// Prefix for synthetic sources.
pub const STUB_SCHEME: &str = "stub://";

/// Anything that produces one frame per tick.
pub trait FrameSource {
    /// Source identifier for logs.
    fn describe(&self) -> String;

    /// Next frame, or `None` once the stream has ended.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Called once on shutdown.
    fn release(&mut self) {}
}

/// Configuration for a capture source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConfig {
    /// `stub://static`, `stub://moving`, an image directory, or a device node.
    pub source: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: "stub://moving".to_string(),
            width: 640,
            height: 480,
            target_fps: 10,
        }
    }
}

/// Source selected from `CaptureConfig::source`.
pub struct CaptureSource {
    backend: CaptureBackend,
}

enum CaptureBackend {
    Synthetic(SyntheticSource),
    Directory(DirectorySource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Source),
}

impl CaptureSource {
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let backend = if let Some(rest) = config.source.strip_prefix(STUB_SCHEME) {
            CaptureBackend::Synthetic(SyntheticSource::from_spec(rest, config.width, config.height)?)
        } else if Path::new(&config.source).is_dir() {
            CaptureBackend::Directory(DirectorySource::open(Path::new(&config.source))?)
        } else {
            open_device(config)?
        };
        let source = Self { backend };
        log::info!("capture: opened {}", source.describe());
        Ok(source)
    }

    fn inner(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            CaptureBackend::Synthetic(source) => source,
            CaptureBackend::Directory(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            CaptureBackend::Device(source) => source,
        }
    }
}

impl FrameSource for CaptureSource {
    fn describe(&self) -> String {
        match &self.backend {
            CaptureBackend::Synthetic(source) => source.describe(),
            CaptureBackend::Directory(source) => source.describe(),
            #[cfg(feature = "ingest-v4l2")]
            CaptureBackend::Device(source) => source.describe(),
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        self.inner().read()
    }

    fn release(&mut self) {
        self.inner().release()
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(config: &CaptureConfig) -> Result<CaptureBackend> {
    let mut source = V4l2Source::new(config.clone());
    source.connect()?;
    Ok(CaptureBackend::Device(source))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(config: &CaptureConfig) -> Result<CaptureBackend> {
    Err(anyhow::anyhow!(
        "source {} is neither stub:// nor an image directory; device capture requires the ingest-v4l2 feature",
        config.source
    ))
}
