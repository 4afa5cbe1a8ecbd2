//! Snapshot persistence for annotated frames.
//!
//! Snapshots are lossless PNGs named `snapshot_<YYYYMMDD_HHMMSS>.png` in local
//! time. Two saves within the same second share a name; the later one wins.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use image::ImageFormat;

use crate::frame::Frame;

pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `frame` under the current local time.
    pub fn save(&self, frame: &Frame) -> Result<PathBuf> {
        self.save_at(frame, &Local::now())
    }

    /// Save `frame` under an explicit timestamp.
    pub fn save_at<Tz: TimeZone>(&self, frame: &Frame, at: &DateTime<Tz>) -> Result<PathBuf>
    where
        Tz::Offset: std::fmt::Display,
    {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create snapshot dir {}", self.dir.display()))?;
        let path = self.dir.join(snapshot_file_name(at));
        frame
            .to_rgb_image()
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        log::info!("snapshot saved to {}", path.display());
        Ok(path)
    }
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_DIR)
    }
}

/// `snapshot_<YYYYMMDD_HHMMSS>.png` for `at`.
pub fn snapshot_file_name<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("snapshot_{}.png", at.format("%Y%m%d_%H%M%S"))
}

/// Decode an image file back into a BGR frame.
pub fn load(path: &Path) -> Result<Frame> {
    let image = image::open(path)
        .with_context(|| format!("failed to decode image {}", path.display()))?
        .to_rgb8();
    Frame::from_rgb_image(&image)
}
