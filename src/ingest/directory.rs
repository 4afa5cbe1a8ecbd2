//! Still-image directory source.
//!
//! Plays back every PNG, JPEG and BMP file in a directory in file-name order,
//! one per tick, then reports end of stream.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::FrameSource;
use crate::frame::Frame;
use crate::snapshot;

const EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)
            .with_context(|| format!("failed to list image directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::debug!("image directory {}: {} files", dir.display(), files.len());
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn describe(&self) -> String {
        format!("dir:{} ({} images)", self.dir.display(), self.files.len())
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;
        snapshot::load(path).map(Some)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotWriter;
    use chrono::{TimeZone, Utc};

    #[test]
    fn plays_images_in_name_order_then_ends() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let writer = SnapshotWriter::new(tmp.path());
        let first = Frame::filled(4, 4, [1, 1, 1])?;
        let second = Frame::filled(4, 4, [2, 2, 2])?;
        let at = |s| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, s).single();
        writer.save_at(&second, &at(2).context("timestamp")?)?;
        writer.save_at(&first, &at(1).context("timestamp")?)?;
        fs::write(tmp.path().join("notes.txt"), "ignored")?;

        let mut source = DirectorySource::open(tmp.path())?;
        assert_eq!(source.len(), 2);
        assert_eq!(source.read()?, Some(first));
        assert_eq!(source.read()?, Some(second));
        assert_eq!(source.read()?, None);
        Ok(())
    }

    #[test]
    fn missing_directory_fails() {
        assert!(DirectorySource::open(Path::new("/nonexistent/frames")).is_err());
    }
}
