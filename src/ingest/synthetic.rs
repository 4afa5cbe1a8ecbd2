//! Synthetic scenes for `stub://` sources.
//!
//! `stub://static` repeats one background frame. `stub://moving` draws a
//! bright square that slides across the same background and bounces at the
//! edges. Either accepts `?frames=N` to end the stream after `N` frames.

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
use crate::frame::Frame;

const SQUARE_FRACTION: u32 = 5;
const STEP_PX: u32 = 8;
const SQUARE_BGR: [u8; 3] = [235, 235, 235];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scene {
    Static,
    Moving,
}

pub struct SyntheticSource {
    scene: Scene,
    background: Frame,
    frame_count: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(scene: Scene, width: u32, height: u32) -> Result<Self> {
        Ok(Self {
            scene,
            background: background(width, height)?,
            frame_count: 0,
            limit: None,
        })
    }

    /// Stop after `frames` frames.
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    /// Parse the part after `stub://`, e.g. `moving?frames=30`.
    pub fn from_spec(spec: &str, width: u32, height: u32) -> Result<Self> {
        let (name, query) = match spec.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (spec, None),
        };
        let scene = match name {
            "static" | "" => Scene::Static,
            "moving" => Scene::Moving,
            other => return Err(anyhow!("unknown synthetic scene '{}'", other)),
        };
        let mut source = Self::new(scene, width, height)?;
        if let Some(query) = query {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("frames", value)) => {
                        let frames = value
                            .parse()
                            .with_context(|| format!("invalid frame count '{}'", value))?;
                        source = source.with_limit(frames);
                    }
                    _ => return Err(anyhow!("unknown synthetic option '{}'", pair)),
                }
            }
        }
        Ok(source)
    }

    pub fn frames_produced(&self) -> u64 {
        self.frame_count
    }

    /// Top-left corner of the moving square for frame `index`.
    fn square_origin(&self, index: u64, side: u32) -> (u32, u32) {
        let travel = self.background.width().saturating_sub(side).max(1) as u64;
        let pos = (index * STEP_PX as u64) % (2 * travel);
        let x = if pos < travel { pos } else { 2 * travel - pos };
        let y = (self.background.height().saturating_sub(side)) / 2;
        (x as u32, y)
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        let scene = match self.scene {
            Scene::Static => "static",
            Scene::Moving => "moving",
        };
        format!(
            "stub://{} ({}x{})",
            scene,
            self.background.width(),
            self.background.height()
        )
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let index = self.frame_count;
        self.frame_count += 1;

        let mut frame = self.background.clone();
        if self.scene == Scene::Moving {
            let side = (frame.width().min(frame.height()) / SQUARE_FRACTION).max(1);
            let (x0, y0) = self.square_origin(index, side);
            for y in y0..(y0 + side).min(frame.height()) {
                for x in x0..(x0 + side).min(frame.width()) {
                    frame.set_pixel(x, y, SQUARE_BGR);
                }
            }
        }
        Ok(Some(frame))
    }
}

/// Smooth, dark colour ramp so the square always stands out.
fn background(width: u32, height: u32) -> Result<Frame> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height {
        for x in 0..width {
            let b = (x * 80 / width.max(1)) as u8;
            let g = (y * 80 / height.max(1)) as u8;
            data.extend_from_slice(&[b + 20, g + 20, 40]);
        }
    }
    Frame::new(width, height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_scene_repeats() -> Result<()> {
        let mut source = SyntheticSource::new(Scene::Static, 16, 8)?;
        let a = source.read()?;
        let b = source.read()?;
        assert!(a.is_some());
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn moving_scene_changes_between_frames() -> Result<()> {
        let mut source = SyntheticSource::new(Scene::Moving, 64, 48)?;
        let a = source.read()?;
        let b = source.read()?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn source_string_parses_frame_limit() -> Result<()> {
        let mut source = SyntheticSource::from_spec("moving?frames=2", 16, 16)?;
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_some());
        assert!(source.read()?.is_none());
        assert_eq!(source.frames_produced(), 2);
        Ok(())
    }

    #[test]
    fn source_string_rejects_unknown_scene() {
        assert!(SyntheticSource::from_spec("rain", 8, 8).is_err());
        assert!(SyntheticSource::from_spec("static?fps=3", 8, 8).is_err());
    }
}
