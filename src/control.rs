//! Display sink and keyboard commands.
//!
//! The loop presents one frame per tick and polls for at most one key.
//! `ConsoleDisplay` reads commands from stdin on a helper thread (`q` quits,
//! `s` saves a snapshot) and can mirror every presented frame to a preview PNG.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, Result};
use image::ImageFormat;

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Quit,
    Snapshot,
}

impl Key {
    /// `q` / `s`, case-insensitive, surrounding whitespace ignored.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "q" | "quit" => Some(Self::Quit),
            "s" | "snapshot" => Some(Self::Snapshot),
            _ => None,
        }
    }
}

/// Where annotated frames go.
pub trait DisplaySink {
    fn present(&mut self, frame: &Frame) -> Result<()>;

    /// At most one pending key per call.
    fn poll_key(&mut self) -> Option<Key>;
}

pub struct ConsoleDisplay {
    preview_path: Option<PathBuf>,
    keys: Option<Receiver<Key>>,
    presented: u64,
}

impl ConsoleDisplay {
    /// Display without keyboard input.
    pub fn new(preview_path: Option<PathBuf>) -> Self {
        Self {
            preview_path,
            keys: None,
            presented: 0,
        }
    }

    /// Display that reads commands from stdin on a background thread.
    pub fn with_stdin(preview_path: Option<PathBuf>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin-keys".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    match Key::parse(&line) {
                        Some(key) => {
                            if tx.send(key).is_err() {
                                break;
                            }
                        }
                        None if line.trim().is_empty() => {}
                        None => log::warn!("unknown command '{}' (q = quit, s = snapshot)", line.trim()),
                    }
                }
            })
            .context("spawn stdin reader")?;
        Ok(Self {
            preview_path,
            keys: Some(rx),
            presented: 0,
        })
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }
}

impl DisplaySink for ConsoleDisplay {
    fn present(&mut self, frame: &Frame) -> Result<()> {
        self.presented += 1;
        if let Some(path) = &self.preview_path {
            frame
                .to_rgb_image()
                .save_with_format(path, ImageFormat::Png)
                .with_context(|| format!("failed to write preview {}", path.display()))?;
        }
        Ok(())
    }

    fn poll_key(&mut self) -> Option<Key> {
        let rx = self.keys.as_ref()?;
        match rx.try_recv() {
            Ok(key) => Some(key),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                // stdin closed; keep running until another quit signal.
                self.keys = None;
                None
            }
        }
    }
}
