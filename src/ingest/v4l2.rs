//! V4L2 frame source.
//!
//! `V4l2Source` captures from a local device node (e.g. `/dev/video0`) through
//! a memory-mapped stream, asks for RGB24 and falls back to whatever format
//! the driver keeps, as long as it is one `normalize` can convert to BGR.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{to_frame, PixelFormat};
use super::{CaptureConfig, FrameSource};
use crate::frame::Frame;

pub struct V4l2Source {
    config: CaptureConfig,
    state: Option<DeviceState>,
    format: PixelFormat,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
        }
    }

    /// Open the device, negotiate the format and start streaming.
    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.source)
            .with_context(|| format!("open v4l2 device {}", self.config.source))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.source,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} uses unsupported pixel format {}",
                self.config.source,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.source,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.config.source,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }
}

impl FrameSource for V4l2Source {
    fn describe(&self) -> String {
        format!(
            "v4l2:{} ({}x{})",
            self.config.source, self.active_width, self.active_height
        )
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let frame = state.with_mut(|fields| {
            fields
                .stream
                .next()
                .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
                .and_then(|(buf, meta)| {
                    let used = (meta.bytesused as usize).min(buf.len());
                    let used = if used == 0 { buf.len() } else { used };
                    to_frame(&buf[..used], width, height, format)
                })
        })?;

        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Source: released {} after {} frames",
                self.config.source,
                self.frame_count
            );
        }
    }
}
