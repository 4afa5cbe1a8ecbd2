//! Frame and mask containers.
//!
//! - `Frame`: owned BGR pixel grid, the unit of work for every component.
//! - `MotionMask`: single-channel foreground grid produced by the motion detector.
//! - `BoundingBox`: inclusive pixel box shared by detections and motion blobs.
//!
//! A `Frame` can only be built through `Frame::new`, which checks that the buffer
//! length matches `width * height * 3`. Components downstream never see a
//! malformed frame.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};

/// Number of interleaved channels in a `Frame`.
pub const CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame: BGR pixel grid
// ----------------------------------------------------------------------------

/// Dense `height x width x 3` grid of 8-bit samples in BGR order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Wrap a BGR buffer. Fails when a dimension is zero or the length is wrong.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, CHANNELS)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} BGR bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Frame filled with a single BGR colour.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Result<Self> {
        let pixels = expected_len(width, height, 1)?;
        let mut data = Vec::with_capacity(pixels * CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self::new(width, height, data)
    }

    /// Build a BGR frame from an RGB image (channel order swapped).
    pub fn from_rgb_image(image: &RgbImage) -> Result<Self> {
        let mut data = image.as_raw().clone();
        swap_red_blue(&mut data);
        Self::new(image.width(), image.height(), data)
    }

    /// Build a BGR frame from a packed RGB buffer.
    pub fn from_rgb(width: u32, height: u32, mut rgb: Vec<u8>) -> Result<Self> {
        swap_red_blue(&mut rgb);
        Self::new(width, height, rgb)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw BGR bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// BGR sample at `(x, y)`. Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = self.index(x, y);
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        let idx = self.index(x, y);
        self.data[idx..idx + CHANNELS].copy_from_slice(&bgr);
    }

    /// Copy into an RGB image. The frame itself is left untouched.
    pub fn to_rgb_image(&self) -> RgbImage {
        let mut rgb = self.data.clone();
        swap_red_blue(&mut rgb);
        // Length was validated in `new`, so the buffer always fits.
        RgbImage::from_raw(self.width, self.height, rgb)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    fn index(&self, x: u32, y: u32) -> usize {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }
}

// ----------------------------------------------------------------------------
// MotionMask: per-pixel foreground levels
// ----------------------------------------------------------------------------

/// Mask level for background pixels.
pub const MASK_BACKGROUND: u8 = 0;
/// Mask level for pixels classified as shadow.
pub const MASK_SHADOW: u8 = 127;
/// Mask level for foreground pixels.
pub const MASK_FOREGROUND: u8 = 255;

/// Single-channel 8-bit grid with the same dimensions as its source frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MotionMask {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl MotionMask {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, 1)?;
        if data.len() != expected {
            return Err(anyhow!(
                "mask length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Caller guarantees `data.len() == width * height` with non-zero dimensions.
    pub(crate) fn from_raw_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self {
            data,
            width,
            height,
        }
    }

    /// All-background mask.
    pub fn empty(width: u32, height: u32) -> Result<Self> {
        Self::new(width, height, vec![MASK_BACKGROUND; expected_len(width, height, 1)?])
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let idx = y as usize * self.width as usize + x as usize;
        self.data[idx] = value;
    }

    /// Set every pixel of an inclusive box to `value`.
    pub fn fill_box(&mut self, bbox: BoundingBox, value: u8) {
        let bbox = bbox.clamped(self.width, self.height);
        for y in bbox.y1..=bbox.y2 {
            for x in bbox.x1..=bbox.x2 {
                self.set(x, y, value);
            }
        }
    }

    /// Mean mask value over an inclusive box, clamped to the mask first.
    pub fn mean_in(&self, bbox: BoundingBox) -> f64 {
        let bbox = bbox.clamped(self.width, self.height);
        let mut sum: u64 = 0;
        for y in bbox.y1..=bbox.y2 {
            let row = y as usize * self.width as usize;
            let start = row + bbox.x1 as usize;
            let end = row + bbox.x2 as usize;
            sum += self.data[start..=end].iter().map(|&v| v as u64).sum::<u64>();
        }
        sum as f64 / bbox.area() as f64
    }

    /// Number of non-background pixels.
    pub fn count_nonzero(&self) -> usize {
        self.data.iter().filter(|&&v| v != MASK_BACKGROUND).count()
    }

    /// Hand the mask to `imageproc` as a grey image of the same size.
    pub fn into_gray_image(self) -> GrayImage {
        let (width, height) = (self.width, self.height);
        // Length was validated on construction, so the buffer always fits.
        GrayImage::from_raw(width, height, self.data)
            .unwrap_or_else(|| GrayImage::new(width, height))
    }

    /// Take back a grey image produced from a mask.
    pub fn from_gray_image(image: GrayImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Inclusive pixel box `(x1, y1)..=(x2, y2)` with `x1 <= x2` and `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    /// Build a box, ordering the corners so the invariant always holds.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Clamp every corner into `[0, width-1] x [0, height-1]`.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        let max_x = width.saturating_sub(1);
        let max_y = height.saturating_sub(1);
        Self::new(
            self.x1.min(max_x),
            self.y1.min(max_y),
            self.x2.min(max_x),
            self.y2.min(max_y),
        )
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1 + 1
    }

    /// Pixel count covered by the box.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x2 < width && self.y2 < height
    }
}

fn expected_len(width: u32, height: u32, channels: usize) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(anyhow!("frame dimensions must be non-zero ({}x{})", width, height));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(channels))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(CHANNELS) {
        px.swap(0, 2);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
