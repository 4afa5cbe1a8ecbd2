use anyhow::{anyhow, Result};

use crate::frame::Frame;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Bgr24,
    Nv12,
    Yuyv,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"BGR3" => Some(Self::Bgr24),
            b"NV12" => Some(Self::Nv12),
            b"YUYV" => Some(Self::Yuyv),
            _ => None,
        }
    }
}

/// Convert a captured buffer into a BGR frame.
pub(crate) fn to_frame(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Frame> {
    match format {
        PixelFormat::Rgb24 => {
            check_len("RGB", pixels, packed_len(width, height, 3)?)?;
            Frame::from_rgb(width, height, pixels.to_vec())
        }
        PixelFormat::Bgr24 => {
            check_len("BGR", pixels, packed_len(width, height, 3)?)?;
            Frame::new(width, height, pixels.to_vec())
        }
        PixelFormat::Nv12 => nv12_to_bgr(pixels, width, height),
        PixelFormat::Yuyv => yuyv_to_bgr(pixels, width, height),
    }
}

fn packed_len(width: u32, height: u32, bytes_per_pixel: usize) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(bytes_per_pixel))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn check_len(kind: &str, pixels: &[u8], expected: usize) -> Result<()> {
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            kind,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn nv12_to_bgr(pixels: &[u8], width: u32, height: u32) -> Result<Frame> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = packed_len(width, height, 1)?;
    check_len("NV12", pixels, y_plane + y_plane / 2)?;

    let mut bgr = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let px = yuv_to_bgr(pixels[j * w + i], pixels[uv_index], pixels[uv_index + 1]);
            let offset = (j * w + i) * 3;
            bgr[offset..offset + 3].copy_from_slice(&px);
        }
    }
    Frame::new(width, height, bgr)
}

/// Packed 4:2:2, `Y0 U Y1 V` per pixel pair.
fn yuyv_to_bgr(pixels: &[u8], width: u32, height: u32) -> Result<Frame> {
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    check_len("YUYV", pixels, packed_len(width, height, 2)?)?;

    let mut bgr = Vec::with_capacity(packed_len(width, height, 3)?);
    for quad in pixels.chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        bgr.extend_from_slice(&yuv_to_bgr(y0, u, v));
        bgr.extend_from_slice(&yuv_to_bgr(y1, u, v));
    }
    Frame::new(width, height, bgr)
}

fn yuv_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;

    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(b), clamp_to_u8(g), clamp_to_u8(r)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_neutral_chroma_is_gray() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let frame = to_frame(&nv12, 2, 2, PixelFormat::Nv12)?;
        assert_eq!(frame.as_bytes(), &[128u8; 12][..]);
        Ok(())
    }

    #[test]
    fn rgb_input_is_swapped_to_bgr() -> Result<()> {
        let frame = to_frame(&[10, 20, 30], 1, 1, PixelFormat::Rgb24)?;
        assert_eq!(frame.pixel(0, 0), [30, 20, 10]);
        assert!(to_frame(&[1, 2], 1, 1, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn yuyv_pairs_share_chroma() -> Result<()> {
        let frame = to_frame(&[50, 128, 200, 128], 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(frame.pixel(0, 0), [50, 50, 50]);
        assert_eq!(frame.pixel(1, 0), [200, 200, 200]);
        Ok(())
    }

    #[test]
    fn fourcc_lookup() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), None);
    }
}
