//! Built-in 5x7 bitmap font for overlay captions.
//!
//! Glyphs are uppercase only; lowercase input is drawn with the uppercase
//! shape. Unknown characters render as `?`.

use image::{Rgb, RgbImage};

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
/// Horizontal distance between glyph origins.
pub const ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Row bitmaps, top to bottom; bit 4 is the leftmost column.
type Glyph = [u8; GLYPH_HEIGHT as usize];

const UNKNOWN: Glyph = [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04];

fn glyph(ch: char) -> Glyph {
    match ch.to_ascii_uppercase() {
        ' ' => [0; 7],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ',' => [0x00, 0x00, 0x00, 0x00, 0x0C, 0x04, 0x08],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '%' => [0x18, 0x19, 0x02, 0x04, 0x08, 0x13, 0x03],
        _ => UNKNOWN,
    }
}

/// Pixel size of `text` as `(width, height)`.
pub fn text_size(text: &str) -> (u32, u32) {
    let n = text.chars().count() as u32;
    if n == 0 {
        return (0, GLYPH_HEIGHT);
    }
    (n * ADVANCE - 1, GLYPH_HEIGHT)
}

/// Draw `text` with its top-left corner at `(x, y)`, clipped to the image.
pub fn draw_text(image: &mut RgbImage, x: i64, y: i64, text: &str, color: [u8; 3]) {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let mut origin_x = x;
    for ch in text.chars() {
        if origin_x >= width {
            break;
        }
        let rows = glyph(ch);
        for (row, bits) in rows.iter().enumerate() {
            let py = y + row as i64;
            if py < 0 || py >= height {
                continue;
            }
            for col in 0..GLYPH_WIDTH as i64 {
                let px = origin_x + col;
                if px < 0 || px >= width {
                    continue;
                }
                if (bits >> (GLYPH_WIDTH as i64 - 1 - col)) & 1 == 1 {
                    image.put_pixel(px as u32, py as u32, Rgb(color));
                }
            }
        }
        origin_x += ADVANCE as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_size_counts_advance() {
        assert_eq!(text_size(""), (0, 7));
        assert_eq!(text_size("a"), (5, 7));
        assert_eq!(text_size("car 0.91"), (47, 7));
    }

    #[test]
    fn lowercase_shares_uppercase_glyph() {
        assert_eq!(glyph('p'), glyph('P'));
        assert_eq!(glyph('~'), UNKNOWN);
    }

    #[test]
    fn draw_text_clips_at_edges() {
        let mut image = RgbImage::new(8, 4);
        draw_text(&mut image, -2, -3, "11", [255, 255, 255]);
        let lit = image.pixels().filter(|p| p.0 == [255, 255, 255]).count();
        assert!(lit > 0);
    }

    #[test]
    fn space_draws_nothing() {
        let mut image = RgbImage::new(6, 7);
        draw_text(&mut image, 0, 0, " ", [255, 0, 0]);
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }
}
