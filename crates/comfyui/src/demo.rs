//! Placeholder images for demo mode.
//!
//! Demo mode lets the app run without a backend. The placeholder is a
//! diagonal gradient from a per-style colour to white, labelled "DEMO" and
//! with the style name in white block letters, encoded as PNG.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use miniyou_core::style::Style;

/// Edge length of the square placeholder.
pub const PLACEHOLDER_SIZE: u32 = 512;

/// Colour used for styles without a dedicated one.
const FALLBACK_COLOR: [u8; 3] = [0x6C, 0x5C, 0xE7];

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Glyphs are 5 columns by 7 rows, one bit per pixel, MSB leftmost.
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

const TITLE_SCALE: u32 = 8;
const TITLE_TOP: u32 = 160;
const LABEL_SCALE: u32 = 4;
const LABEL_TOP: u32 = 256;

fn base_color(style: Style) -> [u8; 3] {
    match style {
        Style::Pixel => [0x8B, 0x45, 0x13],
        Style::Cartoon => [0xFF, 0x6B, 0x6B],
        Style::Cute => [0xFF, 0xB6, 0xC1],
        Style::Sketch => [0xA0, 0xA0, 0xA0],
        _ => FALLBACK_COLOR,
    }
}

/// Render the placeholder for `style` as PNG bytes.
pub fn render_placeholder(style: Style) -> Result<Vec<u8>, image::ImageError> {
    let base = base_color(style);
    let span = (2 * (PLACEHOLDER_SIZE - 1)) as f32;

    let mut img = RgbImage::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
        let t = (x + y) as f32 / span;
        let mix = |c: u8| (f32::from(c) * (1.0 - t) + 255.0 * t).round() as u8;
        Rgb([mix(base[0]), mix(base[1]), mix(base[2])])
    });

    let center = PLACEHOLDER_SIZE / 2;
    draw_text(&mut img, "DEMO", center, TITLE_TOP, TITLE_SCALE);
    draw_text(
        &mut img,
        &format!("{} style", style.id()),
        center,
        LABEL_TOP,
        LABEL_SCALE,
    );

    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Draw `text` horizontally centred on `center_x`. Characters without a
/// glyph leave a gap.
fn draw_text(img: &mut RgbImage, text: &str, center_x: u32, top: u32, scale: u32) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    let width = (text.chars().count() as u32 * advance).saturating_sub(scale);
    let mut left = center_x.saturating_sub(width / 2);

    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row, bits) in (0..GLYPH_HEIGHT).zip(rows) {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    let (x, y) = (left + col * scale, top + row * scale);
                    for dy in 0..scale {
                        for dx in 0..scale {
                            if let Some(pixel) = img.get_pixel_mut_checked(x + dx, y + dy) {
                                *pixel = TEXT_COLOR;
                            }
                        }
                    }
                }
            }
        }
        left += advance;
    }
}

fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_a_decodable_png() {
        let bytes = render_placeholder(Style::Pixel).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.width(), PLACEHOLDER_SIZE);
        assert_eq!(decoded.height(), PLACEHOLDER_SIZE);

        let rgb = decoded.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [0x8B, 0x45, 0x13]);
        assert_eq!(
            rgb.get_pixel(PLACEHOLDER_SIZE - 1, PLACEHOLDER_SIZE - 1).0,
            [255, 255, 255]
        );
    }

    #[test]
    fn premium_styles_use_fallback_colour() {
        let bytes = render_placeholder(Style::Watercolor).unwrap();
        let rgb = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, FALLBACK_COLOR);
    }

    #[test]
    fn placeholder_is_labelled() {
        let rgb = image::load_from_memory(&render_placeholder(Style::Cartoon).unwrap())
            .unwrap()
            .to_rgb8();

        // The gradient alone never reaches white above the label rows.
        let white_in_title = (TITLE_TOP..TITLE_TOP + GLYPH_HEIGHT * TITLE_SCALE)
            .flat_map(|y| (0..PLACEHOLDER_SIZE).map(move |x| (x, y)))
            .filter(|&(x, y)| *rgb.get_pixel(x, y) == TEXT_COLOR)
            .count();
        assert!(white_in_title > 0);

        // Top-left corner of the "D" in "DEMO".
        let title_width = 4 * (GLYPH_WIDTH + 1) * TITLE_SCALE - TITLE_SCALE;
        let d_left = PLACEHOLDER_SIZE / 2 - title_width / 2;
        assert_eq!(*rgb.get_pixel(d_left, TITLE_TOP), TEXT_COLOR);
        assert_ne!(*rgb.get_pixel(d_left - 1, TITLE_TOP), TEXT_COLOR);
    }

    #[test]
    fn label_differs_per_style() {
        let label_rows = |style| {
            let rgb = image::load_from_memory(&render_placeholder(style).unwrap())
                .unwrap()
                .to_rgb8();
            (LABEL_TOP..LABEL_TOP + GLYPH_HEIGHT * LABEL_SCALE)
                .flat_map(|y| (0..PLACEHOLDER_SIZE).map(move |x| (x, y)))
                .map(|(x, y)| *rgb.get_pixel(x, y) == TEXT_COLOR)
                .collect::<Vec<_>>()
        };
        assert_ne!(label_rows(Style::Anime), label_rows(Style::Watercolor));
    }
}
