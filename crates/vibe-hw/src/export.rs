//! Result cards: the captured still with the verdict printed underneath,
//! saved as a PNG.

use image::{imageops, ImageFormat, Rgb, RgbImage};
use std::path::Path;
use thiserror::Error;

/// White margin around the photo and the caption.
const PADDING: u32 = 20;
/// Pixel size of one font cell.
const SCALE: u32 = 3;
const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
/// Horizontal advance per character, including the gap.
const ADVANCE: u32 = (GLYPH_W + 1) * SCALE;
const LINE_HEIGHT: u32 = 30;
/// Height of the rarity-colored stripe between photo and caption.
const STRIPE: u32 = 8;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("could not decode capture: {0}")]
    Decode(String),
    #[error("could not write {path}: {reason}")]
    Write { path: String, reason: String },
}

/// Compose the card: padded photo, a stripe in `accent`, then the caption
/// wrapped to the photo width.
pub fn compose_card(jpeg: &[u8], caption: &str, accent: Rgb<u8>) -> Result<RgbImage, ExportError> {
    let photo = image::load_from_memory(jpeg)
        .map_err(|e| ExportError::Decode(e.to_string()))?
        .to_rgb8();

    let columns = (photo.width() / ADVANCE).max(1) as usize;
    let lines = wrap(caption, columns);
    let text_height = lines.len() as u32 * LINE_HEIGHT + PADDING;

    let width = photo.width() + PADDING * 2;
    let height = photo.height() + STRIPE + text_height + PADDING * 2;
    let mut card = RgbImage::from_pixel(width, height, PAPER);
    imageops::replace(&mut card, &photo, PADDING as i64, PADDING as i64);

    let stripe_top = PADDING + photo.height();
    for y in stripe_top..stripe_top + STRIPE {
        for x in PADDING..PADDING + photo.width() {
            card.put_pixel(x, y, accent);
        }
    }

    let mut y = stripe_top + STRIPE + PADDING;
    for line in &lines {
        draw_line(&mut card, line, PADDING, y + (LINE_HEIGHT - GLYPH_H * SCALE) / 2);
        y += LINE_HEIGHT;
    }
    tracing::debug!(width, height, lines = lines.len(), "result card composed");
    Ok(card)
}

/// Compose and write the card as PNG.
pub fn save_card(path: &Path, jpeg: &[u8], caption: &str, accent: Rgb<u8>) -> Result<(), ExportError> {
    let card = compose_card(jpeg, caption, accent)?;
    card.save_with_format(path, ImageFormat::Png)
        .map_err(|e| ExportError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    tracing::info!(path = %path.display(), "result card saved");
    Ok(())
}

/// Parse a `#RRGGBB` display color. Anything else is black.
pub fn parse_hex_color(hex: &str) -> Rgb<u8> {
    let digits = hex.trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return INK;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0);
    Rgb([channel(0), channel(2), channel(4)])
}

/// Greedy word wrap to `columns` characters; overlong words are split.
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > columns {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                lines.push(word.drain(..columns).collect());
            }
            let needed = if line.is_empty() { word.len() } else { line.chars().count() + 1 + word.len() };
            if needed > columns && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.extend(word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn draw_line(card: &mut RgbImage, line: &str, left: u32, top: u32) {
    let mut x = left;
    for c in line.chars() {
        if let Some(rows) = glyph(c) {
            draw_glyph(card, &rows, x, top);
        }
        x += ADVANCE;
    }
}

fn draw_glyph(card: &mut RgbImage, rows: &[u8; 7], left: u32, top: u32) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_W {
            if bits & (0x10 >> col) == 0 {
                continue;
            }
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    let (px, py) = (left + col * SCALE + dx, top + row as u32 * SCALE + dy);
                    if px < card.width() && py < card.height() {
                        card.put_pixel(px, py, INK);
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap for printable ASCII; lowercase renders as uppercase. Other
/// characters leave a blank cell.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
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
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '?' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
        '\'' => [0x04, 0x04, 0x08, 0x00, 0x00, 0x00, 0x00],
        '"' => [0x0A, 0x0A, 0x00, 0x00, 0x00, 0x00, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ';' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x04, 0x08],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let photo = RgbImage::from_pixel(width, height, Rgb([40, 160, 90]));
        let mut data = Vec::new();
        JpegEncoder::new(&mut data).encode_image(&photo).unwrap();
        data
    }

    fn dark_pixels(card: &RgbImage, top: u32) -> usize {
        card.enumerate_pixels()
            .filter(|(_, y, p)| *y >= top && p.0.iter().all(|&c| c < 64))
            .count()
    }

    #[test]
    fn test_card_layout() {
        let card = compose_card(&jpeg(200, 80), "You glow", Rgb([245, 158, 11])).unwrap();
        assert_eq!(card.width(), 200 + 2 * PADDING);
        assert_eq!(card.height(), 80 + STRIPE + LINE_HEIGHT + PADDING + 2 * PADDING);
        assert_eq!(*card.get_pixel(0, 0), PAPER);
        assert_eq!(*card.get_pixel(PADDING + 5, PADDING + 80 + 1), Rgb([245, 158, 11]));
        // The caption put ink below the stripe.
        assert!(dark_pixels(&card, PADDING + 80 + STRIPE) > 0);
    }

    #[test]
    fn test_long_caption_wraps_to_photo_width() {
        let caption = "an aura so bright the whole room noticed it";
        let card = compose_card(&jpeg(120, 40), caption, INK).unwrap();
        let columns = (120 / ADVANCE) as usize;
        let lines = wrap(caption, columns);
        assert!(lines.len() > 1);
        assert!(lines.iter().all(|l| l.chars().count() <= columns));
        assert_eq!(card.height(), 40 + STRIPE + lines.len() as u32 * LINE_HEIGHT + 3 * PADDING);
    }

    #[test]
    fn test_wrap_splits_overlong_words() {
        assert_eq!(wrap("abcdefgh ij", 3), vec!["abc", "def", "gh", "ij"]);
        assert_eq!(wrap("one two", 7), vec!["one two"]);
        assert_eq!(wrap("", 4), vec![String::new()]);
    }

    #[test]
    fn test_saved_card_is_png() {
        let path = std::env::temp_dir().join(format!("vibe-card-{}.png", uuid::Uuid::new_v4()));
        save_card(&path, &jpeg(64, 48), "Main character energy.", Rgb([139, 92, 246])).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let card = image::load_from_memory(&bytes).unwrap();
        assert_eq!(card.width(), 64 + 2 * PADDING);
    }

    #[test]
    fn test_bad_capture_is_decode_error() {
        let err = compose_card(&[1, 2, 3], "x", INK).unwrap_err();
        assert!(matches!(err, ExportError::Decode(_)));
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#F59E0B"), Rgb([245, 158, 11]));
        assert_eq!(parse_hex_color("a0a0a0"), Rgb([160, 160, 160]));
        assert_eq!(parse_hex_color("#fff"), INK);
    }
}
