//! # Bitmap Text
//!
//! Renders text into raster rows with the Spleen 12×24 bitmap font, for
//! printing text as an image instead of through the device's ASCII mode
//! (which has a single fixed font).

use spleen_font::{FONT_12X24, PSF2Font};

use crate::error::{PeripageError, Result};
use crate::render::dither::pack_row;

/// Glyph cell width in dots.
pub const GLYPH_WIDTH: usize = 12;

/// Glyph cell height in dots.
pub const GLYPH_HEIGHT: usize = 24;

/// Drawn for characters the font does not cover.
const REPLACEMENT: char = '?';

/// Characters that fit on a row of `width_pixels` dots.
pub fn columns(width_pixels: usize) -> usize {
    (width_pixels / GLYPH_WIDTH).max(1)
}

/// Render one line of text as [`GLYPH_HEIGHT`] rows of `row_bytes` bytes.
/// Text past the row width is cut; callers wrap beforehand.
pub fn render_line(line: &str, row_bytes: usize) -> Result<Vec<Vec<u8>>> {
    let mut font = PSF2Font::new(FONT_12X24)
        .map_err(|_| PeripageError::Image("Failed to load Spleen 12x24 font".to_string()))?;

    let width = row_bytes * 8;
    let mut canvas = vec![vec![false; width]; GLYPH_HEIGHT];

    for (col, ch) in line.chars().enumerate() {
        let x0 = col * GLYPH_WIDTH;
        if x0 + GLYPH_WIDTH > width {
            break;
        }
        if ch == ' ' {
            continue;
        }

        let mut utf8 = [0u8; 4];
        let ch = if font.glyph_for_utf8(ch.encode_utf8(&mut utf8).as_bytes()).is_some() {
            ch
        } else {
            REPLACEMENT
        };

        let mut utf8 = [0u8; 4];
        let Some(glyph) = font.glyph_for_utf8(ch.encode_utf8(&mut utf8).as_bytes()) else {
            continue;
        };
        for (row_y, row) in glyph.enumerate().take(GLYPH_HEIGHT) {
            for (col_x, on) in row.enumerate().take(GLYPH_WIDTH) {
                if on {
                    canvas[row_y][x0 + col_x] = true;
                }
            }
        }
    }

    Ok(canvas.iter().map(|pixels| pack_row(pixels)).collect())
}

/// Hard-wrap `text` into lines of at most `columns` characters. Newlines
/// start a new line; an empty input line stays an empty line.
pub fn wrap_text(text: &str, columns: usize) -> Vec<String> {
    let columns = columns.max(1);
    let mut lines = Vec::new();

    for source in text.split('\n') {
        let chars: Vec<char> = source.chars().filter(|c| !c.is_control()).collect();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        for piece in chars.chunks(columns) {
            lines.push(piece.iter().collect());
        }
    }

    lines
}

// ============================================================================
// TESTS
// ============================================================================
