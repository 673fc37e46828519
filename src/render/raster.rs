//! # Raster Converter
//!
//! Turns pictures into rows the printer can burn: every row is exactly
//! `row_bytes` long, MSB = leftmost dot, 1 = ink.
//!
//! ## Sources
//!
//! | Input | Method | Scaling |
//! |-------|--------|---------|
//! | decoded image | [`RasterConverter::rows_from_image`] | resized to the raster width, aspect kept |
//! | 1-bit matrix (QR) | [`RasterConverter::rows_from_matrix`] | integer module scale, centered |
//! | text | [`RasterConverter::rows_from_text`] | Spleen 12×24, hard wrap |
//! | packed bytes | [`RasterConverter::rows_from_bytes`] | none, split at `row_bytes` |
//!
//! Image and matrix rows are produced lazily; nothing is cached, so
//! converting again means calling the method again.
//!
//! ## Example
//!
//! ```
//! use image::{DynamicImage, GrayImage, Luma};
//! use peripage::printer::ProfileId;
//! use peripage::render::RasterConverter;
//!
//! let converter = RasterConverter::new(ProfileId::A6);
//! let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(96, 48, Luma([0])));
//!
//! let rows: Vec<Vec<u8>> = converter.rows_from_image(&img).unwrap().collect();
//! assert_eq!(rows.len(), 192); // 96x48 scaled to 384 wide
//! assert!(rows.iter().all(|row| row.len() == 48));
//! ```

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgba};
use qrcode::QrCode;

use super::dither::{DitheringAlgorithm, RowDitherer, pack_row};
use super::glyph;
use crate::error::{PeripageError, Result};
use crate::printer::PrinterProfile;

/// A 1-bit matrix, `true` = ink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl BitMatrix {
    /// All-white matrix.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, on: bool) {
        if x < self.width && y < self.height {
            self.bits[y * self.width + x] = on;
        }
    }
}

/// Build the module matrix of a QR code for `text`, without a quiet zone.
pub fn qr_matrix(text: &str) -> Result<BitMatrix> {
    let code = QrCode::new(text.as_bytes())
        .map_err(|e| PeripageError::Image(format!("QR code generation failed: {}", e)))?;

    let size = code.width();
    let mut matrix = BitMatrix::new(size, size);
    for y in 0..size {
        for x in 0..size {
            matrix.set(x, y, code[(x, y)] == qrcode::Color::Dark);
        }
    }
    Ok(matrix)
}

/// # Raster Converter
///
/// Bound to one printer profile; holds no per-image state.
#[derive(Debug, Clone)]
pub struct RasterConverter {
    profile: PrinterProfile,
    algorithm: DitheringAlgorithm,
    filter: FilterType,
}

impl RasterConverter {
    pub fn new(profile: impl Into<PrinterProfile>) -> Self {
        Self {
            profile: profile.into(),
            algorithm: DitheringAlgorithm::default(),
            filter: FilterType::Lanczos3,
        }
    }

    pub fn with_dithering(mut self, algorithm: DitheringAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Resampling filter used when scaling images (Lanczos3 by default).
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    pub fn dithering(&self) -> DitheringAlgorithm {
        self.algorithm
    }

    /// Composite onto white, scale to the raster width and convert to gray.
    pub fn prepare(&self, image: &DynamicImage) -> Result<GrayImage> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(PeripageError::Image(format!(
                "Cannot print an empty {}x{} image",
                width, height
            )));
        }

        let flattened = flatten_alpha(image);

        let target_width = self.profile.raster_width_pixels as u32;
        let aspect_ratio = height as f64 / width as f64;
        let target_height = ((target_width as f64 * aspect_ratio).round() as u32).max(1);

        let resized = if width == target_width && height == target_height {
            flattened
        } else {
            flattened.resize_exact(target_width, target_height, self.filter)
        };

        Ok(resized.to_luma8())
    }

    /// Lazily dither `image` into printer rows.
    pub fn rows_from_image(&self, image: &DynamicImage) -> Result<ImageRows> {
        let gray = self.prepare(image)?;
        Ok(ImageRows {
            ditherer: RowDitherer::new(self.algorithm, gray.width() as usize),
            gray,
            y: 0,
            row_bytes: self.profile.row_bytes,
        })
    }

    /// Scale a 1-bit matrix by the largest whole factor that fits the raster
    /// width and center it.
    pub fn rows_from_matrix(&self, matrix: BitMatrix) -> Result<MatrixRows> {
        let width = self.profile.raster_width_pixels;
        if matrix.width() == 0 || matrix.height() == 0 {
            return Err(PeripageError::Image("Empty matrix".to_string()));
        }
        if matrix.width() > width {
            return Err(PeripageError::Image(format!(
                "Matrix is {} modules wide, printer has {} dots",
                matrix.width(),
                width
            )));
        }

        let scale = width / matrix.width();
        let offset = (width - matrix.width() * scale) / 2;
        Ok(MatrixRows {
            matrix,
            scale,
            offset,
            y: 0,
            row_bytes: self.profile.row_bytes,
            width,
        })
    }

    /// QR code for `text`, as printer rows.
    pub fn rows_from_qr(&self, text: &str) -> Result<MatrixRows> {
        self.rows_from_matrix(qr_matrix(text)?)
    }

    /// Render text with the bitmap font, hard-wrapped to the raster width.
    pub fn rows_from_text(&self, text: &str) -> Result<Vec<Vec<u8>>> {
        let columns = glyph::columns(self.profile.raster_width_pixels);
        let mut rows = Vec::new();
        for line in glyph::wrap_text(text, columns) {
            rows.extend(glyph::render_line(&line, self.profile.row_bytes)?);
        }
        Ok(rows)
    }

    /// Split an already packed raster into rows, zero-padding the last one.
    pub fn rows_from_bytes<'a>(&self, bytes: &'a [u8]) -> impl Iterator<Item = Vec<u8>> + 'a {
        let row_bytes = self.profile.row_bytes;
        bytes.chunks(row_bytes).map(move |chunk| {
            let mut row = chunk.to_vec();
            row.resize(row_bytes, 0);
            row
        })
    }
}

/// Alpha is composited over white paper.
fn flatten_alpha(image: &DynamicImage) -> DynamicImage {
    if !image.color().has_alpha() {
        return image.clone();
    }

    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        *pixel = Rgba([blend(r), blend(g), blend(b), 255]);
    }
    DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).to_rgb8())
}

/// Fit a packed row to exactly `row_bytes`.
fn fit_row(mut row: Vec<u8>, row_bytes: usize) -> Vec<u8> {
    row.resize(row_bytes, 0);
    row
}

/// Lazy dithered image rows, see [`RasterConverter::rows_from_image`].
pub struct ImageRows {
    gray: GrayImage,
    ditherer: RowDitherer,
    y: u32,
    row_bytes: usize,
}

impl Iterator for ImageRows {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.y >= self.gray.height() {
            return None;
        }
        let intensities: Vec<f32> = (0..self.gray.width())
            .map(|x| 1.0 - (self.gray.get_pixel(x, self.y)[0] as f32 / 255.0))
            .collect();
        self.y += 1;
        Some(fit_row(self.ditherer.dither_row(&intensities), self.row_bytes))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.gray.height().saturating_sub(self.y) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for ImageRows {}

/// Lazy scaled matrix rows, see [`RasterConverter::rows_from_matrix`].
pub struct MatrixRows {
    matrix: BitMatrix,
    scale: usize,
    offset: usize,
    y: usize,
    row_bytes: usize,
    width: usize,
}

impl Iterator for MatrixRows {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let my = self.y / self.scale;
        if my >= self.matrix.height() {
            return None;
        }
        let pixels: Vec<bool> = (0..self.width)
            .map(|x| {
                x >= self.offset && self.matrix.get((x - self.offset) / self.scale, my)
            })
            .collect();
        self.y += 1;
        Some(fit_row(pack_row(&pixels), self.row_bytes))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.matrix.height() * self.scale).saturating_sub(self.y);
        (left, Some(left))
    }
}

impl ExactSizeIterator for MatrixRows {}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::ProfileId;
    use image::{GrayImage, Luma, RgbaImage};

    fn gray(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    #[test]
    fn test_rows_have_profile_width() {
        for id in ProfileId::ALL {
            let converter = RasterConverter::new(id);
            let profile = *converter.profile();
            for row in converter.rows_from_image(&gray(50, 10, 128)).unwrap() {
                assert_eq!(row.len(), profile.row_bytes, "{}", profile.name);
            }
        }
    }

    #[test]
    fn test_aspect_ratio_kept() {
        let converter = RasterConverter::new(ProfileId::A6p);
        let rows = converter.rows_from_image(&gray(288, 100, 0)).unwrap();
        assert_eq!(rows.len(), 200);
    }

    #[test]
    fn test_black_and_white_images() {
        let converter = RasterConverter::new(ProfileId::A6);
        assert!(
            converter
                .rows_from_image(&gray(384, 4, 0))
                .unwrap()
                .all(|row| row.iter().all(|&b| b == 0xFF))
        );
        assert!(
            converter
                .rows_from_image(&gray(384, 4, 255))
                .unwrap()
                .all(|row| row.iter().all(|&b| b == 0x00))
        );
    }

    #[test]
    fn test_transparent_is_paper() {
        let converter = RasterConverter::new(ProfileId::A6);
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(384, 2, Rgba([0, 0, 0, 0])));
        assert!(
            converter
                .rows_from_image(&clear)
                .unwrap()
                .all(|row| row.iter().all(|&b| b == 0))
        );
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let converter = RasterConverter::new(ProfileId::A6);
        let img = gray(120, 40, 90);
        let a: Vec<_> = converter.rows_from_image(&img).unwrap().collect();
        let b: Vec<_> = converter.rows_from_image(&img).unwrap().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_image_rejected() {
        let converter = RasterConverter::new(ProfileId::A6);
        assert!(matches!(
            converter.rows_from_image(&gray(0, 0, 0)),
            Err(PeripageError::Image(_))
        ));
    }

    #[test]
    fn test_matrix_scaled_and_centered() {
        let converter = RasterConverter::new(ProfileId::A6);
        let mut matrix = BitMatrix::new(100, 2);
        matrix.set(0, 0, true);
        let rows: Vec<_> = converter.rows_from_matrix(matrix).unwrap().collect();
        // 384 / 100 = scale 3, offset (384 - 300) / 2 = 42
        assert_eq!(rows.len(), 6);
        let first = &rows[0];
        let lit: Vec<usize> = (0..384)
            .filter(|&x| first[x / 8] & (0x80 >> (x % 8)) != 0)
            .collect();
        assert_eq!(lit, vec![42, 43, 44]);
        assert!(rows[3].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_matrix_too_wide() {
        let converter = RasterConverter::new(ProfileId::A6);
        assert!(converter.rows_from_matrix(BitMatrix::new(400, 1)).is_err());
    }

    #[test]
    fn test_qr_rows() {
        let matrix = qr_matrix("https://example.com").unwrap();
        assert_eq!(matrix.width(), matrix.height());
        // Finder pattern corner is dark
        assert!(matrix.get(0, 0));

        let converter = RasterConverter::new(ProfileId::A6);
        let rows = converter.rows_from_qr("https://example.com").unwrap();
        let scale = 384 / matrix.width();
        assert_eq!(rows.len(), matrix.height() * scale);
    }

    #[test]
    fn test_rows_from_bytes_pads_last_row() {
        let converter = RasterConverter::new(ProfileId::A6);
        let data = vec![0xAB; 48 + 10];
        let rows: Vec<_> = converter.rows_from_bytes(&data).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![0xAB; 48]);
        assert_eq!(&rows[1][..10], &[0xAB; 10]);
        assert!(rows[1][10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rows_from_text() {
        let converter = RasterConverter::new(ProfileId::A6);
        let rows = converter.rows_from_text("hello\nworld").unwrap();
        assert_eq!(rows.len(), 2 * glyph::GLYPH_HEIGHT);
        assert!(rows.iter().all(|row| row.len() == 48));
    }
}
