//! # Dithering
//!
//! Grayscale rows in, packed 1-bit printer rows out. Intensities are
//! `0.0` (paper) to `1.0` (full burn).
//!
//! | Algorithm | Look |
//! |-----------|------|
//! | `Threshold` | Hard 50% cut, posterized |
//! | `Bayer` | Ordered 8x8 crosshatch, stable between runs |
//! | `FloydSteinberg` | Error diffusion, the default |
//! | `Atkinson` | Error diffusion dropping 2/8 of the error, punchier |
//!
//! A [`RowDitherer`] consumes one row at a time, so an image can be streamed
//! to the printer while it is being converted. Error diffusion carries at
//! most two rows of pending error.
//!
//! ```
//! use peripage::render::dither::{self, DitheringAlgorithm, RowDitherer};
//!
//! assert_eq!(dither::pack_row(&[true, true, false, false, true, false, true, false]), vec![0xCA]);
//!
//! let mut ditherer = RowDitherer::new(DitheringAlgorithm::FloydSteinberg, 16);
//! assert_eq!(ditherer.dither_row(&[0.5; 16]).len(), 2);
//! ```

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PeripageError;

/// Ordered-dither thresholds, 0..=63, indexed `[y % 8][x % 8]`.
pub const BAYER8: [[u8; 8]; 8] = [
    [0, 32, 8, 40, 2, 34, 10, 42],
    [48, 16, 56, 24, 50, 18, 58, 26],
    [12, 44, 4, 36, 14, 46, 6, 38],
    [60, 28, 52, 20, 62, 30, 54, 22],
    [3, 35, 11, 43, 1, 33, 9, 41],
    [51, 19, 59, 27, 49, 17, 57, 25],
    [15, 47, 7, 39, 13, 45, 5, 37],
    [63, 31, 55, 23, 61, 29, 53, 21],
];

/// Midpoint used by threshold and error-diffusion quantization.
const MIDPOINT: f32 = 0.5;

/// Grayscale-to-binary conversion method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DitheringAlgorithm {
    /// Hard cut at 50%
    Threshold,
    /// Ordered 8x8 Bayer matrix
    Bayer,
    /// Floyd-Steinberg error diffusion
    #[default]
    FloydSteinberg,
    /// Atkinson error diffusion (diffuses 6/8 of the error)
    Atkinson,
}

impl fmt::Display for DitheringAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Threshold => "threshold",
            Self::Bayer => "bayer",
            Self::FloydSteinberg => "floyd-steinberg",
            Self::Atkinson => "atkinson",
        })
    }
}

impl FromStr for DitheringAlgorithm {
    type Err = PeripageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "threshold" => Ok(Self::Threshold),
            "bayer" => Ok(Self::Bayer),
            "floyd-steinberg" | "floyd_steinberg" | "fs" => Ok(Self::FloydSteinberg),
            "atkinson" => Ok(Self::Atkinson),
            other => Err(PeripageError::Validation(format!(
                "Unknown dithering algorithm '{}'",
                other
            ))),
        }
    }
}

/// Bayer threshold at `(x, y)`, strictly inside `(0, 1)`: full black always
/// burns and paper white never does.
#[inline]
pub fn threshold(x: usize, y: usize) -> f32 {
    (BAYER8[y % 8][x % 8] as f32 + 0.5) / 64.0
}

/// Ordered-dither decision for one pixel.
///
/// ```
/// use peripage::render::dither::should_print;
///
/// assert!(should_print(3, 5, 1.0));
/// assert!(!should_print(3, 5, 0.0));
/// ```
#[inline]
pub fn should_print(x: usize, y: usize, intensity: f32) -> bool {
    intensity > threshold(x, y)
}

/// Pack dots MSB-first (leftmost pixel in bit 7, set bit = burn). A partial
/// last byte is padded with white.
///
/// ```
/// use peripage::render::dither::pack_row;
///
/// assert_eq!(pack_row(&[true; 12]), vec![0xFF, 0xF0]);
/// ```
pub fn pack_row(pixels: &[bool]) -> Vec<u8> {
    pixels
        .chunks(8)
        .map(|dots| {
            dots.iter()
                .enumerate()
                .filter(|&(_, &burn)| burn)
                .fold(0u8, |byte, (bit, _)| byte | (0x80 >> bit))
        })
        .collect()
}

// ============================================================================
// ROW DITHERER
// ============================================================================

/// # Row Ditherer
///
/// Stateful, row-at-a-time binarizer. Rows must be fed top to bottom; the
/// ditherer carries diffused error from one row into the next.
#[derive(Debug, Clone)]
pub struct RowDitherer {
    algorithm: DitheringAlgorithm,
    width: usize,
    y: usize,
    /// Pending error for the current row and the two rows below it.
    errors: [Vec<f32>; 3],
}

impl RowDitherer {
    pub fn new(algorithm: DitheringAlgorithm, width: usize) -> Self {
        let diffuses = matches!(
            algorithm,
            DitheringAlgorithm::FloydSteinberg | DitheringAlgorithm::Atkinson
        );
        let buffer_width = if diffuses { width } else { 0 };
        Self {
            algorithm,
            width,
            y: 0,
            errors: [
                vec![0.0; buffer_width],
                vec![0.0; buffer_width],
                vec![0.0; buffer_width],
            ],
        }
    }

    pub fn algorithm(&self) -> DitheringAlgorithm {
        self.algorithm
    }

    /// Index of the next row to be dithered.
    pub fn row_index(&self) -> usize {
        self.y
    }

    /// Binarize one row of intensities (0.0 = white, 1.0 = black) and pack
    /// it. Missing trailing intensities are treated as white.
    pub fn dither_row(&mut self, intensities: &[f32]) -> Vec<u8> {
        let width = self.width;
        let value = |x: usize| intensities.get(x).copied().unwrap_or(0.0);
        let y = self.y;

        let pixels: Vec<bool> = match self.algorithm {
            DitheringAlgorithm::Threshold => (0..width).map(|x| value(x) > MIDPOINT).collect(),
            DitheringAlgorithm::Bayer => (0..width).map(|x| should_print(x, y, value(x))).collect(),
            DitheringAlgorithm::FloydSteinberg => self.diffuse(&value, &FLOYD_STEINBERG, 16.0),
            DitheringAlgorithm::Atkinson => self.diffuse(&value, &ATKINSON, 8.0),
        };

        self.errors.rotate_left(1);
        self.errors[2].iter_mut().for_each(|e| *e = 0.0);
        self.y += 1;

        pack_row(&pixels)
    }

    fn diffuse(
        &mut self,
        value: &impl Fn(usize) -> f32,
        kernel: &[(isize, usize, f32)],
        divisor: f32,
    ) -> Vec<bool> {
        let width = self.width;
        let mut pixels = Vec::with_capacity(width);

        for x in 0..width {
            let v = value(x) + self.errors[0][x];
            let on = v > MIDPOINT;
            pixels.push(on);

            let err = v - if on { 1.0 } else { 0.0 };
            for &(dx, dy, weight) in kernel {
                let Some(tx) = x.checked_add_signed(dx) else {
                    continue;
                };
                if tx < width {
                    self.errors[dy][tx] += err * weight / divisor;
                }
            }
        }

        pixels
    }
}

/// (dx, dy, weight / 16)
const FLOYD_STEINBERG: [(isize, usize, f32); 4] =
    [(1, 0, 7.0), (-1, 1, 3.0), (0, 1, 5.0), (1, 1, 1.0)];

/// (dx, dy, weight / 8)
const ATKINSON: [(isize, usize, f32); 6] = [
    (1, 0, 1.0),
    (2, 0, 1.0),
    (-1, 1, 1.0),
    (0, 1, 1.0),
    (1, 1, 1.0),
    (0, 2, 1.0),
];

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DitheringAlgorithm; 4] = [
        DitheringAlgorithm::Threshold,
        DitheringAlgorithm::Bayer,
        DitheringAlgorithm::FloydSteinberg,
        DitheringAlgorithm::Atkinson,
    ];

    fn dither_block(algorithm: DitheringAlgorithm, width: usize, rows: usize, v: f32) -> Vec<u8> {
        let mut ditherer = RowDitherer::new(algorithm, width);
        (0..rows)
            .flat_map(|_| ditherer.dither_row(&vec![v; width]))
            .collect()
    }

    fn ones(bytes: &[u8]) -> u32 {
        bytes.iter().map(|b| b.count_ones()).sum()
    }

    #[test]
    fn test_bayer_is_a_permutation() {
        let mut values: Vec<u8> = BAYER8.iter().flatten().copied().collect();
        values.sort_unstable();
        assert_eq!(values, (0..64).collect::<Vec<u8>>());
    }

    #[test]
    fn test_threshold_never_hits_the_ends() {
        let all: Vec<f32> = (0..64).map(|i| threshold(i % 8, i / 8)).collect();
        assert!(all.iter().all(|&t| t > 0.0 && t < 1.0));
        assert_eq!(threshold(0, 0), threshold(8, 16));
    }

    #[test]
    fn test_pack_row_msb_first() {
        assert_eq!(pack_row(&[true, false, true, false, true, false, true, false]), vec![0xAA]);
        assert_eq!(pack_row(&[false; 8]), vec![0x00]);
        assert_eq!(pack_row(&[true; 9]), vec![0xFF, 0x80]);
        assert!(pack_row(&[]).is_empty());
    }

    #[test]
    fn test_black_and_white_are_exact() {
        for algorithm in ALL {
            let black = dither_block(algorithm, 32, 8, 1.0);
            let white = dither_block(algorithm, 32, 8, 0.0);
            assert!(black.iter().all(|&b| b == 0xFF), "{} black", algorithm);
            assert!(white.iter().all(|&b| b == 0x00), "{} white", algorithm);
        }
    }

    #[test]
    fn test_mid_gray_is_roughly_half() {
        for algorithm in [
            DitheringAlgorithm::Bayer,
            DitheringAlgorithm::FloydSteinberg,
            DitheringAlgorithm::Atkinson,
        ] {
            let data = dither_block(algorithm, 64, 64, 0.5);
            let dots = ones(&data);
            let total = 64 * 64;
            assert!(
                dots > total * 35 / 100 && dots < total * 65 / 100,
                "{}: {} of {} dots",
                algorithm,
                dots,
                total
            );
        }
    }

    #[test]
    fn test_deterministic() {
        for algorithm in ALL {
            assert_eq!(
                dither_block(algorithm, 48, 16, 0.3),
                dither_block(algorithm, 48, 16, 0.3)
            );
        }
    }

    #[test]
    fn test_short_input_is_padded_white() {
        let mut ditherer = RowDitherer::new(DitheringAlgorithm::Threshold, 16);
        assert_eq!(ditherer.dither_row(&[1.0; 4]), vec![0xF0, 0x00]);
        assert_eq!(ditherer.row_index(), 1);
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(
            "fs".parse::<DitheringAlgorithm>().unwrap(),
            DitheringAlgorithm::FloydSteinberg
        );
        assert_eq!(
            "None".parse::<DitheringAlgorithm>().unwrap(),
            DitheringAlgorithm::Threshold
        );
        assert!("jarvis".parse::<DitheringAlgorithm>().is_err());
        assert_eq!(DitheringAlgorithm::default(), DitheringAlgorithm::FloydSteinberg);
    }
}
