//! # Rendering Module
//!
//! This module turns images, QR payloads and text into the fixed-width 1-bit
//! rows PeriPage printers consume. It knows the printer geometry but nothing
//! about the wire protocol.
//!
//! ## Modules
//!
//! - [`dither`]: Grayscale-to-binary conversion (threshold, Bayer, error diffusion)
//! - [`raster`]: Image/matrix/text to printer rows
//! - [`glyph`]: Spleen bitmap font text rendering
//!
//! ## Usage Example
//!
//! ```
//! use peripage::printer::ProfileId;
//! use peripage::render::{DitheringAlgorithm, RasterConverter};
//!
//! let converter = RasterConverter::new(ProfileId::A6p)
//!     .with_dithering(DitheringAlgorithm::Bayer);
//!
//! let rows = converter.rows_from_qr("https://example.com").unwrap();
//! // each row is ready to send as a PrintRow command
//! ```

pub mod dither;
pub mod glyph;
pub mod raster;

pub use dither::DitheringAlgorithm;
pub use raster::{BitMatrix, ImageRows, MatrixRows, RasterConverter, qr_matrix};
