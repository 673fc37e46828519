//! # PeriPage - Thermal Printer Library
//!
//! PeriPage is a Rust library for printing on PeriPage A6/A6+/A40/A40+
//! thermal printers over Bluetooth RFCOMM. It provides:
//!
//! - **Protocol implementation**: byte-exact command encoding and response decoding
//! - **Device session**: connection lifecycle, ASCII line buffering, raster printing
//! - **Raster conversion**: images, QR codes and bitmap-font text to 1-bit rows
//! - **Print service**: paced background queue with keep-alive and auto-reconnect
//! - **Transport**: Bluetooth RFCOMM plus an in-memory mock printer
//!
//! ## Quick Start
//!
//! ```no_run
//! use peripage::{DeviceSession, printer::ProfileId, transport::RfcommConnector};
//!
//! let mut session = DeviceSession::new(RfcommConnector::default(), "00:15:83:15:BC:5F", ProfileId::A6p);
//! session.connect()?;
//! session.reset()?;
//!
//! println!("Battery at {}%", session.device_battery()?);
//!
//! session.set_concentration(1)?;
//! session.println_ascii("Hello from Rust")?;
//! session.print_qr("https://example.com")?;
//! session.print_break(100)?;
//!
//! session.disconnect();
//! # Ok::<(), peripage::error::PeripageError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | Command encoding and response decoding |
//! | [`printer`] | Printer profiles, line buffer and device session |
//! | [`render`] | Dithering, bitmap text and raster conversion |
//! | [`service`] | Background print queue |
//! | [`server`] | HTTP front-end for the print queue |
//! | [`transport`] | Communication backends |
//! | [`error`] | Error types |

pub mod error;
pub mod printer;
pub mod protocol;
pub mod render;
pub mod server;
pub mod service;
pub mod transport;

// Re-exports for convenience
pub use error::PeripageError;
pub use printer::{DeviceSession, PrinterProfile, ProfileId};
pub use service::{PrintService, PrintTask};
pub use transport::{MockPrinter, RfcommConnector};
