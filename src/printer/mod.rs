//! # Printer Module
//!
//! This module provides printer profiles and the stateful device session.
//!
//! ## Modules
//!
//! - [`config`]: Printer hardware profiles
//! - [`line_buffer`]: ASCII line buffering with the device's flush rules
//! - [`session`]: Connection lifecycle and primitive printer operations

pub mod config;
pub mod line_buffer;
pub mod session;

pub use config::{PrinterProfile, ProfileId};
pub use line_buffer::LineBuffer;
pub use session::{ConnectionState, DeviceSession, SessionConfig};
