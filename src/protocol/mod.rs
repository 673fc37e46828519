//! # PeriPage Protocol Codec
//!
//! Stateless translation between typed commands/responses and wire bytes.
//! Nothing here performs I/O.
//!
//! ## Module Structure
//!
//! - [`commands`]: Request opcodes and frame encoding
//! - [`response`]: Response shapes, decoding and partial-read assembly
//!
//! ## Usage Example
//!
//! ```
//! use peripage::protocol::{Command, Response, ResponseAssembler};
//!
//! let cmd = Command::QueryBattery;
//! let frame = cmd.encode();
//! assert_eq!(frame, vec![0x10, 0xFF, 0x50, 0xF1]);
//!
//! // ...send `frame`, then feed whatever the link returns
//! let mut asm = ResponseAssembler::new(cmd.response_shape());
//! asm.feed(&[0x00, 0x54]);
//! assert_eq!(asm.finish().unwrap(), Response::Battery(84));
//! ```
//!
//! ## Protocol Reference
//!
//! The protocol is proprietary and undocumented; the opcode table was
//! recovered from traffic captures of PeriPage A6/A6+ printers.

pub mod commands;
pub mod response;

pub use commands::Command;
pub use response::{DeviceInfo, MacAddress, Response, ResponseAssembler, ResponseShape, decode};
