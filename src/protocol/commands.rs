//! # PeriPage Request Commands
//!
//! This module maps every request the printer understands onto its exact wire
//! bytes. The protocol has no checksum, no request IDs and no length prefix
//! for most frames; the opcode alone tells the device how much payload to
//! expect.
//!
//! ## Frame Families
//!
//! | Prefix        | Family | Payload |
//! |---------------|--------|---------|
//! | `10 FF ...`   | Device queries and settings | none, fixed, or NUL-terminated |
//! | `1B 4A n`     | Paper feed (break) | 1 byte |
//! | `1D 76 30 00` | Raster row | u16 LE width, u16 LE height, row data |
//! | raw ASCII     | Text line | characters + `LF` |
//!
//! ## Byte Order
//!
//! Settings use **big-endian** integers (`10 FF 12 hi lo`), raster headers
//! use **little-endian** (`1D 76 30 00 xL xH yL yH`).

use super::response::ResponseShape;

// ============================================================================
// OPCODE CONSTANTS
// ============================================================================

/// Prefix of every device query and setting request.
pub const DEVICE_PREFIX: [u8; 2] = [0x10, 0xFF];

/// ESC J - feed paper by n dots
pub const FEED: [u8; 2] = [0x1B, 0x4A];

/// GS v 0 - print raster bit image, normal density
pub const RASTER: [u8; 4] = [0x1D, 0x76, 0x30, 0x00];

/// LF - terminates one ASCII text line
pub const LF: u8 = 0x0A;

/// Reset payload, sent after `10 FF FE 01`.
pub const RESET_PADDING: [u8; 12] = [0x00; 12];

/// Bounds accepted by the power timeout setting (minutes).
pub const POWER_TIMEOUT_RANGE: std::ops::RangeInclusive<u16> = 0x0001..=0xFFF0;

/// Maximum concentration level (0 = light, 1 = medium, 2 = dark).
pub const MAX_CONCENTRATION: u8 = 2;

/// Maximum serial number length accepted by the device.
pub const MAX_SERIAL_LEN: usize = 32;

/// Break height used in place of an empty ASCII line.
pub const EMPTY_LINE_BREAK: u8 = 30;

/// # Command
///
/// A tagged request. Each variant maps to exactly one wire opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Unknown property, e.g. `IP-300` on an A6+
    QueryIp,
    /// Device name, e.g. `PeriPage+DF7A`
    QueryName,
    /// Serial number, e.g. `A6491571121`
    QuerySerial,
    /// Firmware version, e.g. `V2.11_304dpi`
    QueryFirmware,
    /// Battery percentage
    QueryBattery,
    /// Hardware/chip description
    QueryHardware,
    /// Device MAC address
    QueryMac,
    /// Composite `name|mac|client_mac|firmware|serial|battery`
    QueryFull,
    /// Write a new serial number (ASCII, NUL terminated on the wire)
    SetSerial(String),
    /// Auto power-off timeout in minutes
    SetPowerTimeout(u16),
    /// Heat level 0..=2
    SetConcentration(u8),
    /// Blank paper feed of n dots
    PrintBreak(u8),
    /// One packed raster row
    PrintRow(Vec<u8>),
    /// One line of device-font ASCII text (without the trailing LF)
    PrintAsciiChunk(Vec<u8>),
    /// Reset transient print state; required after connecting
    Reset,
    /// Ask the printer to introduce itself (composite info)
    Introduce,
}

impl Command {
    /// Encode this command into its wire frame.
    ///
    /// Encoding is pure: identical commands always produce identical bytes.
    /// Argument ranges are checked by the session before encoding; values
    /// are written exactly as given.
    ///
    /// ## Example
    ///
    /// ```
    /// use peripage::protocol::Command;
    ///
    /// assert_eq!(Command::QueryBattery.encode(), vec![0x10, 0xFF, 0x50, 0xF1]);
    /// assert_eq!(Command::PrintBreak(0x40).encode(), vec![0x1B, 0x4A, 0x40]);
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::QueryIp => device(&[0x20, 0xF0]),
            Self::QueryFirmware => device(&[0x20, 0xF1]),
            Self::QuerySerial => device(&[0x20, 0xF2]),
            Self::QueryHardware => device(&[0x30, 0x10]),
            Self::QueryName => device(&[0x30, 0x11]),
            Self::QueryMac => device(&[0x30, 0x12]),
            Self::QueryBattery => device(&[0x50, 0xF1]),
            Self::QueryFull | Self::Introduce => device(&[0x70, 0xF1, 0x00]),
            Self::SetSerial(serial) => {
                let mut out = device(&[0x20, 0xF4]);
                out.extend_from_slice(serial.as_bytes());
                out.push(0x00);
                out
            }
            Self::SetPowerTimeout(minutes) => {
                let mut out = device(&[0x12]);
                out.extend_from_slice(&minutes.to_be_bytes());
                out
            }
            Self::SetConcentration(level) => device(&[0x10, 0x00, *level]),
            Self::PrintBreak(dots) => vec![FEED[0], FEED[1], *dots],
            Self::PrintRow(row) => {
                let mut out = Vec::with_capacity(RASTER.len() + 4 + row.len());
                out.extend_from_slice(&RASTER);
                out.extend_from_slice(&(row.len() as u16).to_le_bytes());
                out.extend_from_slice(&1u16.to_le_bytes());
                out.extend_from_slice(row);
                out
            }
            Self::PrintAsciiChunk(text) => {
                let mut out = Vec::with_capacity(text.len() + 1);
                out.extend_from_slice(text);
                out.push(LF);
                out
            }
            Self::Reset => {
                let mut out = device(&[0xFE, 0x01]);
                out.extend_from_slice(&RESET_PADDING);
                out
            }
        }
    }

    /// Shape of the response this command produces, used to assemble
    /// partial reads.
    pub fn response_shape(&self) -> ResponseShape {
        match self {
            Self::QueryIp
            | Self::QueryName
            | Self::QuerySerial
            | Self::QueryFirmware
            | Self::QueryHardware => ResponseShape::Text,
            Self::QueryFull | Self::Introduce => ResponseShape::Composite,
            Self::QueryBattery => ResponseShape::Battery,
            Self::QueryMac => ResponseShape::Mac,
            Self::SetSerial(_) | Self::SetPowerTimeout(_) => ResponseShape::Ack,
            Self::SetConcentration(_)
            | Self::PrintBreak(_)
            | Self::PrintRow(_)
            | Self::PrintAsciiChunk(_)
            | Self::Reset => ResponseShape::None,
        }
    }

    /// Short human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueryIp => "query_ip",
            Self::QueryName => "query_name",
            Self::QuerySerial => "query_serial",
            Self::QueryFirmware => "query_firmware",
            Self::QueryBattery => "query_battery",
            Self::QueryHardware => "query_hardware",
            Self::QueryMac => "query_mac",
            Self::QueryFull => "query_full",
            Self::SetSerial(_) => "set_serial",
            Self::SetPowerTimeout(_) => "set_power_timeout",
            Self::SetConcentration(_) => "set_concentration",
            Self::PrintBreak(_) => "print_break",
            Self::PrintRow(_) => "print_row",
            Self::PrintAsciiChunk(_) => "print_ascii_chunk",
            Self::Reset => "reset",
            Self::Introduce => "introduce",
        }
    }
}

/// `10 FF` + opcode tail.
#[inline]
fn device(tail: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DEVICE_PREFIX.len() + tail.len());
    out.extend_from_slice(&DEVICE_PREFIX);
    out.extend_from_slice(tail);
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_opcodes() {
        assert_eq!(Command::QueryIp.encode(), vec![0x10, 0xFF, 0x20, 0xF0]);
        assert_eq!(Command::QueryFirmware.encode(), vec![0x10, 0xFF, 0x20, 0xF1]);
        assert_eq!(Command::QuerySerial.encode(), vec![0x10, 0xFF, 0x20, 0xF2]);
        assert_eq!(Command::QueryHardware.encode(), vec![0x10, 0xFF, 0x30, 0x10]);
        assert_eq!(Command::QueryName.encode(), vec![0x10, 0xFF, 0x30, 0x11]);
        assert_eq!(Command::QueryMac.encode(), vec![0x10, 0xFF, 0x30, 0x12]);
        assert_eq!(Command::QueryBattery.encode(), vec![0x10, 0xFF, 0x50, 0xF1]);
        assert_eq!(
            Command::QueryFull.encode(),
            vec![0x10, 0xFF, 0x70, 0xF1, 0x00]
        );
    }

    #[test]
    fn test_introduce_is_full_query() {
        assert_eq!(Command::Introduce.encode(), Command::QueryFull.encode());
    }

    #[test]
    fn test_set_serial_is_nul_terminated() {
        let frame = Command::SetSerial("A6491571121".into()).encode();
        assert_eq!(&frame[..4], &[0x10, 0xFF, 0x20, 0xF4]);
        assert_eq!(&frame[4..15], b"A6491571121");
        assert_eq!(frame[15], 0x00);
        assert_eq!(frame.len(), 16);
    }

    #[test]
    fn test_power_timeout_big_endian() {
        assert_eq!(
            Command::SetPowerTimeout(0x0123).encode(),
            vec![0x10, 0xFF, 0x12, 0x01, 0x23]
        );
    }

    #[test]
    fn test_concentration() {
        assert_eq!(
            Command::SetConcentration(2).encode(),
            vec![0x10, 0xFF, 0x10, 0x00, 0x02]
        );
    }

    #[test]
    fn test_print_row_header() {
        let row = vec![0xAA; 72];
        let frame = Command::PrintRow(row.clone()).encode();
        // 1D 76 30 00 48 00 01 00 matches the A6+ preamble
        assert_eq!(&frame[..8], &[0x1D, 0x76, 0x30, 0x00, 0x48, 0x00, 0x01, 0x00]);
        assert_eq!(&frame[8..], row.as_slice());
    }

    #[test]
    fn test_ascii_chunk_appends_lf() {
        assert_eq!(
            Command::PrintAsciiChunk(b"hello".to_vec()).encode(),
            b"hello\n".to_vec()
        );
        assert_eq!(Command::PrintAsciiChunk(Vec::new()).encode(), vec![LF]);
    }

    #[test]
    fn test_reset_frame() {
        let frame = Command::Reset.encode();
        assert_eq!(frame.len(), 16);
        assert_eq!(&frame[..4], &[0x10, 0xFF, 0xFE, 0x01]);
        assert!(frame[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let commands = [
            Command::QueryFull,
            Command::SetSerial("X1".into()),
            Command::PrintRow(vec![1, 2, 3]),
            Command::PrintBreak(9),
        ];
        for cmd in &commands {
            assert_eq!(cmd.encode(), cmd.clone().encode());
        }
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(Command::QueryBattery.response_shape(), ResponseShape::Battery);
        assert_eq!(Command::QueryFull.response_shape(), ResponseShape::Composite);
        assert_eq!(
            Command::SetPowerTimeout(5).response_shape(),
            ResponseShape::Ack
        );
        assert_eq!(Command::Reset.response_shape(), ResponseShape::None);
    }
}
