//! # PeriPage Responses
//!
//! Responses come back over the same byte stream with no framing of their
//! own. The request decides what to expect:
//!
//! | Shape | Length | Example |
//! |-------|--------|---------|
//! | `Battery` | 2 bytes `{0, percent}` | `00 40` = 64% |
//! | `Mac` | 14 bytes, `mac _ mac _` | `00 F5 73 25 AC 9F 5F ...` |
//! | `Ack` | 2 bytes | `OK` |
//! | `Text` | until NUL/LF or quiet link | `V2.11_304dpi` |
//! | `Composite` | same as text, `|`-joined | `Name|MAC|MAC2|FW|SN|84` |
//!
//! Bluetooth RFCOMM delivers these in arbitrary pieces, so decoding goes
//! through a [`ResponseAssembler`] that is fed every read until complete.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{PeripageError, Result};

/// Separator of the composite device info string.
pub const FIELD_SEPARATOR: char = '|';

/// Separator after each MAC copy in the MAC response.
const MAC_SEPARATOR: u8 = b'_';

/// Expected response layout for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Fire-and-forget, nothing to read
    None,
    /// Two byte `OK` acknowledgement
    Ack,
    /// Two bytes, percentage in the second
    Battery,
    /// Fourteen bytes, the MAC twice with `_` after each copy
    Mac,
    /// Free ASCII text
    Text,
    /// `|`-joined device info
    Composite,
}

impl ResponseShape {
    /// Exact byte length for fixed-size shapes.
    pub fn fixed_len(&self) -> Option<usize> {
        match self {
            Self::Ack | Self::Battery => Some(2),
            Self::Mac => Some(14),
            Self::None => Some(0),
            Self::Text | Self::Composite => None,
        }
    }

    /// Whether the request produces any response at all.
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// # MAC Address
///
/// Six raw bytes, displayed as `00:F5:73:25:AC:9F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = PeripageError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(PeripageError::Protocol(format!("Invalid MAC address: {:?}", s)));
        }
        let mut bytes = [0u8; 6];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            if part.len() != 2 {
                return Err(PeripageError::Protocol(format!("Invalid MAC address: {:?}", s)));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| PeripageError::Protocol(format!("Invalid MAC address: {:?}", s)))?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// # Device Info
///
/// Parsed composite response of the full info query.
///
/// ```
/// use peripage::protocol::DeviceInfo;
///
/// let info: DeviceInfo =
///     "PeriPage+DF7A|00:F5:73:25:AC:9F|C5:12:81:19:2C:51|V2.11_304dpi|A6491571121|84"
///         .parse()
///         .unwrap();
/// assert_eq!(info.name, "PeriPage+DF7A");
/// assert_eq!(info.battery, 84);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Device name (name + last two MAC bytes)
    pub name: String,
    /// Printer MAC
    pub mac: MacAddress,
    /// MAC of the connected host
    pub client_mac: MacAddress,
    /// Firmware version
    pub firmware: String,
    /// Serial number
    pub serial: String,
    /// Battery percentage
    pub battery: u8,
}

impl FromStr for DeviceInfo {
    type Err = PeripageError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        if fields.len() != 6 {
            return Err(PeripageError::Protocol(format!(
                "Device info has {} fields, expected 6: {:?}",
                fields.len(),
                s
            )));
        }
        Ok(Self {
            name: fields[0].to_string(),
            mac: fields[1].parse()?,
            client_mac: fields[2].parse()?,
            firmware: fields[3].to_string(),
            serial: fields[4].to_string(),
            battery: parse_battery_text(fields[5])?,
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}",
            self.name, self.mac, self.client_mac, self.firmware, self.serial, self.battery
        )
    }
}

/// # Response
///
/// A decoded, typed device response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Nothing was expected
    None,
    /// `OK` acknowledgement of a setting
    Ack,
    /// Battery percentage 0..=100
    Battery(u8),
    /// Device MAC
    Mac(MacAddress),
    /// Free text (name, serial, firmware, hardware, IP)
    Text(String),
    /// Composite device info
    Full(DeviceInfo),
}

impl Response {
    /// Text payload, if this is a text response.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Decode a complete response payload.
///
/// Fixed shapes must match their length exactly; text shapes are cut at the
/// first NUL/LF and trimmed, and only padding may follow the cut. Anything
/// that does not fit is a protocol error.
pub fn decode(shape: ResponseShape, bytes: &[u8]) -> Result<Response> {
    if let Some(len) = shape.fixed_len()
        && bytes.len() != len
    {
        return Err(PeripageError::Protocol(format!(
            "Expected {} response bytes, got {} ({:02X?})",
            len,
            bytes.len(),
            bytes
        )));
    }

    match shape {
        ResponseShape::None => Ok(Response::None),
        ResponseShape::Ack => {
            if bytes == b"OK" {
                Ok(Response::Ack)
            } else {
                Err(PeripageError::Protocol(format!(
                    "Expected OK acknowledgement, got {:02X?}",
                    bytes
                )))
            }
        }
        ResponseShape::Battery => {
            let percent = bytes[1];
            if bytes[0] != 0 || percent > 100 {
                return Err(PeripageError::Protocol(format!(
                    "Invalid battery response {:02X?}",
                    bytes
                )));
            }
            Ok(Response::Battery(percent))
        }
        ResponseShape::Mac => {
            let (first, second) = bytes.split_at(7);
            if first[6] != MAC_SEPARATOR || second[6] != MAC_SEPARATOR || first[..6] != second[..6]
            {
                return Err(PeripageError::Protocol(format!(
                    "Malformed MAC response {:02X?}",
                    bytes
                )));
            }
            let mut mac = [0u8; 6];
            mac.copy_from_slice(&first[..6]);
            Ok(Response::Mac(MacAddress(mac)))
        }
        ResponseShape::Text => Ok(Response::Text(decode_text(bytes)?)),
        ResponseShape::Composite => Ok(Response::Full(decode_text(bytes)?.parse()?)),
    }
}

/// Cut at the terminator, trim padding and require printable ASCII.
fn decode_text(bytes: &[u8]) -> Result<String> {
    let end = terminator_position(bytes).unwrap_or(bytes.len());
    let (text, tail) = bytes.split_at(end);
    if let Some(bad) = tail.iter().find(|&&b| !is_padding(b)) {
        return Err(PeripageError::Protocol(format!(
            "Unexpected byte 0x{:02X} after text response",
            bad
        )));
    }
    let text = text.trim_ascii_end();

    if text.is_empty() {
        return Err(PeripageError::Protocol("Empty text response".to_string()));
    }
    if let Some(bad) = text.iter().find(|b| !(0x20..=0x7E).contains(*b)) {
        return Err(PeripageError::Protocol(format!(
            "Non-ASCII byte 0x{:02X} in text response",
            bad
        )));
    }

    // Checked above: every byte is printable ASCII.
    Ok(text.iter().map(|&b| b as char).collect())
}

fn parse_battery_text(field: &str) -> Result<u8> {
    match field.trim().parse::<u8>() {
        Ok(percent) if percent <= 100 => Ok(percent),
        _ => Err(PeripageError::Protocol(format!(
            "Invalid battery field {:?}",
            field
        ))),
    }
}

fn terminator_position(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|&b| b == 0x00 || b == b'\n')
}

fn is_padding(byte: u8) -> bool {
    matches!(byte, 0x00 | b'\r' | b'\n' | b' ')
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// # Response Assembler
///
/// Accumulates partial reads until a response is complete.
///
/// - Fixed shapes complete once their length has arrived.
/// - Text shapes complete on a NUL or LF terminator; without one, the
///   caller decides the response is over (quiet link) and calls
///   [`finish`](Self::finish) anyway.
///
/// ## Example
///
/// ```
/// use peripage::protocol::{Response, ResponseAssembler, ResponseShape};
///
/// let mut asm = ResponseAssembler::new(ResponseShape::Battery);
/// assert!(!asm.feed(&[0x00]));
/// assert!(asm.feed(&[0x40]));
/// assert_eq!(asm.finish().unwrap(), Response::Battery(64));
/// ```
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    shape: ResponseShape,
    buf: Vec<u8>,
}

impl ResponseAssembler {
    pub fn new(shape: ResponseShape) -> Self {
        Self {
            shape,
            buf: Vec::new(),
        }
    }

    pub fn shape(&self) -> ResponseShape {
        self.shape
    }

    /// Append one read. Returns `true` once the response is complete.
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        self.buf.extend_from_slice(chunk);
        self.is_complete()
    }

    /// Whether enough bytes have arrived to decode.
    pub fn is_complete(&self) -> bool {
        match self.shape.fixed_len() {
            Some(len) => self.buf.len() >= len,
            None => terminator_position(&self.buf).is_some(),
        }
    }

    /// Whether any byte has arrived yet.
    pub fn has_data(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Bytes still missing for fixed shapes (`None` for text shapes).
    pub fn remaining(&self) -> Option<usize> {
        self.shape
            .fixed_len()
            .map(|len| len.saturating_sub(self.buf.len()))
    }

    /// Decode what has been collected.
    pub fn finish(self) -> Result<Response> {
        decode(self.shape, &self.buf)
    }
}

// ============================================================================
// TESTS
// ============================================================================
