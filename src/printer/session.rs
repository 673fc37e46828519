//! # Device Session
//!
//! One connection to one printer, and the primitive operations everything
//! else is built from. All calls block until the exchange is done; the
//! protocol is half-duplex, so there is never more than one request in
//! flight.
//!
//! ## Connection States
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!                             Connecting --err--> Failed
//! Connected --disconnect()--> Disconnected
//! Connected --link error during any op--> Failed
//! Failed --reconnect()--> Connecting
//! ```
//!
//! ## Errors
//!
//! Every error is returned to the caller as-is; the session never retries.
//! Argument checks (`Validation`) happen before any byte is written.
//!
//! ## Example
//!
//! ```
//! use peripage::printer::{DeviceSession, ProfileId};
//! use peripage::transport::MockPrinter;
//!
//! let printer = MockPrinter::new();
//! let mut session = DeviceSession::new(printer.connector(), "00:15:83:15:BC:5F", ProfileId::A6p);
//!
//! session.connect()?;
//! session.reset()?;
//! session.println_ascii("Hello from Rust")?;
//! session.print_break(0x40)?;
//! session.disconnect();
//! # Ok::<(), peripage::error::PeripageError>(())
//! ```

use std::fmt;
use std::time::Duration;

use image::DynamicImage;
use serde::Serialize;

use super::config::PrinterProfile;
use super::line_buffer::{LineBuffer, is_printable_ascii};
use crate::error::{PeripageError, Result};
use crate::protocol::commands::{
    EMPTY_LINE_BREAK, MAX_CONCENTRATION, MAX_SERIAL_LEN, POWER_TIMEOUT_RANGE,
};
use crate::protocol::response::FIELD_SEPARATOR;
use crate::protocol::{Command, DeviceInfo, MacAddress, Response, ResponseAssembler};
use crate::render::{DitheringAlgorithm, RasterConverter};
use crate::transport::{Channel, Connector};

/// Largest single read while assembling a text response.
const READ_CHUNK: usize = 256;

/// Upper bound on leftover bytes thrown away before one request.
const MAX_STALE_BYTES: usize = 4096;

/// Lifecycle of a [`DeviceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        })
    }
}

/// Read timing for responses and how images are reduced to 1-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for the first response byte
    pub read_timeout: Duration,
    /// Quiet time that ends a text response
    pub settle_timeout: Duration,
    /// Used by `print_image` and `print_qr`
    pub dithering: DitheringAlgorithm,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            settle_timeout: Duration::from_millis(150),
            dithering: DitheringAlgorithm::default(),
        }
    }
}

/// # Device Session
///
/// Owns the channel and the ASCII line buffer. Generic over the transport
/// so tests can run against [`MockPrinter`](crate::transport::MockPrinter).
pub struct DeviceSession<C: Connector> {
    connector: C,
    channel: Option<C::Channel>,
    address: String,
    profile: PrinterProfile,
    state: ConnectionState,
    line: LineBuffer,
    config: SessionConfig,
}

impl<C: Connector> DeviceSession<C> {
    pub fn new(connector: C, address: impl Into<String>, profile: impl Into<PrinterProfile>) -> Self {
        let profile = profile.into();
        Self {
            connector,
            channel: None,
            address: address.into(),
            line: LineBuffer::new(profile.row_characters),
            profile,
            state: ConnectionState::Disconnected,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_dithering(mut self, algorithm: DitheringAlgorithm) -> Self {
        self.config.dithering = algorithm;
        self
    }

    pub fn dithering(&self) -> DitheringAlgorithm {
        self.config.dithering
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn profile(&self) -> &PrinterProfile {
        &self.profile
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Characters waiting in the ASCII line buffer.
    pub fn current_buffer(&self) -> &[u8] {
        self.line.current_buffer()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Open the transport. A no-op when already connected.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        tracing::info!(address = %self.address, profile = %self.profile.id, "Connecting to printer");

        match self.connector.open(&self.address) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = ConnectionState::Connected;
                tracing::info!(address = %self.address, "Connected");
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                tracing::warn!(address = %self.address, error = %e, "Connection failed");
                Err(match e {
                    PeripageError::Connection(_) => e,
                    other => PeripageError::Connection(other.to_string()),
                })
            }
        }
    }

    /// Close the transport. Always ends `Disconnected`; safe to repeat.
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            tracing::info!(address = %self.address, "Disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.connect()
    }

    /// Reset the printer's transient print state and drop buffered text.
    /// Settings stored on the device (serial, concentration, timeout) stay.
    pub fn reset(&mut self) -> Result<()> {
        self.line.clear();
        self.send(Command::Reset)
    }

    // ========================================================================
    // EXCHANGE
    // ========================================================================

    /// Send a command and wait for its typed response.
    ///
    /// Bytes left on the link by an earlier exchange are discarded before a
    /// command that expects an answer goes out. A text answer is read until
    /// the link goes quiet, so padding after its terminator never leaks into
    /// the next exchange.
    pub fn query(&mut self, command: Command) -> Result<Response> {
        let shape = command.response_shape();
        if shape.expects_response() {
            self.discard_stale()?;
        }
        tracing::debug!(command = command.name(), "Sending");

        let frame = command.encode();
        let written = self.channel_mut().and_then(|channel| channel.write(&frame));
        self.track(written)?;

        if !shape.expects_response() {
            return Ok(Response::None);
        }

        let mut assembler = ResponseAssembler::new(shape);
        loop {
            let text_settling = assembler.has_data() && shape.fixed_len().is_none();
            let wait = if text_settling {
                self.config.settle_timeout
            } else {
                self.config.read_timeout
            };
            let max_len = assembler.remaining().unwrap_or(READ_CHUNK).max(1);

            let read = self.channel_mut().and_then(|channel| channel.read(max_len, wait));
            match read {
                Ok(bytes) => {
                    if assembler.feed(&bytes) {
                        break;
                    }
                }
                // Text responses may end without a terminator
                Err(PeripageError::Timeout(_)) if text_settling => break,
                Err(e) => return self.track(Err(e)),
            }
        }

        if shape.fixed_len().is_none() && assembler.is_complete() {
            self.read_trailing(&mut assembler)?;
        }

        let response = assembler.finish();
        if let Err(e) = &response {
            tracing::warn!(command = command.name(), error = %e, "Undecodable response");
        }
        response
    }

    /// Send a command, discarding any response payload.
    pub fn send(&mut self, command: Command) -> Result<()> {
        self.query(command).map(|_| ())
    }

    /// Send one raster row; it must be exactly `row_bytes` long.
    pub fn send_row(&mut self, row: &[u8]) -> Result<()> {
        self.check_row(row)?;
        self.send(Command::PrintRow(row.to_vec()))
    }

    /// Send one ASCII line. An empty line becomes a short paper feed, since
    /// a bare LF on an empty device buffer can freeze the printer.
    pub fn send_ascii_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.len() > self.profile.row_characters {
            return Err(PeripageError::Validation(format!(
                "ASCII chunk of {} characters exceeds row width {}",
                chunk.len(),
                self.profile.row_characters
            )));
        }
        if let Some(&bad) = chunk.iter().find(|&&b| !is_printable_ascii(b as char)) {
            return Err(PeripageError::Validation(format!(
                "Byte 0x{:02X} is not printable ASCII",
                bad
            )));
        }

        if chunk.is_empty() {
            self.send(Command::PrintBreak(EMPTY_LINE_BREAK))
        } else {
            self.send(Command::PrintAsciiChunk(chunk.to_vec()))
        }
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    /// Feed blank paper. Zero is raised to one dot.
    pub fn print_break(&mut self, pixels: u8) -> Result<()> {
        self.send(Command::PrintBreak(pixels.max(1)))
    }

    /// Heat level: 0 = light, 1 = medium, 2 = dark.
    pub fn set_concentration(&mut self, level: u8) -> Result<()> {
        if level > MAX_CONCENTRATION {
            return Err(PeripageError::Validation(format!(
                "Concentration {} out of range 0..={}",
                level, MAX_CONCENTRATION
            )));
        }
        self.send(Command::SetConcentration(level))
    }

    /// Auto power-off timeout in minutes.
    pub fn set_power_timeout(&mut self, minutes: u16) -> Result<()> {
        if !POWER_TIMEOUT_RANGE.contains(&minutes) {
            return Err(PeripageError::Validation(format!(
                "Power timeout {} out of range {}..={}",
                minutes,
                POWER_TIMEOUT_RANGE.start(),
                POWER_TIMEOUT_RANGE.end()
            )));
        }
        let response = self.query(Command::SetPowerTimeout(minutes))?;
        expect_ack(response)
    }

    /// Store a new serial number on the device.
    pub fn set_device_serial_number(&mut self, serial: &str) -> Result<()> {
        validate_serial(serial)?;
        let response = self.query(Command::SetSerial(serial.to_string()))?;
        expect_ack(response)
    }

    // ========================================================================
    // DEVICE QUERIES
    // ========================================================================

    pub fn device_name(&mut self) -> Result<String> {
        self.query_text(Command::QueryName)
    }

    pub fn device_serial(&mut self) -> Result<String> {
        self.query_text(Command::QuerySerial)
    }

    pub fn device_firmware(&mut self) -> Result<String> {
        self.query_text(Command::QueryFirmware)
    }

    pub fn device_hardware(&mut self) -> Result<String> {
        self.query_text(Command::QueryHardware)
    }

    pub fn device_ip(&mut self) -> Result<String> {
        self.query_text(Command::QueryIp)
    }

    pub fn device_mac(&mut self) -> Result<MacAddress> {
        match self.query(Command::QueryMac)? {
            Response::Mac(mac) => Ok(mac),
            other => Err(unexpected("MAC", &other)),
        }
    }

    /// Battery charge in percent.
    pub fn device_battery(&mut self) -> Result<u8> {
        match self.query(Command::QueryBattery)? {
            Response::Battery(percent) => Ok(percent),
            other => Err(unexpected("battery", &other)),
        }
    }

    /// Everything at once: name, MACs, firmware, serial and battery.
    pub fn device_info(&mut self) -> Result<DeviceInfo> {
        match self.query(Command::QueryFull)? {
            Response::Full(info) => Ok(info),
            other => Err(unexpected("device info", &other)),
        }
    }

    fn query_text(&mut self, command: Command) -> Result<String> {
        match self.query(command)? {
            Response::Text(text) => Ok(text),
            other => Err(unexpected("text", &other)),
        }
    }

    // ========================================================================
    // ASCII PRINTING
    // ========================================================================

    /// Print text through the line buffer. Complete lines go out at once;
    /// a trailing partial line stays buffered until the next newline,
    /// a full row, or [`flush_ascii`](Self::flush_ascii).
    pub fn print_ascii(&mut self, text: &str) -> Result<()> {
        for chunk in self.line.append(text) {
            self.send_ascii_chunk(&chunk)?;
        }
        Ok(())
    }

    pub fn println_ascii(&mut self, text: &str) -> Result<()> {
        self.print_ascii(text)?;
        self.print_ascii("\n")
    }

    /// Send whatever is buffered, even an empty line.
    pub fn flush_ascii(&mut self) -> Result<()> {
        let chunk = self.line.flush();
        self.send_ascii_chunk(&chunk)
    }

    // ========================================================================
    // RASTER PRINTING
    // ========================================================================

    /// Print a sequence of raster rows; returns the number of rows sent.
    ///
    /// A reset command goes out once before the first row. Buffered ASCII
    /// text is kept and still prints on the next flush. A row of the wrong
    /// length stops the job with `Validation` before any of its bytes are
    /// sent; rows before it have already been printed.
    pub fn print_rows<I>(&mut self, rows: I) -> Result<usize>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let mut sent = 0;
        for row in rows {
            let row = row.as_ref();
            self.check_row(row)?;
            if sent == 0 {
                self.send(Command::Reset)?;
            }
            self.send(Command::PrintRow(row.to_vec()))?;
            sent += 1;
        }
        tracing::debug!(rows = sent, "Raster job sent");
        Ok(sent)
    }

    /// Print several row sequences back to back, as one job.
    pub fn print_row_chunks<I, R>(&mut self, chunks: I) -> Result<usize>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator,
        R::Item: AsRef<[u8]>,
    {
        self.print_rows(chunks.into_iter().flatten())
    }

    pub fn print_image(&mut self, image: &DynamicImage) -> Result<usize> {
        let rows = self.raster().rows_from_image(image)?;
        self.print_rows(rows)
    }

    pub fn print_qr(&mut self, text: &str) -> Result<usize> {
        let rows = self.raster().rows_from_qr(text)?;
        self.print_rows(rows)
    }

    /// Print text in the bitmap font as raster rows, wrapped to the paper
    /// width. Unlike ASCII mode this bypasses the line buffer.
    pub fn print_text_raster(&mut self, text: &str) -> Result<usize> {
        let rows = self.raster().rows_from_text(text)?;
        self.print_rows(rows)
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn raster(&self) -> RasterConverter {
        RasterConverter::new(self.profile).with_dithering(self.config.dithering)
    }

    /// Empty the receive side without waiting.
    fn discard_stale(&mut self) -> Result<()> {
        let mut discarded = 0;
        while discarded < MAX_STALE_BYTES {
            let read = self
                .channel_mut()
                .and_then(|channel| channel.read(READ_CHUNK, Duration::ZERO));
            match read {
                Ok(bytes) => discarded += bytes.len(),
                Err(PeripageError::Timeout(_)) => break,
                Err(e) => return self.track(Err(e)),
            }
        }
        if discarded > 0 {
            tracing::debug!(bytes = discarded, "Discarded stale bytes");
        }
        Ok(())
    }

    /// Collect what follows a text terminator until the link is quiet.
    fn read_trailing(&mut self, assembler: &mut ResponseAssembler) -> Result<()> {
        let mut trailing = 0;
        while trailing < READ_CHUNK {
            let wait = self.config.settle_timeout;
            let read = self
                .channel_mut()
                .and_then(|channel| channel.read(READ_CHUNK - trailing, wait));
            match read {
                Ok(bytes) => {
                    trailing += bytes.len();
                    assembler.feed(&bytes);
                }
                Err(PeripageError::Timeout(_)) => break,
                Err(e) => return self.track(Err(e)),
            }
        }
        Ok(())
    }

    fn check_row(&self, row: &[u8]) -> Result<()> {
        if row.len() != self.profile.row_bytes {
            return Err(PeripageError::Validation(format!(
                "Row is {} bytes, {} expects {}",
                row.len(),
                self.profile.name,
                self.profile.row_bytes
            )));
        }
        Ok(())
    }

    fn channel_mut(&mut self) -> Result<&mut C::Channel> {
        match (self.state, self.channel.as_mut()) {
            (ConnectionState::Connected, Some(channel)) => Ok(channel),
            _ => Err(PeripageError::Connection(format!(
                "Not connected to {} ({})",
                self.address, self.state
            ))),
        }
    }

    /// Mark the session failed when the link broke.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_link_failure()
            && self.state == ConnectionState::Connected
        {
            tracing::warn!(address = %self.address, error = %e, "Link failed");
            self.state = ConnectionState::Failed;
        }
        result
    }
}

/// Serial numbers: 1..=32 visible ASCII characters, no field separator.
pub fn validate_serial(serial: &str) -> Result<()> {
    if serial.is_empty() || serial.len() > MAX_SERIAL_LEN {
        return Err(PeripageError::Validation(format!(
            "Serial number must be 1..={} characters, got {}",
            MAX_SERIAL_LEN,
            serial.chars().count()
        )));
    }
    if let Some(bad) = serial
        .chars()
        .find(|&c| !c.is_ascii_graphic() || c == FIELD_SEPARATOR)
    {
        return Err(PeripageError::Validation(format!(
            "Serial number may not contain {:?}",
            bad
        )));
    }
    Ok(())
}

fn expect_ack(response: Response) -> Result<()> {
    match response {
        Response::Ack => Ok(()),
        other => Err(unexpected("OK", &other)),
    }
}

fn unexpected(expected: &str, got: &Response) -> PeripageError {
    PeripageError::Protocol(format!("Expected {} response, got {:?}", expected, got))
}

// ============================================================================
// TESTS
// ============================================================================
