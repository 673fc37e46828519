//! # In-Memory Printer
//!
//! A fake PeriPage device behind the [`Connector`]/[`Channel`] traits, for
//! tests.
//!
//! [`MockPrinter`] is a cheap, cloneable handle onto shared state, so a test
//! can keep one copy for inspection while the session (or the print
//! service's worker) owns the connector.
//!
//! - Every write is recorded as one frame.
//! - Queries are answered from a [`MockDevice`]; text answers carry no
//!   terminator, so the reader has to detect the quiet link.
//! - Answers are served in reads of at most `read_chunk` bytes to exercise
//!   partial-read assembly.
//! - Connect refusals, write failures and link drops can be injected.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{Channel, Connector};
use crate::error::{PeripageError, Result};
use crate::protocol::MacAddress;
use crate::protocol::commands::DEVICE_PREFIX;

/// Identity the fake printer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDevice {
    pub name: String,
    pub serial: String,
    pub firmware: String,
    pub hardware: String,
    pub ip: String,
    pub mac: MacAddress,
    pub client_mac: MacAddress,
    pub battery: u8,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self {
            name: "PeriPage+DF7A".to_string(),
            serial: "A6491571121".to_string(),
            firmware: "V2.11_304dpi".to_string(),
            hardware: "HW-A6P-1.0".to_string(),
            ip: "IP-300".to_string(),
            mac: MacAddress([0x00, 0xF5, 0x73, 0x25, 0xAC, 0x9F]),
            client_mac: MacAddress([0xC5, 0x12, 0x81, 0x19, 0x2C, 0x51]),
            battery: 84,
        }
    }
}

impl MockDevice {
    /// Composite `name|mac|client_mac|firmware|serial|battery` answer.
    pub fn full(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.name, self.mac, self.client_mac, self.firmware, self.serial, self.battery
        )
    }

    fn answer(&mut self, frame: &[u8]) -> Option<Vec<u8>> {
        let body = frame.strip_prefix(&DEVICE_PREFIX)?;
        match body {
            [0x20, 0xF0] => Some(self.ip.clone().into_bytes()),
            [0x20, 0xF1] => Some(self.firmware.clone().into_bytes()),
            [0x20, 0xF2] => Some(self.serial.clone().into_bytes()),
            [0x30, 0x10] => Some(self.hardware.clone().into_bytes()),
            [0x30, 0x11] => Some(self.name.clone().into_bytes()),
            [0x30, 0x12] => {
                let mut out = Vec::with_capacity(14);
                out.extend_from_slice(&self.mac.0);
                out.push(b'_');
                out.extend_from_slice(&self.mac.0);
                out.push(b'_');
                Some(out)
            }
            [0x50, 0xF1] => Some(vec![0x00, self.battery]),
            [0x70, 0xF1, 0x00] => Some(self.full().into_bytes()),
            [0x20, 0xF4, serial @ ..] => {
                let end = serial.iter().position(|&b| b == 0).unwrap_or(serial.len());
                self.serial = String::from_utf8_lossy(&serial[..end]).into_owned();
                Some(b"OK".to_vec())
            }
            [0x12, _, _] => Some(b"OK".to_vec()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct MockState {
    device: MockDevice,
    frames: Vec<Vec<u8>>,
    pending: VecDeque<u8>,
    next_answer: Option<Vec<u8>>,
    read_chunk: usize,
    silent: bool,
    refuse_connects: usize,
    fail_writes: usize,
    link_up: bool,
    generation: u64,
    connects: usize,
    last_address: Option<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            device: MockDevice::default(),
            frames: Vec::new(),
            pending: VecDeque::new(),
            next_answer: None,
            read_chunk: usize::MAX,
            silent: false,
            refuse_connects: 0,
            fail_writes: 0,
            link_up: false,
            generation: 0,
            connects: 0,
            last_address: None,
        }
    }
}

/// # Mock Printer
///
/// Shared handle onto one fake device.
///
/// ```
/// use peripage::printer::{DeviceSession, ProfileId};
/// use peripage::transport::MockPrinter;
///
/// let printer = MockPrinter::new();
/// let mut session = DeviceSession::new(printer.connector(), "mock", ProfileId::A6);
/// session.connect().unwrap();
/// assert_eq!(session.device_battery().unwrap(), 84);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockPrinter {
    state: Arc<Mutex<MockState>>,
}

impl MockPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(device: MockDevice) -> Self {
        let printer = Self::default();
        printer.lock().device = device;
        printer
    }

    /// A connector that opens channels onto this printer.
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            printer: self.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every frame written so far, in order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    pub fn clear_frames(&self) {
        self.lock().frames.clear();
    }

    /// Current device identity (reflects serial number writes).
    pub fn device(&self) -> MockDevice {
        self.lock().device.clone()
    }

    pub fn set_battery(&self, percent: u8) {
        self.lock().device.battery = percent;
    }

    /// Serve answers in reads of at most `bytes` bytes.
    pub fn set_read_chunk(&self, bytes: usize) {
        self.lock().read_chunk = bytes.max(1);
    }

    /// Stop answering queries (reads time out).
    pub fn set_silent(&self, silent: bool) {
        self.lock().silent = silent;
    }

    /// Queue raw bytes to be read before any automatic answer.
    pub fn push_response(&self, bytes: &[u8]) {
        self.lock().pending.extend(bytes);
    }

    /// Reply to the next written frame with `bytes` instead of the device's
    /// own answer.
    pub fn answer_next(&self, bytes: &[u8]) {
        self.lock().next_answer = Some(bytes.to_vec());
    }

    /// Refuse the next `n` connection attempts.
    pub fn refuse_connects(&self, n: usize) {
        self.lock().refuse_connects = n;
    }

    /// Fail the next `n` writes with a transport error.
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().fail_writes = n;
    }

    /// Drop the current link; the open channel errors until reconnected.
    pub fn drop_link(&self) {
        let mut state = self.lock();
        state.link_up = false;
        state.pending.clear();
    }

    /// Successful connection attempts so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    pub fn is_link_up(&self) -> bool {
        self.lock().link_up
    }

    /// Address passed to the last successful open.
    pub fn last_address(&self) -> Option<String> {
        self.lock().last_address.clone()
    }
}

/// Opens [`MockChannel`]s onto a [`MockPrinter`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    printer: MockPrinter,
}

impl MockConnector {
    pub fn new(printer: MockPrinter) -> Self {
        Self { printer }
    }

    pub fn printer(&self) -> &MockPrinter {
        &self.printer
    }
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    fn open(&mut self, address: &str) -> Result<MockChannel> {
        let mut state = self.printer.lock();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(PeripageError::Connection(format!(
                "{} is not reachable",
                address
            )));
        }

        state.generation += 1;
        state.connects += 1;
        state.link_up = true;
        state.pending.clear();
        state.last_address = Some(address.to_string());

        Ok(MockChannel {
            printer: self.printer.clone(),
            generation: state.generation,
            closed: false,
        })
    }
}

/// One open link to a [`MockPrinter`].
#[derive(Debug)]
pub struct MockChannel {
    printer: MockPrinter,
    generation: u64,
    closed: bool,
}

impl MockChannel {
    fn check_link(&self, state: &MockState) -> Result<()> {
        if self.closed {
            return Err(PeripageError::Transport("Channel is closed".to_string()));
        }
        if !state.link_up || state.generation != self.generation {
            return Err(PeripageError::Transport("Link lost".to_string()));
        }
        Ok(())
    }
}

impl Channel for MockChannel {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.printer.lock();
        self.check_link(&state)?;

        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            state.link_up = false;
            return Err(PeripageError::Transport("Broken pipe".to_string()));
        }

        state.frames.push(data.to_vec());
        let answer = match state.next_answer.take() {
            Some(bytes) => Some(bytes),
            None if state.silent => None,
            None => state.device.answer(data),
        };
        if let Some(answer) = answer {
            state.pending.extend(answer);
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.printer.lock();
        self.check_link(&state)?;

        if state.pending.is_empty() {
            return Err(PeripageError::Timeout(timeout));
        }
        let n = max_len.min(state.read_chunk).min(state.pending.len()).max(1);
        Ok(state.pending.drain(..n).collect())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn open(printer: &MockPrinter) -> MockChannel {
        printer.connector().open("mock").unwrap()
    }

    #[test]
    fn test_records_frames() {
        let printer = MockPrinter::new();
        let mut channel = open(&printer);
        channel.write(&Command::PrintBreak(10).encode()).unwrap();
        assert_eq!(printer.frames(), vec![vec![0x1B, 0x4A, 10]]);
    }

    #[test]
    fn test_answers_battery_in_chunks() {
        let printer = MockPrinter::new();
        printer.set_read_chunk(1);
        let mut channel = open(&printer);
        channel.write(&Command::QueryBattery.encode()).unwrap();

        let timeout = Duration::from_millis(5);
        assert_eq!(channel.read(64, timeout).unwrap(), vec![0x00]);
        assert_eq!(channel.read(64, timeout).unwrap(), vec![84]);
        assert!(matches!(
            channel.read(64, timeout),
            Err(PeripageError::Timeout(_))
        ));
    }

    #[test]
    fn test_answer_next_overrides_one_reply() {
        let printer = MockPrinter::new();
        printer.answer_next(b"XY");
        let mut channel = open(&printer);
        channel.write(&Command::QueryBattery.encode()).unwrap();
        assert_eq!(channel.read(64, Duration::ZERO).unwrap(), b"XY".to_vec());

        channel.write(&Command::QueryBattery.encode()).unwrap();
        assert_eq!(channel.read(64, Duration::ZERO).unwrap(), vec![0x00, 84]);
    }

    #[test]
    fn test_set_serial_updates_device() {
        let printer = MockPrinter::new();
        let mut channel = open(&printer);
        channel
            .write(&Command::SetSerial("NEW123".into()).encode())
            .unwrap();
        assert_eq!(channel.read(64, Duration::ZERO).unwrap(), b"OK".to_vec());
        assert_eq!(printer.device().serial, "NEW123");
    }

    #[test]
    fn test_refused_connect() {
        let printer = MockPrinter::new();
        printer.refuse_connects(1);
        assert!(matches!(
            printer.connector().open("mock"),
            Err(PeripageError::Connection(_))
        ));
        assert!(printer.connector().open("mock").is_ok());
        assert_eq!(printer.connects(), 1);
    }

    #[test]
    fn test_dropped_link_fails_until_reopen() {
        let printer = MockPrinter::new();
        let mut channel = open(&printer);
        printer.drop_link();
        assert!(matches!(
            channel.write(&[0x00]),
            Err(PeripageError::Transport(_))
        ));

        let mut fresh = open(&printer);
        assert!(fresh.write(&[0x00]).is_ok());
        // The stale channel stays dead after the reconnect.
        assert!(channel.write(&[0x00]).is_err());
    }

    #[test]
    fn test_failed_write_drops_link() {
        let printer = MockPrinter::new();
        let mut channel = open(&printer);
        printer.fail_next_writes(1);
        assert!(channel.write(&[0x01]).is_err());
        assert!(!printer.is_link_up());
        assert!(printer.frames().is_empty());
    }
}
