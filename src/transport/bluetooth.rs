//! # Bluetooth RFCOMM Transport
//!
//! PeriPage printers expose a Serial Port Profile (SPP) on RFCOMM channel 1;
//! on Linux that is a `/dev/rfcommN` tty.
//!
//! ## Addresses
//!
//! The connector accepts either:
//!
//! - a tty path such as `/dev/rfcomm0`, opened directly, or
//! - a MAC address such as `00:15:83:15:BC:5F`, resolved to an existing
//!   binding from `/proc/net/rfcomm`, or bound with `rfcomm bind` when none
//!   exists yet.
//!
//! Pairing is still manual:
//!
//! ```bash
//! bluetoothctl scan on            # the printer shows up as "PeriPage+XXXX"
//! bluetoothctl pair 00:15:83:15:BC:5F
//! sudo rfcomm bind 0 00:15:83:15:BC:5F   # optional, the connector binds as root
//! ```
//!
//! The tty is switched to raw 8N1 with no echo, no line discipline, no
//! CR/LF translation and no XON/XOFF, since `0x11`/`0x13` occur in raster
//! rows. Reads wait with `poll(2)` so every read honours its timeout.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use super::{Channel, Connector};
use crate::error::{PeripageError, Result};

/// Bytes per write before pausing.
const CHUNK_SIZE: usize = 1024;

/// Pause between write chunks, in milliseconds.
const CHUNK_DELAY_MS: u64 = 2;

/// RFCOMM channel carrying SPP on PeriPage printers
const SPP_CHANNEL: u8 = 1;

/// # RFCOMM Connector
///
/// Opens [`RfcommChannel`]s by tty path or MAC address.
///
/// ## Example
///
/// ```no_run
/// use peripage::transport::{Connector, RfcommConnector};
///
/// let mut connector = RfcommConnector::default();
/// let channel = connector.open("00:15:83:15:BC:5F")?;
/// # Ok::<(), peripage::error::PeripageError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RfcommConnector {
    /// `/dev/rfcommN` index used when a new binding must be created
    pub bind_index: u8,
    /// Write chunk size in bytes
    pub chunk_size: usize,
    /// Delay between write chunks
    pub chunk_delay: Duration,
}

impl Default for RfcommConnector {
    fn default() -> Self {
        Self {
            bind_index: 0,
            chunk_size: CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        }
    }
}

impl RfcommConnector {
    /// Resolve an address to a tty path.
    fn resolve(&self, address: &str) -> Result<String> {
        if !is_valid_mac(address) {
            return Ok(address.to_string());
        }
        match find_rfcomm_for_mac(address)? {
            Some(path) => Ok(path),
            None => setup_rfcomm(address, self.bind_index),
        }
    }
}

impl Connector for RfcommConnector {
    type Channel = RfcommChannel;

    fn open(&mut self, address: &str) -> Result<RfcommChannel> {
        let path = self
            .resolve(address)
            .map_err(|e| PeripageError::Connection(e.to_string()))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| PeripageError::Connection(format!("Failed to open {}: {}", path, e)))?;

        configure_tty_raw(file.as_raw_fd())
            .map_err(|e| PeripageError::Connection(e.to_string()))?;

        tracing::debug!(address, path = %path, "RFCOMM channel open");

        Ok(RfcommChannel {
            file: Some(file),
            chunk_size: self.chunk_size,
            chunk_delay: self.chunk_delay,
        })
    }
}

/// # Bluetooth Printer Channel
///
/// One open RFCOMM tty in raw mode.
pub struct RfcommChannel {
    file: Option<File>,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl RfcommChannel {
    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| PeripageError::Transport("Channel is closed".to_string()))
    }
}

impl Channel for RfcommChannel {
    /// Small writes are sent directly. Large writes are chunked to avoid
    /// overflowing the Bluetooth buffer.
    fn write(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let chunk_size = self.chunk_size.max(1);
        let chunk_delay = self.chunk_delay;
        let file = self.file()?;

        if data.len() <= chunk_size {
            file.write_all(data)
                .map_err(|e| PeripageError::Transport(format!("Write failed: {}", e)))?;
        } else {
            for chunk in data.chunks(chunk_size) {
                file.write_all(chunk)
                    .map_err(|e| PeripageError::Transport(format!("Write failed: {}", e)))?;

                if !chunk_delay.is_zero() {
                    thread::sleep(chunk_delay);
                }
            }
        }

        file.flush()
            .map_err(|e| PeripageError::Transport(format!("Flush failed: {}", e)))
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let file = self.file()?;

        if !wait_readable(file.as_raw_fd(), timeout)? {
            return Err(PeripageError::Timeout(timeout));
        }

        let mut buf = vec![0u8; max_len.max(1)];
        let n = file
            .read(&mut buf)
            .map_err(|e| PeripageError::Transport(format!("Read failed: {}", e)))?;
        if n == 0 {
            return Err(PeripageError::Transport("Link closed by printer".to_string()));
        }
        buf.truncate(n);
        Ok(buf)
    }

    fn close(&mut self) {
        // Dropping the file closes the tty.
        self.file.take();
    }
}

/// Wait until `fd` is readable. Returns `false` on timeout.
#[cfg(unix)]
fn wait_readable(fd: i32, timeout: Duration) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = timeout.as_millis().min(i32::MAX as u128) as i32;

    let result = unsafe { libc::poll(&mut pfd, 1, millis) };
    if result < 0 {
        return Err(PeripageError::Transport(format!(
            "poll failed: {}",
            io::Error::last_os_error()
        )));
    }
    if result > 0 && pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(PeripageError::Transport("Link hung up".to_string()));
    }
    Ok(result > 0)
}

/// Switch the tty to raw 8N1 without flow control. Reads are gated by
/// `poll`, so `read` may return whatever is buffered (VMIN = VTIME = 0).
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> Result<()> {
    // SAFETY: termios is plain data; tcgetattr fills it before use.
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
        return Err(os_error("tcgetattr"));
    }

    unsafe { libc::cfmakeraw(&mut termios) };
    termios.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
    termios.c_cc[libc::VMIN] = 0;
    termios.c_cc[libc::VTIME] = 0;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(os_error("tcsetattr"));
    }
    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_fd: i32) -> Result<()> {
    Ok(())
}

fn os_error(call: &str) -> PeripageError {
    PeripageError::Transport(format!("{} failed: {}", call, io::Error::last_os_error()))
}

// ============================================================================
// RFCOMM SETUP HELPERS
// ============================================================================

/// `XX:XX:XX:XX:XX:XX`, either case.
pub fn is_valid_mac(mac: &str) -> bool {
    mac.len() == 17
        && mac
            .split(':')
            .all(|octet| octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Device path for `mac` in rfcomm's listing format
/// (`rfcomm0: XX:XX:XX:XX:XX:XX channel N ...`).
fn rfcomm_device_in_listing(listing: &str, mac: &str) -> Option<String> {
    let mac = mac.to_uppercase();
    listing.lines().find_map(|line| {
        let (device, rest) = line.split_once(':')?;
        rest.to_uppercase()
            .contains(&mac)
            .then(|| format!("/dev/{}", device.trim()))
    })
}

/// Existing `/dev/rfcommN` bound to `mac`, from `/proc/net/rfcomm` or,
/// failing that, `rfcomm -a`.
#[cfg(unix)]
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>> {
    let exists = |path: &String| Path::new(path).exists();

    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm")
        && let Some(path) = rfcomm_device_in_listing(&contents, mac).filter(exists)
    {
        return Ok(Some(path));
    }

    match Command::new("rfcomm").arg("-a").output() {
        Ok(output) => {
            let listing = String::from_utf8_lossy(&output.stdout);
            Ok(rfcomm_device_in_listing(&listing, mac).filter(exists))
        }
        Err(e) => {
            tracing::debug!(error = %e, "rfcomm -a unavailable");
            Ok(None)
        }
    }
}

#[cfg(not(unix))]
pub fn find_rfcomm_for_mac(_mac: &str) -> Result<Option<String>> {
    Ok(None)
}

/// Bind `/dev/rfcomm{index}` to `mac` and return its path.
///
/// Asks bluetoothctl to connect, checks the printer answers `l2ping`, then
/// runs `rfcomm bind`, which needs root.
#[cfg(unix)]
pub fn setup_rfcomm(mac: &str, index: u8) -> Result<String> {
    let mac = mac.to_uppercase();
    let device_path = format!("/dev/rfcomm{}", index);

    // Fails harmlessly when already connected; l2ping is the real check
    tracing::info!(%mac, "Connecting via bluetoothctl");
    let output = run("bluetoothctl", &["connect", &mac])?;
    if !output.status.success() {
        tracing::debug!(
            output = %String::from_utf8_lossy(&output.stdout).trim(),
            "bluetoothctl did not confirm connection"
        );
    }
    thread::sleep(SETUP_SETTLE);

    check(run("l2ping", &["-c", "1", &mac])?, &format!("{} not reachable", mac))?;

    tracing::info!(device = %device_path, "Binding RFCOMM");
    let index = index.to_string();
    let channel = SPP_CHANNEL.to_string();
    check(
        run("rfcomm", &["bind", &index, &mac, &channel])?,
        "rfcomm bind failed",
    )?;
    thread::sleep(SETUP_SETTLE);

    if Path::new(&device_path).exists() {
        Ok(device_path)
    } else {
        Err(PeripageError::Connection(format!(
            "{} did not appear after binding",
            device_path
        )))
    }
}

#[cfg(not(unix))]
pub fn setup_rfcomm(_mac: &str, _index: u8) -> Result<String> {
    Err(PeripageError::Connection(
        "RFCOMM binding needs BlueZ (Linux)".to_string(),
    ))
}

/// Wait after each Bluetooth setup step.
#[cfg(unix)]
const SETUP_SETTLE: Duration = Duration::from_millis(500);

#[cfg(unix)]
fn run(program: &str, args: &[&str]) -> Result<std::process::Output> {
    Command::new(program)
        .args(args)
        .output()
        .map_err(|e| PeripageError::Connection(format!("Failed to run {}: {}", program, e)))
}

#[cfg(unix)]
fn check(output: std::process::Output, context: &str) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(PeripageError::Connection(format!(
        "{}: {}",
        context,
        String::from_utf8_lossy(&output.stderr).trim()
    )))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_format() {
        for good in ["00:15:83:15:BC:5F", "00:15:83:15:bc:5f", "FF:FF:FF:FF:FF:FF"] {
            assert!(is_valid_mac(good), "{}", good);
        }
        for bad in [
            "",
            "/dev/rfcomm0",
            "00:15:83:15:BC",
            "00:15:83:15:BC:5F:00",
            "00-15-83-15-BC-5F",
            "0:015:83:15:BC:5F",
            "00:15:83:15:BC:5G",
        ] {
            assert!(!is_valid_mac(bad), "{}", bad);
        }
    }

    #[test]
    fn test_listing_lookup() {
        let listing = "rfcomm0: 00:15:83:15:BC:5F channel 1 clean\n\
                       rfcomm1: 11:22:33:44:55:66 channel 1 connected\n";
        assert_eq!(
            rfcomm_device_in_listing(listing, "00:15:83:15:bc:5f"),
            Some("/dev/rfcomm0".to_string())
        );
        assert_eq!(
            rfcomm_device_in_listing(listing, "11:22:33:44:55:66"),
            Some("/dev/rfcomm1".to_string())
        );
        assert_eq!(rfcomm_device_in_listing(listing, "AA:AA:AA:AA:AA:AA"), None);
    }

    #[test]
    fn test_path_address_is_not_resolved() {
        let connector = RfcommConnector::default();
        assert_eq!(connector.resolve("/dev/rfcomm3").unwrap(), "/dev/rfcomm3");
    }

    #[test]
    fn test_open_missing_device_is_connection_error() {
        let mut connector = RfcommConnector::default();
        let result = connector.open("/nonexistent/rfcomm-test");
        assert!(matches!(result, Err(PeripageError::Connection(_))));
    }
}
