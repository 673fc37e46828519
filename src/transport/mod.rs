//! # Printer Transport Layer
//!
//! This module provides the byte-stream boundary the protocol engine talks
//! through. The engine only needs an ordered, reliable stream:
//!
//! - [`Connector::open`] turns an address into a [`Channel`]
//! - [`Channel::write`] / [`Channel::read`] move bytes
//! - [`Channel::close`] releases the link
//!
//! ## Available Transports
//!
//! - [`bluetooth`]: Bluetooth RFCOMM for wireless printing (Linux)
//! - [`mock`]: In-memory printer for tests

pub mod bluetooth;
pub mod mock;

use std::time::Duration;

use crate::error::Result;

pub use bluetooth::{RfcommChannel, RfcommConnector};
pub use mock::{MockConnector, MockDevice, MockPrinter};

/// An open byte channel to one printer.
pub trait Channel: Send {
    /// Write all bytes.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read up to `max_len` bytes, waiting at most `timeout`.
    ///
    /// Returns `PeripageError::Timeout` when nothing arrived in time and
    /// `PeripageError::Transport` when the link is gone.
    fn read(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Close the link. Closing twice is a no-op.
    fn close(&mut self);
}

/// Opens channels to printers by address.
pub trait Connector: Send {
    type Channel: Channel;

    /// Open a channel, failing with `PeripageError::Connection` when the
    /// device cannot be reached.
    fn open(&mut self, address: &str) -> Result<Self::Channel>;
}
