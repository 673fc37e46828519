//! # Error Types
//!
//! This module defines error types used throughout the peripage library.
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | `Connection` | the transport could not be opened |
//! | `Transport` | an established link failed mid-operation |
//! | `Protocol` | response bytes do not match the expected shape |
//! | `Validation` | an argument violates a device constraint (no I/O was done) |
//! | `Timeout` | no response arrived within the read window |

use std::time::Duration;

use thiserror::Error;

/// Main error type for peripage operations
#[derive(Debug, Error)]
pub enum PeripageError {
    /// Transport could not be opened (device unreachable, link down)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Established link failed mid-operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response bytes do not match the expected shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Caller-supplied argument violates a device constraint
    #[error("Validation error: {0}")]
    Validation(String),

    /// No response within the allotted window
    #[error("Timed out after {0:?} waiting for the printer")]
    Timeout(Duration),

    /// Image decoding or raster conversion error
    #[error("Image error: {0}")]
    Image(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PeripageError {
    /// Whether this error means the link to the printer is gone or unusable.
    ///
    /// The print service reconnects on these; validation and protocol errors
    /// are deterministic and never trigger a reconnect.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Transport(_) | Self::Timeout(_) | Self::Io(_)
        )
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PeripageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_failure_classification() {
        assert!(PeripageError::Connection("down".into()).is_link_failure());
        assert!(PeripageError::Transport("reset by peer".into()).is_link_failure());
        assert!(PeripageError::Timeout(Duration::from_secs(1)).is_link_failure());
        assert!(!PeripageError::Protocol("garbage".into()).is_link_failure());
        assert!(!PeripageError::Validation("too long".into()).is_link_failure());
    }
}
