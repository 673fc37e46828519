//! Server state and configuration.

use std::path::PathBuf;

use crate::printer::{DeviceSession, ProfileId};
use crate::render::DitheringAlgorithm;
use crate::service::{PrintService, ServiceConfig};
use crate::transport::Connector;

/// Default paper feed appended by `print_break=1`, in dots.
pub const DEFAULT_BREAK_SIZE: u8 = 100;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:11001")
    pub listen_addr: String,
    /// Printer MAC address or RFCOMM tty path
    pub address: String,
    /// Printer model
    pub profile: ProfileId,
    /// Required `secret` query parameter; `None` accepts every request
    pub secret: Option<String>,
    /// Paper feed after a job when `print_break` is set
    pub break_size: u8,
    /// Where received payloads are archived, if anywhere
    pub receive_dir: Option<PathBuf>,
    /// How uploaded images are reduced to 1-bit
    pub dithering: DitheringAlgorithm,
    /// Print service pacing
    pub service: ServiceConfig,
}

impl ServerConfig {
    pub fn new(address: impl Into<String>, profile: ProfileId) -> Self {
        Self {
            listen_addr: "0.0.0.0:11001".to_string(),
            address: address.into(),
            profile,
            secret: None,
            break_size: DEFAULT_BREAK_SIZE,
            receive_dir: None,
            dithering: DitheringAlgorithm::default(),
            service: ServiceConfig::default(),
        }
    }

    /// A disconnected session for the configured printer.
    pub fn session<C: Connector>(&self, connector: C) -> DeviceSession<C> {
        DeviceSession::new(connector, self.address.clone(), self.profile).with_dithering(self.dithering)
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub service: PrintService,
}

impl AppState {
    pub fn new(config: ServerConfig, service: PrintService) -> Self {
        Self { config, service }
    }

    /// Whether the request's secret matches the configured one.
    pub fn authorized(&self, secret: Option<&str>) -> bool {
        match &self.config.secret {
            Some(expected) => secret == Some(expected.as_str()),
            None => true,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
