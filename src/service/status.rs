//! Observable print service state.

use std::fmt;

use serde::Serialize;

use super::task::TaskId;

/// Scheduling loop phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Waiting for the next task or ping
    Idle,
    /// Running one task
    Sending,
    /// Running a liveness query
    Pinging,
    /// No usable link yet, or link lost; connecting with backoff
    Reconnecting,
    /// Worker has exited
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Pinging => "pinging",
            Self::Reconnecting => "reconnecting",
            Self::Stopped => "stopped",
        })
    }
}

/// Snapshot served by [`PrintService::status`](super::PrintService::status).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub connected: bool,
    /// Tasks waiting to be dispatched
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
    /// Last battery reading from a ping
    pub battery: Option<u8>,
    pub last_error: Option<String>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            state: ServiceState::Reconnecting,
            connected: false,
            queued: 0,
            completed: 0,
            failed: 0,
            discarded: 0,
            battery: None,
            last_error: None,
        }
    }
}

/// Pushed to [`PrintService::subscribe`](super::PrintService::subscribe) receivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    StateChanged { state: ServiceState },
    TaskCompleted { id: TaskId },
    TaskFailed { id: TaskId, error: String },
    /// Dropped unsent because the service stopped
    TaskDiscarded { id: TaskId },
    Pinged { battery: u8 },
}

// ============================================================================
// TESTS
// ============================================================================
