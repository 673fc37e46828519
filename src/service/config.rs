//! Print service timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Print service pacing, in seconds.
///
/// The printer overheats and drops buffered data when driven too hard, and
/// the link sleeps when left idle; these intervals trade throughput for a
/// printer that keeps up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Liveness query (battery) interval
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: f64,
    /// Minimum spacing between dispatched tasks
    #[serde(default = "default_task_interval")]
    pub task_interval_secs: f64,
    /// Delay before each reconnect attempt
    #[serde(default = "default_reconnect_wait")]
    pub reconnect_wait_secs: f64,
    /// Settle time after a successful (re)connect
    #[serde(default = "default_post_connect_wait")]
    pub post_connect_wait_secs: f64,
}

fn default_ping_interval() -> f64 {
    60.0
}
fn default_task_interval() -> f64 {
    1.0
}
fn default_reconnect_wait() -> f64 {
    5.0
}
fn default_post_connect_wait() -> f64 {
    1.0
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            task_interval_secs: default_task_interval(),
            reconnect_wait_secs: default_reconnect_wait(),
            post_connect_wait_secs: default_post_connect_wait(),
        }
    }
}

impl ServiceConfig {
    pub fn from_secs(ping: f64, task: f64, reconnect: f64, post_connect: f64) -> Self {
        Self {
            ping_interval_secs: ping,
            task_interval_secs: task,
            reconnect_wait_secs: reconnect,
            post_connect_wait_secs: post_connect,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        secs(self.ping_interval_secs)
    }

    pub fn task_interval(&self) -> Duration {
        secs(self.task_interval_secs)
    }

    pub fn reconnect_wait(&self) -> Duration {
        secs(self.reconnect_wait_secs)
    }

    pub fn post_connect_wait(&self) -> Duration {
        secs(self.post_connect_wait_secs)
    }
}

/// Negative, NaN and absurd values collapse to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
