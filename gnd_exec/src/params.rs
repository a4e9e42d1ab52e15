//! # Ground Executable Parameters
//!
//! This module provide parameters for the driver station executable, loaded from `gnd_exec.toml`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::time::Duration;

use comms_if::{codec::Binding, net::Address};
use util::time::secs_to_duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the driver station executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GndExecParams {
    /// Which wire binding the robot serves.
    pub binding: Binding,

    /// Robot command addresses, tried in order.
    pub addresses: Vec<Address>,

    /// Telemetry port on the same host as the command address, json binding only.
    pub tm_port: u16,

    /// Limit on a single connection attempt.
    pub connect_timeout_s: f64,

    /// Limit on waiting for a response to one telecommand.
    pub request_timeout_s: f64,

    /// Wait between connection attempts while no robot is connected.
    pub hunt_retry_s: f64,

    /// Wait between link checks while connected.
    pub connected_retry_s: f64,

    /// Period between pings while connected.
    pub ping_interval_s: f64,

    /// Smallest change of any axis which causes a new joystick frame to be sent.
    pub joystick_threshold: f64,

    /// Minimum log level, one of `trace`, `debug` or `info`.
    pub log_level: String
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for GndExecParams {
    fn default() -> Self {
        Self {
            binding: Binding::Json,
            addresses: vec![Address::new("127.0.0.1", 5555)],
            tm_port: 5556,
            connect_timeout_s: 1.0,
            request_timeout_s: 2.0,
            hunt_retry_s: 1.0,
            connected_retry_s: 0.5,
            ping_interval_s: 1.0,
            joystick_threshold: 0.01,
            log_level: String::from("info")
        }
    }
}

impl GndExecParams {
    pub fn connect_timeout(&self) -> Duration {
        secs_to_duration(self.connect_timeout_s)
    }

    pub fn request_timeout(&self) -> Duration {
        secs_to_duration(self.request_timeout_s)
    }

    pub fn hunt_retry(&self) -> Duration {
        secs_to_duration(self.hunt_retry_s)
    }

    pub fn connected_retry(&self) -> Duration {
        secs_to_duration(self.connected_retry_s)
    }

    pub fn ping_interval(&self) -> Duration {
        secs_to_duration(self.ping_interval_s)
    }

    /// Silence after which the link is shown as lost: one missed ping plus one request timeout.
    pub fn link_timeout(&self) -> Duration {
        self.ping_interval() + self.request_timeout()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
