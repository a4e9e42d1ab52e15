//! # Robot Executable Parameters
//!
//! This module provide parameters for the robot executable, loaded from `rov_exec.toml`.

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

/// Parameters for the robot executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RovExecParams {
    /// Which wire binding the robot serves.
    pub binding: Binding,

    /// ZMQ endpoint the command (REP) socket binds to, json binding only.
    pub tc_endpoint: String,

    /// ZMQ endpoint the telemetry (PUB) socket binds to, json binding only.
    pub tm_endpoint: String,

    /// Address the command listener binds to, line binding only.
    pub line_listen_addr: Address,

    /// Silence after which the link is considered lost.
    pub heartbeat_timeout_s: f64,

    /// Period of the watchdog poll.
    pub watchdog_period_s: f64,

    /// Period between telemetry packets.
    pub tm_period_s: f64,

    /// Period of the main control cycle, which advances the match clock.
    pub cycle_period_s: f64,

    /// Minimum log level, one of `trace`, `debug` or `info`.
    pub log_level: String
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for RovExecParams {
    fn default() -> Self {
        Self {
            binding: Binding::Json,
            tc_endpoint: String::from("tcp://*:5555"),
            tm_endpoint: String::from("tcp://*:5556"),
            line_listen_addr: Address::new("0.0.0.0", 5000),
            heartbeat_timeout_s: 1.5,
            watchdog_period_s: 0.1,
            tm_period_s: 0.1,
            cycle_period_s: 0.1,
            log_level: String::from("info")
        }
    }
}

impl RovExecParams {
    pub fn heartbeat_timeout(&self) -> Duration {
        secs_to_duration(self.heartbeat_timeout_s)
    }

    pub fn watchdog_period(&self) -> Duration {
        secs_to_duration(self.watchdog_period_s)
    }

    pub fn tm_period(&self) -> Duration {
        secs_to_duration(self.tm_period_s)
    }

    pub fn cycle_period(&self) -> Duration {
        secs_to_duration(self.cycle_period_s)
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let params: RovExecParams = util::params::from_str(r#"
            binding = "line"
            line_listen_addr = "127.0.0.1:6000"
            heartbeat_timeout_s = 0.75
        "#).unwrap();

        assert_eq!(params.binding, Binding::Line);
        assert_eq!(params.line_listen_addr, Address::new("127.0.0.1", 6000));
        assert_eq!(params.heartbeat_timeout(), Duration::from_millis(750));
        assert_eq!(params.tc_endpoint, "tcp://*:5555");
        assert_eq!(params.watchdog_period(), Duration::from_millis(100));
    }
}
