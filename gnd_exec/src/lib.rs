//! # Ground library.
//!
//! The driver station side of the teleoperation link. The executable in `main.rs` wires these
//! modules to a stand-in operator console reading commands from stdin.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Connection manager - hunts through the address pool and owns the live session
pub mod conn_mgr;

/// Driver station - mirrored robot state, ping timing and joystick send filtering
pub mod driver;

/// Ground executable parameters
pub mod params;

/// Telecommand sessions - one request/response connection to the robot per binding
pub mod tc_client;

/// Telemetry client - receives the robot's latest telemetry
pub mod tm_client;
