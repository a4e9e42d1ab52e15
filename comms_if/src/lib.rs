//! # Communications interface crate.
//!
//! Provides all common communications interfaces shared by the robot and the driver station.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Telecommands sent from the driver station to the robot, and the robot's responses to them.
pub mod tc;

/// Telemetry published by the robot.
pub mod tm;

/// Command and response definitions for equipment (like the drive motors)
pub mod eqpt;

/// Wire adapters which turn telecommands and responses into bytes and back.
pub mod codec;

/// Contact tracking used to detect a silent peer.
pub mod heartbeat;

/// Network module
pub mod net;
