//! # Rover library.
//!
//! This library allows other crates in the workspace to access items defined inside the rover
//! crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Global data store - the robot state shared between the server, watchdog and telemetry threads
pub mod data_store;

/// Equipment interfaces - the actuators and sensors the core drives and reads
pub mod eqpt;

/// Locomotion control module - converts joystick axes into individual wheel commands
pub mod loco_ctrl;

/// Mode manager - the STOPPED/AUTO/TELEOP state machine and its match clock
pub mod mode_mgr;

/// Rover executable parameters
pub mod params;

/// Telecommand processor - decodes and executes telecommands
pub mod tc_processor;

/// Telecommand servers - receive telecommands over either wire binding
pub mod tc_server;

/// Telemetry server - publishes the robot state
pub mod tm_server;

/// Watchdog - forces safe mode when the driver station goes silent
pub mod watchdog;
