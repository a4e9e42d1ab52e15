//! # Equipment interfaces
//!
//! The robot core never talks to motor or sensor hardware directly. Demands go out through an
//! [`Actuator`] and raw readings come in through a [`SensorSource`], both supplied by whoever
//! builds the [`DataStore`](crate::data_store::DataStore).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::debug;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex}
};

use comms_if::eqpt::mech::MechDems;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can be driven with motor speed demands.
pub trait Actuator: Send {
    /// Apply the given demands. Called once per forwarded demand, never for discarded ones.
    fn actuate(&mut self, dems: &MechDems);
}

/// Something which provides raw sensor readings for telemetry.
///
/// The readings are opaque to the robot, they are only passed through.
pub trait SensorSource: Send {
    fn battery(&mut self) -> Option<f64>;

    fn sensors(&mut self) -> HashMap<String, serde_json::Value>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Actuator which only logs the demands it is given.
#[derive(Debug, Default)]
pub struct LogActuator;

/// Actuator which keeps every demand it is given, for inspection by tests and simulations.
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    record: Arc<Mutex<Vec<MechDems>>>
}

/// Sensor source with nothing attached.
#[derive(Debug, Default)]
pub struct NoSensors;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Actuator for LogActuator {
    fn actuate(&mut self, dems: &MechDems) {
        debug!("Drive demands: {:?}", dems.drv_speed);
    }
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the record, shared with every clone of this actuator.
    pub fn record(&self) -> Arc<Mutex<Vec<MechDems>>> {
        self.record.clone()
    }

    /// Copy of every demand received so far.
    pub fn demands(&self) -> Vec<MechDems> {
        self.record.lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Actuator for RecordingActuator {
    fn actuate(&mut self, dems: &MechDems) {
        self.record.lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*dems);
    }
}

impl SensorSource for NoSensors {
    fn battery(&mut self) -> Option<f64> {
        None
    }

    fn sensors(&mut self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }
}
