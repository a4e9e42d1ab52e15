//! # Data Store
//!
//! The robot's shared state. One instance is created by the executable and handed to the
//! dispatcher, watchdog and telemetry publisher behind a [`SharedDataStore`].
//!
//! Every path that changes what the motors are doing goes through this store, so the rules about
//! when output may be forwarded live in one place:
//!
//! - Kinematics output is forwarded only in TELEOP and only outside safe mode.
//! - Entering safe mode, leaving TELEOP and resetting all forward the zero vector.
//! - Leaving safe mode never resumes motion, a fresh joystick command is needed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant
};

use comms_if::{
    eqpt::mech::MechDems,
    tc::{AxisFrame, ButtonAction, RobotMode},
    tm::ButtonEvent
};

use crate::{
    eqpt::Actuator,
    loco_ctrl,
    mode_mgr::{ModeEvent, ModeMgr}
};

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Gives the reason the robot has been put into safe mode
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum SafeModeCause {
    /// Nothing has been heard from the driver station within the heartbeat timeout.
    HeartbeatLost,

    /// The executable is shutting down.
    Shutdown
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The data store shared between the robot's threads.
pub type SharedDataStore = Arc<Mutex<DataStore>>;

/// Global data store for the executable.
pub struct DataStore {
    // Mode
    pub mode_mgr: ModeMgr,

    // Safe mode variables
    /// Determines if the robot is in safe mode.
    pub safe: bool,

    /// Gives the reason for the robot being in safe mode.
    pub safe_cause: Option<SafeModeCause>,

    // LocoCtrl
    /// The last demands handed to the actuator.
    pub loco_ctrl_output: MechDems,
    pub loco_ctrl_status_rpt: loco_ctrl::StatusReport,

    // Buttons
    pub last_button: Option<ButtonEvent>,

    actuator: Box<dyn Actuator>
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl DataStore {
    /// Create a new store driving the given actuator.
    ///
    /// The store starts in `Stopped` and in safe mode, since no driver station has been heard
    /// from yet.
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self {
            mode_mgr: ModeMgr::new(),
            safe: true,
            safe_cause: Some(SafeModeCause::HeartbeatLost),
            loco_ctrl_output: MechDems::zero(),
            loco_ctrl_status_rpt: loco_ctrl::StatusReport::default(),
            last_button: None,
            actuator
        }
    }

    /// Wrap the store for sharing between threads.
    pub fn into_shared(self) -> SharedDataStore {
        Arc::new(Mutex::new(self))
    }

    pub fn mode(&self) -> RobotMode {
        self.mode_mgr.mode()
    }

    /// Puts the robot into safe mode with the given cause.
    ///
    /// The zero vector is forwarded to the actuator regardless of the current mode. A `Shutdown`
    /// cause replaces any earlier one, so a restored link cannot clear it.
    pub fn make_safe(&mut self, cause: SafeModeCause) {
        if !self.safe {
            warn!("Make safe requested, cause: {}", cause);
            self.safe = true;
            self.safe_cause = Some(cause);
            self.zero_output();
            return
        }

        if cause == SafeModeCause::Shutdown && self.safe_cause != Some(cause) {
            warn!("Already safe ({:?}), cause is now: {}", self.safe_cause, cause);
            self.safe_cause = Some(cause);
        }

        if !self.loco_ctrl_output.is_zero() {
            self.zero_output();
        }
    }

    /// Attempts to disable the safe mode by clearing the given cause.
    ///
    /// Returns `Ok(())` if safe mode was disabled, or was not enabled. If safe mode was entered for
    /// a different reason the root cause is returned as the error and the robot stays safe.
    ///
    /// Output stays at zero until the next joystick command.
    pub fn make_unsafe(&mut self, cause: SafeModeCause) -> Result<(), SafeModeCause> {
        if !self.safe {
            return Ok(())
        }

        match self.safe_cause {
            Some(root_cause) if root_cause != cause => Err(root_cause),
            _ => {
                self.safe = false;
                self.safe_cause = None;
                info!("Make unsafe requested, root cause match, safe mode disabled");
                Ok(())
            }
        }
    }

    /// Change mode. Leaving TELEOP forwards the zero vector.
    pub fn set_mode(&mut self, mode: RobotMode, now: Instant) {
        let was_teleop = self.mode() == RobotMode::Teleop;

        self.mode_mgr.set_mode(mode, now);

        if was_teleop && mode != RobotMode::Teleop {
            self.zero_output();
        }
    }

    /// Return to `Stopped` and force the output to zero.
    pub fn reset(&mut self) {
        self.mode_mgr.reset();
        self.zero_output();
    }

    /// Run locomotion control on a joystick frame.
    ///
    /// The speeds are always computed, but only forwarded to the actuator in TELEOP outside safe
    /// mode. Returns `true` if they were forwarded.
    pub fn apply_drive(&mut self, frame: &AxisFrame) -> bool {
        let (dems, status_rpt) = loco_ctrl::proc(&frame.clamped());
        self.loco_ctrl_status_rpt = status_rpt;

        if self.mode() != RobotMode::Teleop {
            trace!("Discarding drive demands in {}", self.mode());
            return false
        }

        if self.safe {
            debug!("Discarding drive demands while safe ({:?})", self.safe_cause);
            return false
        }

        self.loco_ctrl_output = dems;
        self.actuator.actuate(&dems);
        true
    }

    pub fn record_button(&mut self, id: u32, action: ButtonAction) {
        info!("Button {} {}", id, action.as_str());
        self.last_button = Some(ButtonEvent { id, action });
    }

    /// Perform the periodic processing, advancing the match clock.
    pub fn update(&mut self, now: Instant) -> Option<ModeEvent> {
        // AUTO never forwards, so the hand over to TELEOP needs no zeroing
        self.mode_mgr.update(now)
    }

    fn zero_output(&mut self) {
        self.loco_ctrl_output = MechDems::zero();
        self.actuator.actuate(&self.loco_ctrl_output);
    }
}

impl fmt::Display for SafeModeCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafeModeCause::HeartbeatLost => write!(f, "HeartbeatLost"),
            SafeModeCause::Shutdown => write!(f, "Shutdown")
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Lock the shared store.
///
/// A poisoned lock is recovered rather than propagated, the watchdog must always be able to zero
/// the output.
pub fn lock(ds: &SharedDataStore) -> MutexGuard<'_, DataStore> {
    ds.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{eqpt::RecordingActuator, mode_mgr::AUTO_DURATION};

    fn store() -> (DataStore, RecordingActuator) {
        let act = RecordingActuator::new();
        (DataStore::new(Box::new(act.clone())), act)
    }

    fn live_teleop() -> (DataStore, RecordingActuator) {
        let (mut ds, act) = store();
        ds.make_unsafe(SafeModeCause::HeartbeatLost).unwrap();
        ds.set_mode(RobotMode::Teleop, Instant::now());
        (ds, act)
    }

    #[test]
    fn test_starts_safe_and_stopped() {
        let (mut ds, act) = store();

        assert!(ds.safe);
        assert_eq!(ds.safe_cause, Some(SafeModeCause::HeartbeatLost));
        assert_eq!(ds.mode(), RobotMode::Stopped);

        ds.set_mode(RobotMode::Teleop, Instant::now());
        assert!(!ds.apply_drive(&AxisFrame::new(0.0, 0.5, 0.0, 0.0)));
        assert!(act.demands().is_empty());
    }

    #[test]
    fn test_forwards_only_in_teleop() {
        let (mut ds, act) = live_teleop();

        assert!(ds.apply_drive(&AxisFrame::new(0.0, 0.5, 0.0, 0.0)));
        assert_eq!(act.demands(), vec![MechDems { drv_speed: [0.5; 4] }]);

        // Leaving TELEOP zeroes once
        ds.set_mode(RobotMode::Stopped, Instant::now());
        assert_eq!(act.demands().last(), Some(&MechDems::zero()));
        let count = act.demands().len();

        // Computed but not forwarded
        assert!(!ds.apply_drive(&AxisFrame::new(0.0, 0.5, 0.0, 0.0)));
        assert_eq!(act.demands().len(), count);
        assert_eq!(ds.loco_ctrl_output, MechDems::zero());
    }

    #[test]
    fn test_input_is_clamped() {
        let (mut ds, act) = live_teleop();

        ds.apply_drive(&AxisFrame::new(0.0, 5.0, 0.0, 0.0));
        assert_eq!(act.demands(), vec![MechDems { drv_speed: [1.0; 4] }]);
        assert!(!ds.loco_ctrl_status_rpt.normalised);
    }

    #[test]
    fn test_make_safe_zeroes_and_unsafe_does_not_resume() {
        let (mut ds, act) = live_teleop();

        ds.apply_drive(&AxisFrame::new(0.3, 0.3, 0.0, 0.0));
        ds.make_safe(SafeModeCause::HeartbeatLost);

        assert!(ds.safe);
        assert_eq!(ds.loco_ctrl_output, MechDems::zero());
        assert_eq!(act.demands().last(), Some(&MechDems::zero()));

        let count = act.demands().len();
        ds.make_unsafe(SafeModeCause::HeartbeatLost).unwrap();
        assert!(!ds.safe);
        assert_eq!(act.demands().len(), count);
        assert_eq!(ds.loco_ctrl_output, MechDems::zero());
    }

    #[test]
    fn test_make_unsafe_requires_matching_cause() {
        let (mut ds, _) = live_teleop();

        ds.make_safe(SafeModeCause::Shutdown);
        assert_eq!(
            ds.make_unsafe(SafeModeCause::HeartbeatLost),
            Err(SafeModeCause::Shutdown)
        );
        assert!(ds.safe);

        // A second cause does not replace the first
        ds.make_safe(SafeModeCause::HeartbeatLost);
        assert_eq!(ds.safe_cause, Some(SafeModeCause::Shutdown));
    }

    #[test]
    fn test_shutdown_overrides_lost_link() {
        // Safe from start up because nothing has been heard yet
        let (mut ds, _) = store();

        ds.make_safe(SafeModeCause::Shutdown);
        assert_eq!(ds.safe_cause, Some(SafeModeCause::Shutdown));

        // A late watchdog restore leaves the robot safe
        assert_eq!(
            ds.make_unsafe(SafeModeCause::HeartbeatLost),
            Err(SafeModeCause::Shutdown)
        );
        assert!(ds.safe);
    }

    #[test]
    fn test_auto_discards_drive() {
        let (mut ds, act) = store();
        ds.make_unsafe(SafeModeCause::HeartbeatLost).unwrap();

        let t0 = Instant::now();
        ds.set_mode(RobotMode::Auto, t0);

        assert!(!ds.apply_drive(&AxisFrame::new(0.0, 0.8, 0.0, 0.0)));
        assert!(act.demands().is_empty());
        assert_eq!(ds.loco_ctrl_output, MechDems::zero());
    }

    #[test]
    fn test_auto_handover_keeps_output_zero() {
        let (mut ds, act) = store();
        ds.make_unsafe(SafeModeCause::HeartbeatLost).unwrap();

        let t0 = Instant::now();
        ds.set_mode(RobotMode::Auto, t0);
        ds.apply_drive(&AxisFrame::new(0.5, 0.5, 0.0, 0.0));

        assert_eq!(ds.update(t0 + AUTO_DURATION), Some(ModeEvent::AutoEnded));
        assert_eq!(ds.mode(), RobotMode::Teleop);

        // The frame sent during AUTO is not replayed by the hand over
        assert!(act.demands().is_empty());
        assert_eq!(ds.loco_ctrl_output, MechDems::zero());

        assert!(ds.apply_drive(&AxisFrame::new(0.0, 0.5, 0.0, 0.0)));
        assert_eq!(act.demands(), vec![MechDems { drv_speed: [0.5; 4] }]);
    }

    #[test]
    fn test_reset_twice() {
        let (mut ds, act) = live_teleop();

        ds.apply_drive(&AxisFrame::new(0.0, 1.0, 0.0, 0.0));
        ds.reset();
        assert_eq!(ds.mode(), RobotMode::Stopped);
        ds.reset();
        assert_eq!(ds.mode(), RobotMode::Stopped);

        let dems = act.demands();
        assert_eq!(dems.len(), 3);
        assert_eq!(dems[1], MechDems::zero());
        assert_eq!(dems[2], MechDems::zero());
    }

    #[test]
    fn test_record_button() {
        let (mut ds, _) = store();

        ds.record_button(3, ButtonAction::Down);
        assert_eq!(ds.last_button, Some(ButtonEvent { id: 3, action: ButtonAction::Down }));
    }
}
