//! # Mode manager
//!
//! Owns the robot's operating mode and the match clock. Operator commands change the mode
//! directly, the only transition taken without a command is AUTO running out into TELEOP.
//!
//! All time dependent methods take the current `Instant` so the clock can be simulated.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, warn};
use std::time::{Duration, Instant};

use comms_if::tc::RobotMode;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// How long AUTO lasts before handing over to TELEOP.
pub const AUTO_DURATION: Duration = Duration::from_secs(30);

/// Nominal length of TELEOP. Running past it only sets the overtime flag.
pub const TELEOP_DURATION: Duration = Duration::from_secs(210);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModeMgr {
    mode: RobotMode,

    /// When the current mode was entered, `None` while stopped.
    entered_at: Option<Instant>,

    /// Set once overtime has been reported for the current TELEOP period
    overtime_reported: bool
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Transitions made by the mode manager's own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeEvent {
    /// AUTO ran for its full duration and the robot is now in TELEOP.
    AutoEnded,

    /// TELEOP ran past its nominal duration. The mode is unchanged.
    OvertimeStarted
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ModeMgr {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeMgr {
    /// Create a new manager in `Stopped`.
    pub fn new() -> Self {
        Self {
            mode: RobotMode::Stopped,
            entered_at: None,
            overtime_reported: false
        }
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    /// Enter the given mode, restarting the clock.
    ///
    /// Entering `Stopped` stops the clock instead.
    pub fn set_mode(&mut self, mode: RobotMode, now: Instant) {
        if mode != self.mode {
            info!("Mode change: {} -> {}", self.mode, mode);
        }

        self.mode = mode;
        self.overtime_reported = false;
        self.entered_at = match mode {
            RobotMode::Stopped => None,
            _ => Some(now)
        };
    }

    /// Return to `Stopped` with the clock stopped.
    pub fn reset(&mut self) {
        if self.mode != RobotMode::Stopped {
            info!("Mode reset: {} -> {}", self.mode, RobotMode::Stopped);
        }

        self.mode = RobotMode::Stopped;
        self.entered_at = None;
        self.overtime_reported = false;
    }

    /// Advance the clock to `now`, making any timed transition that is due.
    ///
    /// Each event is returned once, on the first update that observes it.
    pub fn update(&mut self, now: Instant) -> Option<ModeEvent> {
        let elapsed = self.elapsed(now)?;

        match self.mode {
            RobotMode::Auto if elapsed >= AUTO_DURATION => {
                info!("AUTO period complete after {:.1} s, entering TELEOP", elapsed.as_secs_f64());
                self.mode = RobotMode::Teleop;
                self.entered_at = Some(now);
                self.overtime_reported = false;
                Some(ModeEvent::AutoEnded)
            },
            RobotMode::Teleop if elapsed > TELEOP_DURATION && !self.overtime_reported => {
                warn!("TELEOP is in overtime");
                self.overtime_reported = true;
                Some(ModeEvent::OvertimeStarted)
            },
            _ => None
        }
    }

    /// Seconds since the current mode was entered, `None` while stopped.
    pub fn clock_s(&self, now: Instant) -> Option<f64> {
        self.elapsed(now).map(|d| d.as_secs_f64())
    }

    /// True if TELEOP has run past its nominal duration.
    pub fn is_overtime(&self, now: Instant) -> bool {
        self.mode == RobotMode::Teleop
            && self.elapsed(now).map_or(false, |e| e > TELEOP_DURATION)
    }

    fn elapsed(&self, now: Instant) -> Option<Duration> {
        self.entered_at.map(|t| now.saturating_duration_since(t))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_starts_stopped() {
        let mgr = ModeMgr::new();
        let now = Instant::now();

        assert_eq!(mgr.mode(), RobotMode::Stopped);
        assert_eq!(mgr.clock_s(now), None);
        assert!(!mgr.is_overtime(now));
    }

    #[test]
    fn test_auto_hands_over_exactly_once() {
        let mut mgr = ModeMgr::new();
        let t0 = Instant::now();

        mgr.set_mode(RobotMode::Auto, t0);
        assert_eq!(mgr.update(t0 + Duration::from_secs(29)), None);
        assert_eq!(mgr.mode(), RobotMode::Auto);

        let t30 = t0 + AUTO_DURATION;
        assert_eq!(mgr.update(t30), Some(ModeEvent::AutoEnded));
        assert_eq!(mgr.mode(), RobotMode::Teleop);
        assert_eq!(mgr.clock_s(t30), Some(0.0));

        // No second transition
        assert_eq!(mgr.update(t30 + Duration::from_secs(1)), None);
        assert_eq!(mgr.mode(), RobotMode::Teleop);
        assert_eq!(mgr.clock_s(t30 + Duration::from_secs(1)), Some(1.0));
    }

    #[test]
    fn test_late_update_still_transitions() {
        let mut mgr = ModeMgr::new();
        let t0 = Instant::now();

        mgr.set_mode(RobotMode::Auto, t0);
        let late = t0 + Duration::from_secs(45);
        assert_eq!(mgr.update(late), Some(ModeEvent::AutoEnded));
        assert_eq!(mgr.clock_s(late), Some(0.0));
    }

    #[test]
    fn test_teleop_overtime() {
        let mut mgr = ModeMgr::new();
        let t0 = Instant::now();

        mgr.set_mode(RobotMode::Teleop, t0);
        assert_eq!(mgr.update(t0 + TELEOP_DURATION), None);
        assert!(!mgr.is_overtime(t0 + TELEOP_DURATION));

        let over = t0 + TELEOP_DURATION + Duration::from_secs(1);
        assert_eq!(mgr.update(over), Some(ModeEvent::OvertimeStarted));
        assert!(mgr.is_overtime(over));
        assert_eq!(mgr.mode(), RobotMode::Teleop);

        // Reported once, clock keeps running
        let later = over + Duration::from_secs(100);
        assert_eq!(mgr.update(later), None);
        assert_eq!(mgr.clock_s(later), Some(311.0));
    }

    #[test]
    fn test_set_mode_restarts_clock() {
        let mut mgr = ModeMgr::new();
        let t0 = Instant::now();

        mgr.set_mode(RobotMode::Teleop, t0);
        let t1 = t0 + Duration::from_secs(10);
        mgr.set_mode(RobotMode::Teleop, t1);
        assert_eq!(mgr.clock_s(t1), Some(0.0));

        mgr.set_mode(RobotMode::Stopped, t1);
        assert_eq!(mgr.clock_s(t1 + Duration::from_secs(5)), None);
        assert_eq!(mgr.update(t1 + Duration::from_secs(500)), None);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut mgr = ModeMgr::new();
        let t0 = Instant::now();

        mgr.set_mode(RobotMode::Auto, t0);
        mgr.reset();
        assert_eq!(mgr.mode(), RobotMode::Stopped);
        mgr.reset();
        assert_eq!(mgr.mode(), RobotMode::Stopped);
        assert_eq!(mgr.clock_s(t0), None);
    }
}
