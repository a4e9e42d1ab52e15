//! # Watchdog
//!
//! Polls the heartbeat monitor on a fixed period, independently of message arrival. Loss of
//! contact puts the data store into safe mode, which zeroes the actuator output within one poll of
//! the heartbeat timeout expiring.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, warn};
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};

use comms_if::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use util::shutdown::ShutdownSignal;

use crate::data_store::{self, SafeModeCause, SharedDataStore};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Run a single watchdog poll at `now`, returning the link event found, if any.
pub fn poll_once(
    hb: &HeartbeatMonitor,
    ds: &SharedDataStore,
    now: Instant
) -> Option<HeartbeatEvent> {
    let event = hb.check_at(now);

    match event {
        Some(HeartbeatEvent::Lost { silence }) => {
            match silence {
                Some(s) => warn!("Link lost, nothing heard for {:.2} s", s.as_secs_f64()),
                None => warn!("Link lost, never heard from the driver station")
            }
            data_store::lock(ds).make_safe(SafeModeCause::HeartbeatLost);
        },
        Some(HeartbeatEvent::Restored) => {
            info!("Link restored");
            if let Err(cause) = data_store::lock(ds).make_unsafe(SafeModeCause::HeartbeatLost) {
                info!("Staying in safe mode, cause: {}", cause);
            }
        },
        None => ()
    }

    event
}

/// Spawn the watchdog thread.
///
/// The thread polls every `period` until `shutdown` is triggered.
pub fn spawn(
    hb: Arc<HeartbeatMonitor>,
    ds: SharedDataStore,
    period: Duration,
    shutdown: ShutdownSignal
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("watchdog".into())
        .spawn(move || {
            info!(
                "Watchdog started, timeout {:?}, period {:?}",
                hb.timeout(), period
            );

            while !shutdown.wait_timeout(period) {
                poll_once(&hb, &ds, Instant::now());
            }

            info!("Watchdog stopped");
        })
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::{
        eqpt::mech::MechDems,
        tc::{AxisFrame, RobotMode}
    };
    use util::shutdown::join_bounded;
    use crate::{data_store::DataStore, eqpt::RecordingActuator};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn setup() -> (Arc<HeartbeatMonitor>, SharedDataStore, RecordingActuator) {
        let act = RecordingActuator::new();
        let ds = DataStore::new(Box::new(act.clone())).into_shared();
        (Arc::new(HeartbeatMonitor::new(TIMEOUT)), ds, act)
    }

    #[test]
    fn test_loss_zeroes_output() {
        let (hb, ds, act) = setup();
        let t0 = Instant::now();

        // Contact clears safe mode on the next poll
        hb.touch_at(t0);
        assert_eq!(poll_once(&hb, &ds, t0), Some(HeartbeatEvent::Restored));
        assert!(!data_store::lock(&ds).safe);

        {
            let mut ds = data_store::lock(&ds);
            ds.set_mode(RobotMode::Teleop, t0);
            assert!(ds.apply_drive(&AxisFrame::new(0.0, 1.0, 0.0, 0.0)));
        }

        // Still inside the timeout
        assert_eq!(poll_once(&hb, &ds, t0 + TIMEOUT), None);
        assert_eq!(data_store::lock(&ds).loco_ctrl_output, MechDems { drv_speed: [1.0; 4] });

        let event = poll_once(&hb, &ds, t0 + TIMEOUT + Duration::from_millis(100));
        assert!(matches!(event, Some(HeartbeatEvent::Lost { silence: Some(_) })));

        let ds = data_store::lock(&ds);
        assert!(ds.safe);
        assert_eq!(ds.safe_cause, Some(SafeModeCause::HeartbeatLost));
        assert_eq!(ds.loco_ctrl_output, MechDems::zero());
        assert_eq!(act.demands().last(), Some(&MechDems::zero()));
    }

    #[test]
    fn test_restore_does_not_resume_motion() {
        let (hb, ds, act) = setup();
        let t0 = Instant::now();

        hb.touch_at(t0);
        poll_once(&hb, &ds, t0);
        {
            let mut ds = data_store::lock(&ds);
            ds.set_mode(RobotMode::Teleop, t0);
            ds.apply_drive(&AxisFrame::new(0.0, 1.0, 0.0, 0.0));
        }
        poll_once(&hb, &ds, t0 + Duration::from_secs(1));
        let count = act.demands().len();

        let t1 = t0 + Duration::from_secs(2);
        hb.touch_at(t1);
        assert_eq!(poll_once(&hb, &ds, t1), Some(HeartbeatEvent::Restored));

        assert!(!data_store::lock(&ds).safe);
        assert_eq!(act.demands().len(), count);
        assert_eq!(data_store::lock(&ds).loco_ctrl_output, MechDems::zero());
    }

    #[test]
    fn test_thread_zeroes_within_bound() {
        let (_, ds, act) = setup();
        let shutdown = ShutdownSignal::new();
        let period = Duration::from_millis(20);
        let timeout = Duration::from_millis(100);
        let hb = Arc::new(HeartbeatMonitor::new(timeout));

        let jh = spawn(hb.clone(), ds.clone(), period, shutdown.clone()).unwrap();

        // Bring the link up and start driving
        hb.touch();
        let start = Instant::now();
        while data_store::lock(&ds).safe {
            assert!(start.elapsed() < Duration::from_secs(2), "link never restored");
            hb.touch();
            thread::sleep(Duration::from_millis(5));
        }
        {
            let mut ds = data_store::lock(&ds);
            ds.set_mode(RobotMode::Teleop, Instant::now());
            assert!(ds.apply_drive(&AxisFrame::new(0.0, 0.5, 0.0, 0.0)));
        }

        // Go silent
        let silent_at = Instant::now();
        while !data_store::lock(&ds).safe {
            assert!(silent_at.elapsed() < Duration::from_secs(2), "watchdog never fired");
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(act.demands().last(), Some(&MechDems::zero()));

        shutdown.trigger();
        assert!(join_bounded("watchdog", jh, Duration::from_secs(1)).is_some());
    }
}
