//! # Heartbeat Monitor
//!
//! Tracks when a peer was last heard from. Any thread which observes fresh contact calls
//! [`HeartbeatMonitor::touch`], while a single polling thread calls [`HeartbeatMonitor::check`] to
//! find out whether the link has just been lost or restored.
//!
//! The monitor starts out lost, a peer has to prove it is alive before anything is trusted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::Mutex,
    time::{Duration, Instant}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Thread safe record of the last contact with a peer.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    timeout: Duration,

    state: Mutex<HeartbeatState>
}

/// Snapshot of the heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatState {
    /// The last time contact was observed, `None` if there has never been any.
    pub last_contact: Option<Instant>,

    /// Whether the link is currently flagged as lost.
    pub lost: bool
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A change in the link state found by [`HeartbeatMonitor::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Nothing has been heard for longer than the timeout.
    Lost {
        /// How long the peer has been silent, `None` if it was never heard from.
        silence: Option<Duration>
    },

    /// Contact has been observed again after the link was lost.
    Restored
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HeartbeatMonitor {
    /// Create a new monitor which considers the link lost after `timeout` without contact.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Mutex::new(HeartbeatState {
                last_contact: None,
                lost: true
            })
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record contact with the peer now.
    pub fn touch(&self) {
        self.touch_at(Instant::now())
    }

    /// Record contact with the peer at the given instant.
    ///
    /// Only moves the last contact forward, an older instant is ignored. The lost flag is left
    /// alone, it is only ever changed by [`check_at`](Self::check_at).
    pub fn touch_at(&self, now: Instant) {
        let mut state = self.lock();

        match state.last_contact {
            Some(last) if last >= now => (),
            _ => state.last_contact = Some(now)
        }
    }

    /// Re-evaluate the link state now.
    pub fn check(&self) -> Option<HeartbeatEvent> {
        self.check_at(Instant::now())
    }

    /// Re-evaluate the link state at the given instant.
    ///
    /// Returns an event only when the lost flag changes. Afterwards `lost` is true if and only if
    /// more than the timeout has passed since the last contact (or there never was any).
    pub fn check_at(&self, now: Instant) -> Option<HeartbeatEvent> {
        let mut state = self.lock();

        let silence = state.last_contact
            .map(|last| now.saturating_duration_since(last));

        let expired = match silence {
            Some(s) => s > self.timeout,
            None => true
        };

        match (state.lost, expired) {
            (false, true) => {
                state.lost = true;
                Some(HeartbeatEvent::Lost { silence })
            },
            (true, false) => {
                state.lost = false;
                Some(HeartbeatEvent::Restored)
            },
            _ => None
        }
    }

    /// Whether the link was flagged as lost by the last check.
    pub fn is_lost(&self) -> bool {
        self.lock().lost
    }

    pub fn last_contact(&self) -> Option<Instant> {
        self.lock().last_contact
    }

    pub fn snapshot(&self) -> HeartbeatState {
        *self.lock()
    }

    /// Forget all contact, returning the monitor to the lost state.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.last_contact = None;
        state.lost = true;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeartbeatState> {
        // The state is plain data so it is always consistent, even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(1500);

    #[test]
    fn test_starts_lost() {
        let hb = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();

        assert!(hb.is_lost());
        assert_eq!(hb.last_contact(), None);

        // No contact yet so checking changes nothing
        assert_eq!(hb.check_at(t0), None);
        assert!(hb.is_lost());
    }

    #[test]
    fn test_restore_then_lose() {
        let hb = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();

        hb.touch_at(t0);
        // Touch alone does not clear the flag
        assert!(hb.is_lost());

        assert_eq!(hb.check_at(t0 + Duration::from_millis(100)), Some(HeartbeatEvent::Restored));
        assert!(!hb.is_lost());

        // Exactly at the timeout is still alive
        assert_eq!(hb.check_at(t0 + TIMEOUT), None);

        let late = t0 + TIMEOUT + Duration::from_millis(1);
        assert_eq!(
            hb.check_at(late),
            Some(HeartbeatEvent::Lost { silence: Some(TIMEOUT + Duration::from_millis(1)) })
        );
        assert!(hb.is_lost());

        // Only reported once
        assert_eq!(hb.check_at(late + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_touch_keeps_alive() {
        let hb = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();

        hb.touch_at(t0);
        hb.check_at(t0);

        // Touch every second for ten seconds, never lost
        for i in 1..=10 {
            let t = t0 + Duration::from_secs(i);
            hb.touch_at(t);
            assert_eq!(hb.check_at(t + Duration::from_millis(100)), None);
        }

        assert!(!hb.is_lost());
    }

    #[test]
    fn test_touch_is_monotonic() {
        let hb = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(2);

        hb.touch_at(t1);
        hb.touch_at(t0);

        assert_eq!(hb.last_contact(), Some(t1));
    }

    #[test]
    fn test_reset() {
        let hb = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();

        hb.touch_at(t0);
        hb.check_at(t0);
        assert!(!hb.is_lost());

        hb.reset();
        assert_eq!(
            hb.snapshot(),
            HeartbeatState { last_contact: None, lost: true }
        );
    }
}
