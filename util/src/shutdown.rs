//! # Shutdown signalling
//!
//! Every worker loop waits on a [`ShutdownSignal`] instead of sleeping, so that a shutdown request
//! wakes it immediately rather than after its next tick.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{debug, warn};
use std::{
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// How often [`join_bounded`] checks whether the thread has finished.
const JOIN_POLL_PERIOD: Duration = Duration::from_millis(10);

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A one-shot, cloneable shutdown flag which can be waited on.
#[derive(Clone, Default, Debug)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown, waking every waiting thread.
    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait until either shutdown is requested or `timeout` elapses.
    ///
    /// Returns `true` if shutdown has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;

        let mut triggered = lock.lock().unwrap_or_else(|e| e.into_inner());

        // Loop to absorb spurious wakeups
        while !*triggered {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining == Duration::from_secs(0) {
                break
            }

            triggered = match cvar.wait_timeout(triggered, remaining) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0
            };
        }

        *triggered
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Join a thread, waiting no longer than `timeout`.
///
/// Returns the thread's result if it finished in time. A thread which is still running when the
/// timeout expires is logged and left detached.
pub fn join_bounded<T>(name: &str, jh: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let deadline = Instant::now() + timeout;

    while !jh.is_finished() {
        if Instant::now() >= deadline {
            warn!("{} did not stop within {:?}, detaching it", name, timeout);
            return None
        }
        thread::sleep(JOIN_POLL_PERIOD);
    }

    match jh.join() {
        Ok(t) => {
            debug!("{} stopped", name);
            Some(t)
        },
        Err(_) => {
            warn!("{} panicked", name);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wait_times_out() {
        let signal = ShutdownSignal::new();

        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!signal.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let jh = thread::spawn(move || {
            let start = Instant::now();
            let triggered = waiter.wait_timeout(Duration::from_secs(10));
            (triggered, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        signal.trigger();

        let (triggered, waited) = join_bounded("waiter", jh, Duration::from_secs(5)).unwrap();
        assert!(triggered);
        assert!(waited < Duration::from_secs(5));

        // Stays triggered
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }

    #[test]
    fn test_join_bounded_detaches_stuck_thread() {
        let signal = ShutdownSignal::new();
        let stuck = signal.clone();

        let jh = thread::spawn(move || {
            stuck.wait_timeout(Duration::from_secs(10));
        });

        assert!(join_bounded("stuck", jh, Duration::from_millis(50)).is_none());

        // Let the detached thread exit
        signal.trigger();
    }

    #[test]
    fn test_join_bounded_panicking_thread() {
        let jh = thread::spawn(|| panic!("boom"));
        assert_eq!(join_bounded::<()>("panicker", jh, Duration::from_secs(5)), None);
    }
}
