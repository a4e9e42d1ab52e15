//! # Connection Manager
//!
//! Keeps the driver station connected to the robot. A background thread hunts through the address
//! pool until a session opens and answers a ping, then holds that session as the current one until
//! it fails.
//!
//! - A failed attempt, or the loss of the current session, moves the pool cursor on, so a dead
//!   address is never tried twice in a row while there are others to try.
//! - Nothing here is fatal, every transport error just returns the manager to hunting.
//! - Observers are told of every connect and disconnect.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{
    io,
    sync::{Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};

use comms_if::{
    heartbeat::HeartbeatMonitor,
    net::{Address, AddressPool},
    tc::{Tc, TcPacket, TcResponse}
};
use util::shutdown::{join_bounded, ShutdownSignal};

use crate::tc_client::{Connector, SessionError, TcSession};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Callback told of connection changes: `(true, Some(address))` on connect, `(false, None)` on a
/// failed attempt or disconnect.
pub type ConnObserver = Box<dyn Fn(bool, Option<&Address>) + Send>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Timing parameters of the connection manager.
#[derive(Debug, Clone, Copy)]
pub struct ConnMgrParams {
    /// Wait between attempts while hunting.
    pub hunt_retry: Duration,

    /// Wait between link checks while connected.
    pub connected_retry: Duration,

    /// Time without a successful round trip after which the session is dropped.
    pub link_timeout: Duration
}

/// The connection manager.
pub struct ConnMgr {
    inner: Arc<Inner>,

    /// Signal of the current worker, replaced on every start
    shutdown: Mutex<ShutdownSignal>,

    worker: Mutex<Option<JoinHandle<()>>>
}

/// State shared with the hunting thread.
struct Inner {
    connector: Box<dyn Connector>,

    params: ConnMgrParams,

    pool: Mutex<AddressPool>,

    /// The current live session. Held for the whole of a request, so requests never overlap.
    session: Mutex<Option<Box<dyn TcSession>>>,

    status: Mutex<Status>,

    observers: Mutex<Vec<ConnObserver>>,

    /// Touched by every successful round trip
    hb: HeartbeatMonitor
}

/// Snapshot of the connection, cheap to copy out.
#[derive(Debug, Clone, PartialEq)]
struct Status {
    state: ConnState,

    address: Option<Address>,

    /// Incremented every time a new session goes live
    generation: u64,

    last_rtt: Option<Duration>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected
}

#[derive(Debug, thiserror::Error)]
pub enum ConnMgrError {
    #[error("Not connected to the robot")]
    NotConnected,

    #[error("Session error: {0}")]
    SessionError(SessionError),

    #[error("The robot did not answer the liveness probe: {0:?}")]
    ProbeRejected(TcResponse),

    #[error("Could not start the connection thread: {0}")]
    ThreadSpawnError(io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for ConnMgrParams {
    fn default() -> Self {
        Self {
            hunt_retry: Duration::from_secs(1),
            connected_retry: Duration::from_millis(500),
            link_timeout: Duration::from_secs(3)
        }
    }
}

impl ConnMgr {
    /// Create a new manager. Nothing is connected until [`start`](Self::start) or
    /// [`hunt_once`](Self::hunt_once) is called.
    pub fn new(connector: Box<dyn Connector>, pool: AddressPool, params: ConnMgrParams) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                params,
                pool: Mutex::new(pool),
                session: Mutex::new(None),
                status: Mutex::new(Status {
                    state: ConnState::Disconnected,
                    address: None,
                    generation: 0,
                    last_rtt: None
                }),
                observers: Mutex::new(Vec::new()),
                hb: HeartbeatMonitor::new(params.link_timeout)
            }),
            shutdown: Mutex::new(ShutdownSignal::new()),
            worker: Mutex::new(None)
        }
    }

    /// Register a callback for connection changes.
    pub fn add_observer(&self, observer: ConnObserver) {
        lock(&self.inner.observers).push(observer);
    }

    /// Start the background connection loop. Does nothing if it is already running.
    ///
    /// The manager may be started again after [`stop`](Self::stop).
    pub fn start(&self) -> Result<(), ConnMgrError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(())
        }

        let inner = self.inner.clone();
        let shutdown = ShutdownSignal::new();
        *lock(&self.shutdown) = shutdown.clone();

        let jh = thread::Builder::new()
            .name("conn_mgr".into())
            .spawn(move || inner.run(shutdown))
            .map_err(|e| ConnMgrError::ThreadSpawnError(e))?;

        *worker = Some(jh);
        Ok(())
    }

    /// Stop the background loop and close the current session.
    pub fn stop(&self) {
        lock(&self.shutdown).trigger();

        if let Some(jh) = lock(&self.worker).take() {
            join_bounded("ConnMgr", jh, WORKER_JOIN_TIMEOUT);
        }

        if lock(&self.inner.session).take().is_some() {
            self.inner.set_disconnected();
            info!("Session closed");
        }
    }

    /// Make one connection attempt to the address under the cursor.
    pub fn hunt_once(&self) -> Result<Address, ConnMgrError> {
        self.inner.hunt_once()
    }

    /// The address of the current live session, or `None` if there isn't one.
    pub fn active_session(&self) -> Option<Address> {
        let status = lock(&self.inner.status);
        match status.state {
            ConnState::Connected => status.address.clone(),
            _ => None
        }
    }

    pub fn state(&self) -> ConnState {
        lock(&self.inner.status).state
    }

    /// Number of sessions which have gone live so far. Changes on every reconnect.
    pub fn generation(&self) -> u64 {
        lock(&self.inner.status).generation
    }

    /// Round trip time of the last successful request.
    pub fn last_rtt(&self) -> Option<Duration> {
        lock(&self.inner.status).last_rtt
    }

    /// True if no round trip has succeeded within the link timeout.
    pub fn link_lost(&self) -> bool {
        self.inner.hb.check();
        self.inner.hb.is_lost()
    }

    /// Index of the pool cursor.
    pub fn cursor(&self) -> usize {
        lock(&self.inner.pool).cursor()
    }

    /// Send a telecommand on the current session and wait for the response.
    ///
    /// A transport failure drops the session and returns the manager to hunting.
    pub fn request(&self, tc: Tc) -> Result<TcResponse, ConnMgrError> {
        self.inner.request(&TcPacket::new(tc))
    }
}

impl Drop for ConnMgr {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn run(&self, shutdown: ShutdownSignal) {
        info!("Connection manager started");

        loop {
            let connected = lock(&self.session).is_some();

            let wait = if connected {
                // A session that has gone quiet for too long is treated as dead
                self.hb.check();
                if self.hb.is_lost() {
                    warn!("No successful round trip within {:?}", self.params.link_timeout);
                    self.drop_session();
                }
                self.params.connected_retry
            }
            else {
                match self.hunt_once() {
                    Ok(_) => self.params.connected_retry,
                    Err(_) => self.params.hunt_retry
                }
            };

            if shutdown.wait_timeout(wait) {
                break
            }
        }

        info!("Connection manager stopped");
    }

    fn hunt_once(&self) -> Result<Address, ConnMgrError> {
        let addr = lock(&self.pool).current().clone();

        {
            let mut status = lock(&self.status);
            status.state = ConnState::Connecting;
            status.address = None;
        }
        debug!("Trying {}", addr);

        match self.open(&addr) {
            Ok((session, rtt)) => {
                *lock(&self.session) = Some(session);
                self.hb.touch();
                self.hb.check();

                {
                    let mut status = lock(&self.status);
                    status.state = ConnState::Connected;
                    status.address = Some(addr.clone());
                    status.generation += 1;
                    status.last_rtt = Some(rtt);
                }

                info!("Connected to {} (rtt {:.1} ms)", addr, rtt.as_secs_f64() * 1e3);
                self.notify(true, Some(&addr));
                Ok(addr)
            },
            Err(e) => {
                debug!("Could not connect to {}: {}", addr, e);
                lock(&self.pool).advance();
                self.set_disconnected();
                Err(e)
            }
        }
    }

    /// Open a session and check it answers a ping.
    fn open(&self, addr: &Address) -> Result<(Box<dyn TcSession>, Duration), ConnMgrError> {
        let mut session = self.connector.connect(addr)
            .map_err(|e| ConnMgrError::SessionError(e))?;

        let sent_at = Instant::now();
        let rsp = session.request(&TcPacket::new(Tc::Ping))
            .map_err(|e| ConnMgrError::SessionError(e))?;

        match rsp.is_success() {
            true => Ok((session, sent_at.elapsed())),
            false => Err(ConnMgrError::ProbeRejected(rsp))
        }
    }

    fn request(&self, packet: &TcPacket) -> Result<TcResponse, ConnMgrError> {
        let mut slot = lock(&self.session);

        let session = match slot.as_mut() {
            Some(s) => s,
            None => return Err(ConnMgrError::NotConnected)
        };

        let sent_at = Instant::now();
        match session.request(packet) {
            Ok(rsp) => {
                let rtt = sent_at.elapsed();
                self.hb.touch();
                lock(&self.status).last_rtt = Some(rtt);
                Ok(rsp)
            },
            Err(e) => {
                warn!("Session with {} failed: {}", session.address(), e);
                *slot = None;
                drop(slot);

                lock(&self.pool).advance();
                self.set_disconnected();
                Err(ConnMgrError::SessionError(e))
            }
        }
    }

    /// Drop the current session and move on to the next address.
    fn drop_session(&self) {
        if lock(&self.session).take().is_some() {
            lock(&self.pool).advance();
            self.set_disconnected();
        }
    }

    fn set_disconnected(&self) {
        {
            let mut status = lock(&self.status);
            status.state = ConnState::Disconnected;
            status.address = None;
        }
        self.hb.reset();
        self.notify(false, None);
    }

    fn notify(&self, connected: bool, addr: Option<&Address>) {
        for observer in lock(&self.observers).iter() {
            observer(connected, addr);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
