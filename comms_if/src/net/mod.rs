//! # Network Module
//!
//! This module provides networking abstractions for both wire bindings: a monitored ZMQ socket for
//! the structured message binding, and a newline framed TCP stream for the line binding.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod address;
mod line_stream;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use std::{
    sync::{Arc, atomic::{AtomicBool, AtomicUsize}, atomic::Ordering},
    thread,
    time::{Duration, Instant}
};
use zmq::{Socket, Context, SocketType, SocketEvent};

pub use address::*;
pub use line_stream::*;

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

macro_rules! set_sockopts {
    ($socket:expr, $(($opt:ident, $val:expr)),+) => {
        $(
            $socket.$opt($val)
                .map_err(|e| MonitoredSocketError::SocketOptionError(stringify!($opt).into(), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout on the monitor socket. Bounds how long the monitor thread takes to notice a
/// shutdown request.
const MONITOR_POLL_MS: i32 = 100;

/// How long to wait for the first connection if the socket has no connect timeout of its own.
const DEFAULT_FIRST_CONNECT_MS: i32 = 1000;

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Number of monitors that are registered. Used to provide unique IDs for each mointor endpoint.
static NUM_MONITORS: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A zmq socket which is monitored providing additional information.
///
/// A background thread is run in order to monitor activity on the socket and update visible
/// information to the user. Currently this is only whether or not the socket is actually connected.
pub struct MonitoredSocket {
    socket: Socket,

    join_handle: Option<thread::JoinHandle<()>>,

    monitor_endpoint: String,

    shutdown: Arc<AtomicBool>,

    connected: Arc<AtomicBool>
}

/// Options applied to a [`MonitoredSocket`] before it binds or connects.
///
/// Timeouts are in milliseconds with the zmq meanings, `-1` waits forever and `0` returns at once.
pub struct SocketOptions {
    /// Bind to the endpoint instead of connecting to it. Set on the robot side.
    pub bind: bool,

    /// Wait in [`MonitoredSocket::new`] until the connection is up. Gives up with
    /// [`MonitoredSocketError::CouldNotConnect`] once `connect_timeout` has passed. Ignored when
    /// binding.
    pub block_on_first_connect: bool,

    /// `ZMQ_CONFLATE`, keep only the newest message in the queue.
    pub conflate: bool,

    /// `ZMQ_REQ_CORRELATE`, drop replies that do not belong to the last request. REQ only.
    pub req_correlate: bool,

    /// `ZMQ_LINGER`, how long unsent messages hold up closing the socket.
    pub linger: i32,

    /// `ZMQ_CONNECT_TIMEOUT`
    pub connect_timeout: i32,

    /// `ZMQ_RCVTIMEO`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`
    pub send_timeout: i32
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Error creating the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Error enabling monitoring for the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not connect the socket: {0:?}")]
    CouldNotConnect(Option<zmq::Error>),

    #[error("Could not read event from monitor socket: {0}")]
    EventReadError(zmq::Error),

    #[error("Could not set the {0} socket option: {1}")]
    SocketOptionError(String, zmq::Error),

    #[error("Could not start the monitor thread: {0}")]
    ThreadSpawnError(std::io::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create a socket, start monitoring it, then bind or connect it to `endpoint`.
    ///
    /// With `block_on_first_connect` set on a connecting socket this waits for the monitor to
    /// report the connection, bounded by the connect timeout (or one second if that is unset).
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        socket_options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        // Create atomics
        let shutdown = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        // Create socket
        let socket = ctx.socket(socket_type)
            .map_err(|e| MonitoredSocketError::CreateSocketError(e))?;

        // Create monitor endpoint
        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            NUM_MONITORS.fetch_add(1, Ordering::Relaxed)
        );

        // Enable, create, and connect monitor. The monitor gets a receive timeout so that neither
        // the first connect nor the monitor thread can block forever.
        socket.monitor(&monitor_endpoint, SocketEvent::ALL as i32)
            .map_err(|e| MonitoredSocketError::MonitoringEnableError(e))?;
        let monitor = ctx.socket(zmq::PAIR)
            .map_err(|e| MonitoredSocketError::CreateSocketError(e))?;
        set_sockopts!(monitor, (set_rcvtimeo, MONITOR_POLL_MS), (set_linger, 0));
        monitor.connect(&monitor_endpoint)
            .map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        // Set the options on the socket
        socket_options.set(&socket)?;

        // Connect or bind the socket to it's endpoint
        match socket_options.bind {
            false => socket.connect(endpoint),
            true => socket.bind(endpoint)
        }.map_err(|e| MonitoredSocketError::CouldNotConnect(Some(e)))?;

        // If the block on first connect flag is set, and this is a client, wait for the monitor to
        // signal connection
        if socket_options.block_on_first_connect && !socket_options.bind {
            let wait_ms = match socket_options.connect_timeout {
                t if t > 0 => t,
                _ => DEFAULT_FIRST_CONNECT_MS
            };
            let deadline = Instant::now() + Duration::from_millis(wait_ms as u64);

            loop {
                match read_event(&monitor) {
                    Ok(SocketEvent::CONNECTED) => break,
                    Ok(_) | Err(zmq::Error::EAGAIN) => (),
                    Err(e) => return Err(MonitoredSocketError::EventReadError(e))
                }

                if Instant::now() >= deadline {
                    debug!("No connection to {} within {} ms", endpoint, wait_ms);
                    return Err(MonitoredSocketError::CouldNotConnect(None))
                }
            }

            // Set the connected bool to true here since it must have happend
            connected.store(true, Ordering::Relaxed);
        }

        // Create clones for use by the monitor thread
        let shutdown_clone = shutdown.clone();
        let connected_clone = connected.clone();
        let monitor_endpoint_clone = monitor_endpoint.clone();

        // Spawn the monitor thread
        let join_handle = thread::Builder::new()
            .name(format!("monitor_{}", monitor_endpoint.trim_start_matches("inproc://monitor_")))
            .spawn(move || monitor_socket(
                monitor,
                monitor_endpoint_clone,
                shutdown_clone,
                connected_clone
            ))
            .map_err(|e| MonitoredSocketError::ThreadSpawnError(e))?;

        // Create self
        Ok(Self {
            socket,
            join_handle: Some(join_handle),
            monitor_endpoint,
            shutdown,
            connected
        })
    }

    /// Return if the socket is connected or not.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// The endpoint the socket is actually bound to.
    ///
    /// Useful when binding to a wildcard port such as `tcp://127.0.0.1:*`.
    pub fn last_endpoint(&self) -> Option<String> {
        match self.socket.get_last_endpoint() {
            Ok(Ok(s)) => Some(s),
            _ => None
        }
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        // The monitor thread wakes at least every MONITOR_POLL_MS so this join is bounded
        if let Some(jh) = self.join_handle.take() {
            if jh.join().is_err() {
                warn!("Monitor thread for {} panicked", self.monitor_endpoint);
            }
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Self::Target {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.socket
    }
}

impl SocketOptions {
    /// Apply these options to the given socket.
    pub fn set(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        set_sockopts!(
            socket,
            (set_connect_timeout, self.connect_timeout),
            (set_linger, self.linger),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout)
        );

        if self.conflate {
            set_sockopts!(socket, (set_conflate, true));
        }

        if let Ok(SocketType::REQ) = socket.get_socket_type() {
            set_sockopts!(socket, (set_req_correlate, self.req_correlate));
        }

        Ok(())
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            bind: false,
            block_on_first_connect: true,
            conflate: false,
            req_correlate: false,
            linger: 30_000,
            connect_timeout: 0,
            recv_timeout: -1,
            send_timeout: -1
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read an event from a socket.
fn read_event(socket: &Socket) -> Result<SocketEvent, zmq::Error> {

    let msg = socket.recv_msg(0)?;

    let event = match msg.len() {
        n if n >= 2 => u16::from_ne_bytes([msg[0], msg[1]]),
        _ => return Err(zmq::Error::EINVAL)
    };

    // The second frame is the address, we'll ignore it
    if socket.get_rcvmore()? {
        let _ = socket.recv_msg(0)?;
    }

    Ok(SocketEvent::from_raw(event))
}

fn monitor_socket(
    monitor: Socket,
    monitor_endpoint: String,
    shutdown: Arc<AtomicBool>,
    connected: Arc<AtomicBool>
) {
    // So long as the shutdown isn't requested
    while !shutdown.load(Ordering::Relaxed) {
        // Read the next event from the monitor
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("Error reading event from monitor {}: {}", monitor_endpoint, e);
                break
            }
        };

        // Raise any flags required by the event
        match event {
            SocketEvent::CONNECTED | SocketEvent::ACCEPTED =>
                connected.store(true, Ordering::Relaxed),
            SocketEvent::DISCONNECTED => connected.store(false, Ordering::Relaxed),
            _ => ()
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_connect_is_bounded() {
        let ctx = zmq::Context::new();

        // Nothing is listening on this port, connecting must give up after the timeout
        let start = Instant::now();
        let res = MonitoredSocket::new(
            &ctx,
            zmq::REQ,
            SocketOptions {
                connect_timeout: 200,
                linger: 0,
                ..Default::default()
            },
            "tcp://127.0.0.1:1"
        );

        assert!(matches!(res, Err(MonitoredSocketError::CouldNotConnect(None))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_bind_and_connect() {
        let ctx = zmq::Context::new();

        let server = MonitoredSocket::new(
            &ctx,
            zmq::REP,
            SocketOptions {
                bind: true,
                block_on_first_connect: false,
                linger: 0,
                ..Default::default()
            },
            "tcp://127.0.0.1:*"
        ).unwrap();

        let endpoint = server.last_endpoint().unwrap();

        let client = MonitoredSocket::new(
            &ctx,
            zmq::REQ,
            SocketOptions {
                connect_timeout: 1000,
                linger: 0,
                ..Default::default()
            },
            &endpoint
        ).unwrap();

        assert!(client.connected());

        // Dropping must not hang on the monitor thread
        drop(client);
        drop(server);
    }
}
