//! # Telecommand Server
//!
//! Serves telecommands from the driver station over either wire binding, passing every request to
//! a [`TcProcessor`]:
//!
//! - [`ZmqTcServer`]: a REP socket on the command endpoint, one request and response at a time.
//! - [`LineTcServer`]: a TCP listener, one line per request. Only one driver station is served at a
//!   time, a new connection replaces the current one.
//!
//! Every blocking call has a timeout so both servers notice a shutdown request promptly.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::{
    io,
    net::{Shutdown, SocketAddr, TcpListener, TcpStream},
    thread::{self, JoinHandle},
    time::Duration
};

use comms_if::net::{
    zmq, Address, LineStream, LineStreamError, MonitoredSocket, MonitoredSocketError, SocketOptions
};
use util::shutdown::{join_bounded, ShutdownSignal};

use crate::tc_processor::TcProcessor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout on the command sockets.
const RECV_TIMEOUT_MS: i32 = 100;

const SEND_TIMEOUT_MS: i32 = 100;

/// Wait between polls of the nonblocking listener.
const ACCEPT_POLL_PERIOD: Duration = Duration::from_millis(10);

/// Wait after an error before trying again, so a persistent fault cannot spin.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// How long to wait for a replaced connection's thread to exit.
const CONN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telecommand server for the JSON binding.
pub struct ZmqTcServer {
    ctx: zmq::Context,

    /// Endpoint the socket is bound to, with any wildcard port resolved
    endpoint: String,

    /// The REP socket, `None` after a send failure until it has been rebuilt
    socket: Option<MonitoredSocket>,

    processor: TcProcessor
}

/// Telecommand server for the line binding.
pub struct LineTcServer {
    listener: TcpListener,

    processor: TcProcessor
}

/// The connection currently being served by a [`LineTcServer`].
struct ActiveConn {
    peer: SocketAddr,

    /// Clone of the connection's stream, shut down to evict it
    stream: TcpStream,

    join_handle: JoinHandle<()>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A telecommand server for either binding.
pub enum TcServer {
    Zmq(ZmqTcServer),
    Line(LineTcServer)
}

#[derive(Debug, thiserror::Error)]
pub enum TcServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not bind to {0}: {1}")]
    BindError(Address, io::Error),

    #[error("Listener error: {0}")]
    ListenerError(io::Error),

    #[error("Could not recieve a telecommand: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send a response: {0}")]
    SendError(zmq::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TcServer {
    /// Start serving on a new thread until `shutdown` is triggered.
    pub fn spawn(self, shutdown: ShutdownSignal) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tc_server".into())
            .spawn(move || match self {
                TcServer::Zmq(s) => s.run(shutdown),
                TcServer::Line(s) => s.run(shutdown)
            })
    }
}

impl ZmqTcServer {
    /// Create a new instance of the TC Server, bound to `endpoint`.
    ///
    /// This function will not block until a client connects.
    pub fn new(
        ctx: &zmq::Context,
        endpoint: &str,
        processor: TcProcessor
    ) -> Result<Self, TcServerError> {
        let socket = Self::open(ctx, endpoint)?;
        let endpoint = socket.last_endpoint()
            .unwrap_or_else(|| endpoint.to_string());

        info!("TcServer bound to {}", endpoint);

        Ok(Self {
            ctx: ctx.clone(),
            endpoint,
            socket: Some(socket),
            processor
        })
    }

    /// The endpoint the server is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Serve at most one request, waiting no longer than the receive timeout for it.
    ///
    /// Returns `Ok(true)` if a request was answered and `Ok(false)` if none arrived.
    pub fn serve_once(&mut self) -> Result<bool, TcServerError> {
        if self.socket.is_none() {
            info!("Rebuilding TcServer socket on {}", self.endpoint);
            self.socket = Some(Self::open(&self.ctx, &self.endpoint)?);
        }

        let socket = match self.socket {
            Some(ref s) => s,
            None => return Ok(false)
        };

        let request = match socket.recv_bytes(0) {
            Ok(r) => r,
            Err(zmq::Error::EAGAIN) => return Ok(false),
            Err(e) => return Err(TcServerError::RecvError(e))
        };

        let response = self.processor.dispatch(&request);

        if let Err(e) = socket.send(response, 0) {
            // A REP socket that failed to reply can't receive again, so start a fresh one
            self.socket = None;
            return Err(TcServerError::SendError(e))
        }

        Ok(true)
    }

    /// Serve requests until `shutdown` is triggered.
    pub fn run(mut self, shutdown: ShutdownSignal) {
        while !shutdown.is_triggered() {
            if let Err(e) = self.serve_once() {
                warn!("TcServer error: {}", e);
                shutdown.wait_timeout(ERROR_BACKOFF);
            }
        }

        info!("TcServer stopped");
    }

    fn open(ctx: &zmq::Context, endpoint: &str) -> Result<MonitoredSocket, TcServerError> {
        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            linger: 0,
            recv_timeout: RECV_TIMEOUT_MS,
            send_timeout: SEND_TIMEOUT_MS,
            ..Default::default()
        };

        MonitoredSocket::new(ctx, zmq::REP, socket_options, endpoint)
            .map_err(|e| TcServerError::SocketError(e))
    }
}

impl LineTcServer {
    /// Bind the listener to `addr`.
    pub fn bind(addr: &Address, processor: TcProcessor) -> Result<Self, TcServerError> {
        let sock_addrs = addr.resolve()
            .map_err(|e| TcServerError::BindError(addr.clone(), e))?;

        let listener = TcpListener::bind(&sock_addrs[..])
            .map_err(|e| TcServerError::BindError(addr.clone(), e))?;

        // Accept is polled so the loop can check for shutdown
        listener.set_nonblocking(true)
            .map_err(|e| TcServerError::ListenerError(e))?;

        info!("TcServer listening on {}", addr);

        Ok(Self {
            listener,
            processor
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TcServerError> {
        self.listener.local_addr()
            .map_err(|e| TcServerError::ListenerError(e))
    }

    /// Accept and serve connections until `shutdown` is triggered.
    pub fn run(self, shutdown: ShutdownSignal) {
        let mut active: Option<ActiveConn> = None;

        while !shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    // Last connect wins
                    if let Some(old) = active.take() {
                        warn!("Connection from {} replaces {}", peer, old.peer);
                        old.close();
                    }

                    match self.start_conn(stream, peer, shutdown.clone()) {
                        Ok(conn) => active = Some(conn),
                        Err(e) => warn!("Could not serve {}: {}", peer, e)
                    }
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    shutdown.wait_timeout(ACCEPT_POLL_PERIOD);
                },
                Err(e) => {
                    warn!("Accept error: {}", e);
                    shutdown.wait_timeout(ERROR_BACKOFF);
                }
            }
        }

        if let Some(conn) = active.take() {
            conn.close();
        }

        info!("TcServer stopped");
    }

    fn start_conn(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: ShutdownSignal
    ) -> Result<ActiveConn, LineStreamError> {
        let line_stream = LineStream::from_stream(stream)?;
        line_stream.set_read_timeout(Duration::from_millis(RECV_TIMEOUT_MS as u64))?;
        line_stream.set_write_timeout(Duration::from_millis(SEND_TIMEOUT_MS as u64))?;
        let evict_handle = line_stream.try_clone_stream()?;

        let processor = self.processor.clone();

        let join_handle = thread::Builder::new()
            .name(format!("tc_conn_{}", peer))
            .spawn(move || serve_conn(line_stream, processor, shutdown))
            .map_err(|e| LineStreamError::ConfigError(e))?;

        info!("Driver station connected from {}", peer);

        Ok(ActiveConn {
            peer,
            stream: evict_handle,
            join_handle
        })
    }
}

impl ActiveConn {
    /// Close the connection and wait a bounded time for its thread to exit.
    fn close(self) {
        // Unblocks the connection thread's read
        self.stream.shutdown(Shutdown::Both).ok();
        join_bounded(&format!("Connection {}", self.peer), self.join_handle, CONN_JOIN_TIMEOUT);
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Serve one line binding connection until it closes or shutdown is requested.
fn serve_conn(mut stream: LineStream, processor: TcProcessor, shutdown: ShutdownSignal) {
    let peer = stream.peer_addr();

    while !shutdown.is_triggered() {
        match stream.recv_line() {
            Ok(Some(line)) => {
                let response = processor.dispatch(&line);

                if let Err(e) = stream.send_line(&response) {
                    warn!("Dropping {}: {}", peer, e);
                    break
                }
            },
            Ok(None) => (),
            Err(LineStreamError::Closed) => {
                info!("Driver station {} disconnected", peer);
                break
            },
            Err(e) => {
                warn!("Dropping {}: {}", peer, e);
                break
            }
        }
    }

    stream.shutdown();
    debug!("Connection thread for {} exiting", peer);
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use comms_if::{
        codec::{JsonCodec, LineCodec},
        heartbeat::HeartbeatMonitor,
        tc::{RobotMode, TcResponse}
    };
    use crate::{data_store::{self, DataStore}, eqpt::RecordingActuator};

    fn processor(codec: Arc<dyn comms_if::codec::WireCodec>) -> (TcProcessor, data_store::SharedDataStore) {
        let ds = DataStore::new(Box::new(RecordingActuator::new())).into_shared();
        let hb = Arc::new(HeartbeatMonitor::new(Duration::from_secs(1)));
        (TcProcessor::new(codec, ds.clone(), hb), ds)
    }

    #[test]
    fn test_zmq_serve_once() {
        let ctx = zmq::Context::new();
        let (proc, ds) = processor(Arc::new(JsonCodec));

        let mut server = ZmqTcServer::new(&ctx, "tcp://127.0.0.1:*", proc).unwrap();

        // Nothing pending
        assert_eq!(server.serve_once().unwrap(), false);

        let client = ctx.socket(zmq::REQ).unwrap();
        client.set_linger(0).unwrap();
        client.set_rcvtimeo(2000).unwrap();
        client.connect(server.endpoint()).unwrap();
        client.send(r#"{"type": "mode", "mode": "AUTO"}"#, 0).unwrap();

        let mut served = false;
        for _ in 0..20 {
            if server.serve_once().unwrap() {
                served = true;
                break
            }
        }
        assert!(served);

        let rsp: TcResponse = serde_json::from_slice(&client.recv_bytes(0).unwrap()).unwrap();
        assert!(rsp.is_success());
        assert_eq!(rsp.mode, Some(RobotMode::Auto));
        assert_eq!(data_store::lock(&ds).mode(), RobotMode::Auto);
    }

    #[test]
    fn test_line_last_connect_wins() {
        let (proc, _) = processor(Arc::new(LineCodec));
        let server = LineTcServer::bind(&Address::new("127.0.0.1", 0), proc).unwrap();
        let addr = Address::from(server.local_addr().unwrap());

        let shutdown = ShutdownSignal::new();
        let jh = TcServer::Line(server).spawn(shutdown.clone()).unwrap();

        let mut first = LineStream::connect(&addr, Duration::from_secs(1)).unwrap();
        first.send_line(b"PING").unwrap();
        assert_eq!(first.recv_line_within(Duration::from_secs(2)).unwrap(), b"ACK".to_vec());

        let mut second = LineStream::connect(&addr, Duration::from_secs(1)).unwrap();
        second.send_line(b"MODE TELEOP").unwrap();
        assert_eq!(second.recv_line_within(Duration::from_secs(2)).unwrap(), b"ACK".to_vec());

        // The first connection has been closed by the server
        assert!(matches!(
            first.recv_line_within(Duration::from_secs(2)),
            Err(LineStreamError::Closed) | Err(LineStreamError::RecvError(_))
        ));

        second.send_line(b"FLY").unwrap();
        let rsp = second.recv_line_within(Duration::from_secs(2)).unwrap();
        assert!(rsp.starts_with(b"ERR "));

        shutdown.trigger();
        assert!(join_bounded("tc_server", jh, Duration::from_secs(3)).is_some());
    }
}
