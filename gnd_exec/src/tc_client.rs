//! # Telecommand Client
//!
//! A [`TcSession`] owns exactly one connection to the robot and performs one request at a time.
//! Every request is bounded by a timeout, an unanswered request is a [`SessionError::Timeout`] and
//! the session should be thrown away.
//!
//! Sessions are opened through a [`Connector`], so the connection manager does not need to know
//! which wire binding is in use.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use std::time::Duration;

use comms_if::{
    codec::{Binding, JsonCodec, LineCodec, ResponseParseError, WireCodec},
    net::{zmq, Address, LineStream, LineStreamError, MonitoredSocket, MonitoredSocketError, SocketOptions},
    tc::{TcPacket, TcResponse}
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// One live connection to the robot.
pub trait TcSession: Send {
    /// The address this session is connected to.
    fn address(&self) -> &Address;

    /// Send a telecommand and wait for its response.
    fn request(&mut self, packet: &TcPacket) -> Result<TcResponse, SessionError>;
}

/// Opens sessions to addresses.
pub trait Connector: Send + Sync {
    fn connect(&self, addr: &Address) -> Result<Box<dyn TcSession>, SessionError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Session over the JSON binding, using a ZMQ REQ socket.
pub struct ZmqSession {
    addr: Address,

    socket: MonitoredSocket,

    codec: JsonCodec
}

/// Session over the line binding, using a TCP stream.
pub struct LineSession {
    addr: Address,

    stream: LineStream,

    codec: LineCodec,

    request_timeout: Duration
}

/// Opens [`ZmqSession`]s.
pub struct ZmqConnector {
    ctx: zmq::Context,

    connect_timeout: Duration,

    request_timeout: Duration
}

/// Opens [`LineSession`]s.
pub struct LineConnector {
    connect_timeout: Duration,

    request_timeout: Duration
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Stream error: {0}")]
    StreamError(LineStreamError),

    #[error("Could not send the telecommand: {0}")]
    SendError(zmq::Error),

    #[error("Could not recieve the response: {0}")]
    RecvError(zmq::Error),

    #[error("No response within {0:?}")]
    Timeout(Duration),

    #[error("Could not parse the response: {0}")]
    BadResponse(ResponseParseError)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ZmqConnector {
    pub fn new(ctx: &zmq::Context, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            ctx: ctx.clone(),
            connect_timeout,
            request_timeout
        }
    }
}

impl Connector for ZmqConnector {
    fn connect(&self, addr: &Address) -> Result<Box<dyn TcSession>, SessionError> {
        let socket_options = SocketOptions {
            block_on_first_connect: true,
            connect_timeout: millis(self.connect_timeout),
            linger: 0,
            recv_timeout: millis(self.request_timeout),
            send_timeout: millis(self.request_timeout),
            req_correlate: true,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            &self.ctx,
            zmq::REQ,
            socket_options,
            &addr.tcp_endpoint()
        ).map_err(|e| SessionError::SocketError(e))?;

        Ok(Box::new(ZmqSession {
            addr: addr.clone(),
            socket,
            codec: JsonCodec
        }))
    }
}

impl TcSession for ZmqSession {
    fn address(&self) -> &Address {
        &self.addr
    }

    fn request(&mut self, packet: &TcPacket) -> Result<TcResponse, SessionError> {
        self.socket.send(self.codec.encode_tc(packet), 0)
            .map_err(|e| match e {
                zmq::Error::EAGAIN => SessionError::Timeout(timeout_of(&self.socket, false)),
                e => SessionError::SendError(e)
            })?;

        let raw = self.socket.recv_bytes(0)
            .map_err(|e| match e {
                zmq::Error::EAGAIN => SessionError::Timeout(timeout_of(&self.socket, true)),
                e => SessionError::RecvError(e)
            })?;

        trace!("Response from {}: {}", self.addr, String::from_utf8_lossy(&raw));

        self.codec.decode_response(&raw)
            .map_err(|e| SessionError::BadResponse(e))
    }
}

impl LineConnector {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout
        }
    }
}

impl Connector for LineConnector {
    fn connect(&self, addr: &Address) -> Result<Box<dyn TcSession>, SessionError> {
        let stream = LineStream::connect(addr, self.connect_timeout)
            .map_err(|e| SessionError::StreamError(e))?;
        stream.set_write_timeout(self.request_timeout)
            .map_err(|e| SessionError::StreamError(e))?;

        Ok(Box::new(LineSession {
            addr: addr.clone(),
            stream,
            codec: LineCodec,
            request_timeout: self.request_timeout
        }))
    }
}

impl TcSession for LineSession {
    fn address(&self) -> &Address {
        &self.addr
    }

    fn request(&mut self, packet: &TcPacket) -> Result<TcResponse, SessionError> {
        self.stream.send_line(&self.codec.encode_tc(packet))
            .map_err(|e| SessionError::StreamError(e))?;

        let raw = self.stream.recv_line_within(self.request_timeout)
            .map_err(|e| match e {
                LineStreamError::Timeout(t) => SessionError::Timeout(t),
                e => SessionError::StreamError(e)
            })?;

        trace!("Response from {}: {}", self.addr, String::from_utf8_lossy(&raw));

        self.codec.decode_response(&raw)
            .map_err(|e| SessionError::BadResponse(e))
    }
}

impl Drop for LineSession {
    fn drop(&mut self) {
        self.stream.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build the connector for the given binding.
pub fn connector_for(
    binding: Binding,
    ctx: &zmq::Context,
    connect_timeout: Duration,
    request_timeout: Duration
) -> Box<dyn Connector> {
    match binding {
        Binding::Json => Box::new(ZmqConnector::new(ctx, connect_timeout, request_timeout)),
        Binding::Line => Box::new(LineConnector::new(connect_timeout, request_timeout))
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn millis(d: Duration) -> i32 {
    d.as_millis().min(i32::MAX as u128) as i32
}

/// The send or receive timeout configured on the socket, for error reporting.
fn timeout_of(socket: &zmq::Socket, recv: bool) -> Duration {
    let ms = match recv {
        true => socket.get_rcvtimeo(),
        false => socket.get_sndtimeo()
    };

    match ms {
        Ok(ms) if ms > 0 => Duration::from_millis(ms as u64),
        _ => Duration::from_millis(0)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
