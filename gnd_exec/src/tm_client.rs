//! # Telemetry Client
//!
//! Subscribes to the robot's telemetry. The socket is conflated, so only the most recent packet is
//! ever waiting to be read.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use std::time::Duration;

use comms_if::{
    net::{zmq, Address, MonitoredSocket, MonitoredSocketError, SocketOptions},
    tm::TmPacket
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry client
pub struct TmClient {
    socket: MonitoredSocket,

    addr: Address
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmClientError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not subscribe: {0}")]
    SubscribeError(zmq::Error),

    #[error("Could not recieve telemetry: {0}")]
    RecvError(zmq::Error),

    #[error("The robot sent telemetry which was not valid UTF-8")]
    NonUtf8,

    #[error("Could not parse the telemetry: {0}")]
    DeserializeError(serde_json::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmClient {
    /// Subscribe to the telemetry published at `addr`.
    ///
    /// This function will not block until the robot is reachable. Each call to
    /// [`recv`](Self::recv) waits no longer than `recv_timeout`.
    pub fn new(
        ctx: &zmq::Context,
        addr: &Address,
        recv_timeout: Duration
    ) -> Result<Self, TmClientError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            conflate: true,
            linger: 0,
            recv_timeout: recv_timeout.as_millis().min(i32::MAX as u128) as i32,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::SUB,
            socket_options,
            &addr.tcp_endpoint()
        ).map_err(|e| TmClientError::SocketError(e))?;

        socket.set_subscribe(b"")
            .map_err(|e| TmClientError::SubscribeError(e))?;

        Ok(Self {
            socket,
            addr: addr.clone()
        })
    }

    /// The address this client is subscribed to.
    pub fn address(&self) -> &Address {
        &self.addr
    }

    /// Receive the latest telemetry packet, or `None` if nothing arrived within the timeout.
    pub fn recv(&self) -> Result<Option<TmPacket>, TmClientError> {
        let msg = match self.socket.recv_string(0) {
            Ok(Ok(s)) => s,
            Ok(Err(_)) => return Err(TmClientError::NonUtf8),
            Err(zmq::Error::EAGAIN) => return Ok(None),
            Err(e) => return Err(TmClientError::RecvError(e))
        };

        trace!("Telemetry: {}", msg);

        TmPacket::from_json(&msg)
            .map(Some)
            .map_err(|e| TmClientError::DeserializeError(e))
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
