//! # TM Server
//!
//! Publishes telemetry on a PUB socket. Delivery is best effort: a packet which cannot be sent
//! straight away is dropped, and subscribers only ever care about the latest one.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, trace, warn};
use std::{
    io,
    thread::{self, JoinHandle},
    time::{Duration, Instant}
};

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, SocketOptions},
    tc::timestamp_now_s,
    tm::TmPacket
};
use util::shutdown::ShutdownSignal;

use crate::{
    data_store::{self, DataStore, SharedDataStore},
    eqpt::SensorSource
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry server
pub struct TmServer {
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not send telemetry: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmServer {
    /// Create a new instance of the TM Server bound to `endpoint`.
    ///
    /// This function will not block until a subscriber connects.
    pub fn new(ctx: &zmq::Context, endpoint: &str) -> Result<Self, TmServerError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            bind: true,
            linger: 0,
            send_timeout: 0,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            socket_options,
            endpoint
        ).map_err(|e| TmServerError::SocketError(e))?;

        info!("TmServer bound to {}", endpoint);

        Ok(Self {
            socket
        })
    }

    /// The endpoint the socket is bound to.
    pub fn endpoint(&self) -> Option<String> {
        self.socket.last_endpoint()
    }

    /// Send one packet.
    ///
    /// Returns `Ok(false)` if the packet was dropped because it could not be queued.
    pub fn send(&self, packet: &TmPacket) -> Result<bool, TmServerError> {
        let packet_string = packet.to_json()
            .map_err(|e| TmServerError::SerializationError(e))?;

        match self.socket.send(packet_string.as_str(), zmq::DONTWAIT) {
            Ok(()) => Ok(true),
            Err(zmq::Error::EAGAIN) => {
                trace!("Telemetry packet dropped");
                Ok(false)
            },
            Err(e) => Err(TmServerError::SendError(e))
        }
    }

    /// Spawn the publisher thread, which builds and sends a packet every `period` until `shutdown`
    /// is triggered.
    pub fn spawn(
        self,
        ds: SharedDataStore,
        mut sensors: Box<dyn SensorSource>,
        period: Duration,
        shutdown: ShutdownSignal
    ) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("tm_server".into())
            .spawn(move || {
                while !shutdown.wait_timeout(period) {
                    // Sensors are read outside the lock, the store is only held for the copy
                    let battery = sensors.battery();
                    let readings = sensors.sensors();

                    let mut packet = {
                        let ds = data_store::lock(&ds);
                        build_packet(&ds, Instant::now())
                    };
                    packet.battery = battery;
                    packet.sensors = readings;

                    if let Err(e) = self.send(&packet) {
                        warn!("Could not publish telemetry: {}", e);
                    }
                }

                info!("TmServer stopped");
            })
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Build a telemetry packet from the data store, without any sensor readings.
pub fn build_packet(ds: &DataStore, now: Instant) -> TmPacket {
    TmPacket {
        timestamp: timestamp_now_s(),
        mode: ds.mode(),
        match_time_s: ds.mode_mgr.clock_s(now),
        overtime: ds.mode_mgr.is_overtime(now),
        motor_speeds: ds.loco_ctrl_output.drv_speed,
        normalised: ds.loco_ctrl_status_rpt.normalised,
        battery: None,
        sensors: Default::default(),
        safe: ds.safe,
        safe_cause: ds.safe_cause.map(|c| c.to_string()),
        last_button: ds.last_button
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::tc::{AxisFrame, RobotMode};
    use crate::{data_store::SafeModeCause, eqpt::LogActuator};

    #[test]
    fn test_build_packet() {
        let mut ds = DataStore::new(Box::new(LogActuator));
        let now = Instant::now();

        let packet = build_packet(&ds, now);
        assert_eq!(packet.mode, RobotMode::Stopped);
        assert_eq!(packet.match_time_s, None);
        assert!(packet.safe);
        assert_eq!(packet.safe_cause.as_deref(), Some("HeartbeatLost"));

        ds.make_unsafe(SafeModeCause::HeartbeatLost).unwrap();
        ds.set_mode(RobotMode::Teleop, now);
        ds.apply_drive(&AxisFrame::new(1.0, 1.0, 1.0, 0.0));

        let packet = build_packet(&ds, now + Duration::from_secs(2));
        assert_eq!(packet.match_time_s, Some(2.0));
        assert!(!packet.safe);
        assert!(packet.normalised);
        assert!((packet.motor_speeds[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_send_without_subscribers() {
        let ctx = zmq::Context::new();
        let server = TmServer::new(&ctx, "tcp://127.0.0.1:*").unwrap();
        let ds = DataStore::new(Box::new(LogActuator));

        // PUB drops messages with no subscribers, which is not an error
        assert!(server.send(&build_packet(&ds, Instant::now())).is_ok());
    }
}
