//! # Driver Station
//!
//! Sits between the operator's inputs and the connection manager:
//!
//! - Keeps a mirrored copy of the robot's mode. It is updated from responses and telemetry and is
//!   never authoritative.
//! - Times pings to give the round trip time shown to the operator.
//! - Suppresses joystick frames which barely differ from the last one sent. The first frame after
//!   every reconnect is always sent.

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
    tc::{AxisFrame, ButtonAction, RobotMode, Tc, TcResponse},
    tm::TmPacket
};
use util::shutdown::ShutdownSignal;

use crate::conn_mgr::{ConnMgr, ConnMgrError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The driver station.
pub struct DriverStation {
    conn: Arc<ConnMgr>,

    /// Smallest per-axis change which is worth sending
    threshold: f64,

    state: Mutex<DriverState>
}

#[derive(Debug, Default)]
struct DriverState {
    /// The robot's mode as last reported
    mode: RobotMode,

    /// The last frame sent, with the connection generation it was sent on
    last_frame: Option<(u64, AxisFrame)>,

    last_ping_rtt: Option<Duration>,

    last_tm: Option<TmPacket>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriverStation {
    pub fn new(conn: Arc<ConnMgr>, threshold: f64) -> Self {
        Self {
            conn,
            threshold,
            state: Mutex::new(DriverState::default())
        }
    }

    pub fn conn(&self) -> &ConnMgr {
        &self.conn
    }

    /// The robot's mode as last reported. Not authoritative.
    pub fn mode(&self) -> RobotMode {
        self.lock().mode
    }

    /// Round trip time of the last ping.
    pub fn last_ping_rtt(&self) -> Option<Duration> {
        self.lock().last_ping_rtt
    }

    /// The last telemetry packet received.
    pub fn last_tm(&self) -> Option<TmPacket> {
        self.lock().last_tm.clone()
    }

    /// Send any telecommand, routing joystick frames through the send filter.
    ///
    /// Returns `Ok(None)` if a joystick frame was suppressed.
    pub fn send(&self, tc: Tc) -> Result<Option<TcResponse>, ConnMgrError> {
        match tc {
            Tc::Ping => self.ping().map(|(rsp, _)| Some(rsp)),
            Tc::Joystick(frame) => self.send_joystick(frame),
            _ => self.request(tc).map(Some)
        }
    }

    /// Ping the robot, returning the response and the round trip time.
    pub fn ping(&self) -> Result<(TcResponse, Duration), ConnMgrError> {
        let sent_at = Instant::now();
        let rsp = self.request(Tc::Ping)?;
        let rtt = sent_at.elapsed();

        self.lock().last_ping_rtt = Some(rtt);
        debug!("Ping: {:.1} ms", rtt.as_secs_f64() * 1e3);

        Ok((rsp, rtt))
    }

    /// Send a joystick frame if it differs enough from the last one sent on this connection.
    pub fn send_joystick(&self, frame: AxisFrame) -> Result<Option<TcResponse>, ConnMgrError> {
        let frame = frame.clamped();
        let generation = self.conn.generation();

        let zero = AxisFrame::default();

        // A return to rest is always sent, or the robot keeps a small residual demand
        let suppress = match self.lock().last_frame {
            Some((gen, last)) if gen == generation => {
                frame.max_axis_delta(&last) < self.threshold && (frame != zero || last == zero)
            },
            _ => false
        };

        if suppress {
            return Ok(None)
        }

        let rsp = self.request(Tc::Joystick(frame))?;

        if rsp.is_success() {
            self.lock().last_frame = Some((generation, frame));
        }

        Ok(Some(rsp))
    }

    pub fn send_button(&self, id: u32, action: ButtonAction) -> Result<TcResponse, ConnMgrError> {
        self.request(Tc::Button { id, action })
    }

    pub fn set_mode(&self, mode: RobotMode) -> Result<TcResponse, ConnMgrError> {
        self.request(Tc::SetMode(mode))
    }

    pub fn reset(&self) -> Result<TcResponse, ConnMgrError> {
        self.request(Tc::Reset)
    }

    /// Take in a telemetry packet, replacing the last one.
    pub fn on_telemetry(&self, packet: TmPacket) {
        let mut state = self.lock();

        if state.mode != packet.mode {
            info!("Robot mode is now {}", packet.mode);
        }
        state.mode = packet.mode;
        state.last_tm = Some(packet);
    }

    /// Spawn a thread pinging the robot every `interval` while connected.
    pub fn spawn_pinger(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: ShutdownSignal
    ) -> io::Result<JoinHandle<()>> {
        let ds = self.clone();

        thread::Builder::new()
            .name("pinger".into())
            .spawn(move || {
                while !shutdown.wait_timeout(interval) {
                    if ds.conn.active_session().is_none() {
                        continue
                    }

                    match ds.ping() {
                        Ok((_, rtt)) => info!(
                            "Ping {:.1} ms, robot in {}",
                            rtt.as_secs_f64() * 1e3,
                            ds.mode()
                        ),
                        Err(e) => warn!("Ping failed: {}", e)
                    }
                }
            })
    }

    fn request(&self, tc: Tc) -> Result<TcResponse, ConnMgrError> {
        let rsp = self.conn.request(tc)?;

        // Line binding responses carry no mode, an accepted mode change implies it
        let mode = match (rsp.mode, tc) {
            (Some(m), _) => Some(m),
            (None, Tc::SetMode(m)) if rsp.is_success() => Some(m),
            (None, Tc::Reset) if rsp.is_success() => Some(RobotMode::Stopped),
            _ => None
        };

        if let Some(mode) = mode {
            self.lock().mode = mode;
        }

        if !rsp.is_success() {
            warn!(
                "Robot rejected {:?}: {}",
                tc.tc_type(),
                rsp.message.as_deref().unwrap_or("no reason given")
            );
        }

        Ok(rsp)
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;
    use comms_if::{
        net::{Address, AddressPool},
        tc::TcPacket
    };
    use crate::{
        conn_mgr::ConnMgrParams,
        tc_client::{Connector, SessionError, TcSession}
    };

    /// Connector whose sessions act as a robot that is always in TELEOP, logging every request.
    struct EchoConnector {
        log: Arc<Mutex<Vec<Tc>>>
    }

    struct EchoSession {
        addr: Address,
        log: Arc<Mutex<Vec<Tc>>>
    }

    impl Connector for EchoConnector {
        fn connect(&self, addr: &Address) -> Result<Box<dyn TcSession>, SessionError> {
            Ok(Box::new(EchoSession { addr: addr.clone(), log: self.log.clone() }))
        }
    }

    impl TcSession for EchoSession {
        fn address(&self) -> &Address {
            &self.addr
        }

        fn request(&mut self, packet: &TcPacket) -> Result<TcResponse, SessionError> {
            self.log.lock().unwrap().push(packet.tc);

            let mode = match packet.tc {
                Tc::SetMode(m) => m,
                Tc::Reset => RobotMode::Stopped,
                _ => RobotMode::Teleop
            };
            Ok(TcResponse::success().with_mode(mode))
        }
    }

    fn station() -> (Arc<DriverStation>, Arc<Mutex<Vec<Tc>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pool = AddressPool::new(vec![
            Address::new("10.0.0.1", 1),
            Address::new("10.0.0.2", 1)
        ]).unwrap();

        let conn = Arc::new(ConnMgr::new(
            Box::new(EchoConnector { log: log.clone() }),
            pool,
            ConnMgrParams::default()
        ));
        conn.hunt_once().unwrap();

        (Arc::new(DriverStation::new(conn, 0.01)), log)
    }

    fn joysticks(log: &Arc<Mutex<Vec<Tc>>>) -> usize {
        log.lock().unwrap().iter().filter(|t| matches!(t, Tc::Joystick(_))).count()
    }

    #[test]
    fn test_joystick_threshold() {
        let (ds, log) = station();

        assert!(ds.send_joystick(AxisFrame::new(0.0, 0.5, 0.0, 0.0)).unwrap().is_some());
        assert!(ds.send_joystick(AxisFrame::new(0.0, 0.505, 0.0, 0.0)).unwrap().is_none());
        assert!(ds.send_joystick(AxisFrame::new(0.0, 0.52, 0.0, 0.0)).unwrap().is_some());
        assert_eq!(joysticks(&log), 2);

        // Clamped before comparison
        assert!(ds.send_joystick(AxisFrame::new(0.0, 3.0, 0.0, 0.0)).unwrap().is_some());
        assert!(ds.send_joystick(AxisFrame::new(0.0, 1.0, 0.0, 0.0)).unwrap().is_none());
        assert_eq!(joysticks(&log), 3);
    }

    #[test]
    fn test_first_frame_after_reconnect_is_sent() {
        let (ds, log) = station();
        let frame = AxisFrame::new(0.2, 0.2, 0.0, 0.0);

        assert!(ds.send_joystick(frame).unwrap().is_some());
        assert!(ds.send_joystick(frame).unwrap().is_none());

        // Drop and re-establish the connection
        ds.conn().stop();
        ds.conn().hunt_once().unwrap();

        assert!(ds.send_joystick(frame).unwrap().is_some());
        assert_eq!(joysticks(&log), 2);
    }

    #[test]
    fn test_return_to_rest_is_sent() {
        let (ds, log) = station();

        assert!(ds.send_joystick(AxisFrame::new(0.0, 0.005, 0.0, 0.0)).unwrap().is_some());
        assert!(ds.send_joystick(AxisFrame::default()).unwrap().is_some());

        // Once at rest, further zero frames are suppressed
        assert!(ds.send_joystick(AxisFrame::default()).unwrap().is_none());
        assert_eq!(joysticks(&log), 2);
    }

    #[test]
    fn test_mirrored_mode() {
        let (ds, _) = station();
        assert_eq!(ds.mode(), RobotMode::Stopped);

        ds.set_mode(RobotMode::Auto).unwrap();
        assert_eq!(ds.mode(), RobotMode::Auto);

        ds.reset().unwrap();
        assert_eq!(ds.mode(), RobotMode::Stopped);

        ds.on_telemetry(TmPacket {
            timestamp: 0.0,
            mode: RobotMode::Teleop,
            match_time_s: Some(0.5),
            overtime: false,
            motor_speeds: [0.0; 4],
            normalised: false,
            battery: None,
            sensors: HashMap::new(),
            safe: false,
            safe_cause: None,
            last_button: None
        });
        assert_eq!(ds.mode(), RobotMode::Teleop);
        assert!(ds.last_tm().is_some());
    }

    #[test]
    fn test_ping_records_rtt() {
        let (ds, _) = station();

        assert!(ds.last_ping_rtt().is_none());
        let (rsp, rtt) = ds.ping().unwrap();
        assert!(rsp.is_success());
        assert_eq!(ds.last_ping_rtt(), Some(rtt));
    }

    #[test]
    fn test_not_connected() {
        let (ds, _) = station();
        ds.conn().stop();

        assert!(matches!(ds.reset(), Err(ConnMgrError::NotConnected)));
    }
}
